//! Spireon REST client
//!
//! One authenticated GET per account against `{base_url}/assets`, HTTP Basic
//! auth plus the `X-Nspire-AppToken` application token. No retry: a failed
//! request yields zero records until the next cycle.

use super::{ProtocolClient, USER_AGENT};
use crate::error::FetchError;
use crate::models::{Provider, TrailerRecord};
use crate::normalize;
use crate::registry::SpireonAccount;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// Wire types
// ============================================================================

/// One asset as returned by `/assets`. Numeric fields are kept as raw JSON
/// because Spireon mixes numbers and numeric strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpireonAsset {
    pub id: Value,
    pub name: Option<String>,
    pub last_location: Option<SpireonLocation>,
    pub speed: Value,
    pub status: Option<String>,
    pub location_last_reported: Value,
    pub last_updated: Value,
    pub driver_name: Option<String>,
    pub operator_name: Option<String>,
    pub instrumentation_ref: Option<InstrumentationRef>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Value,
    pub vin: Option<String>,
    pub odometer: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpireonLocation {
    pub lat: Value,
    pub lng: Value,
    pub address: Option<SpireonAddress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpireonAddress {
    pub city: Option<String>,
    pub state_or_province: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstrumentationRef {
    pub device_id: Value,
}

/// `/assets` answers either a page object or a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AssetListing {
    Page {
        #[serde(default)]
        content: Vec<Value>,
    },
    List(Vec<Value>),
}

/// Decode an `/assets` body. Elements that are not asset objects are skipped
/// so one odd entry never discards the whole batch.
pub fn parse_asset_listing(body: &str) -> Result<Vec<SpireonAsset>, FetchError> {
    let listing: AssetListing = serde_json::from_str(body)?;
    let items = match listing {
        AssetListing::Page { content } => content,
        AssetListing::List(items) => items,
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<SpireonAsset>(item) {
            Ok(asset) => Some(asset),
            Err(e) => {
                warn!("Skipping undecodable Spireon asset: {}", e);
                None
            }
        })
        .collect())
}

// ============================================================================
// Raw source
// ============================================================================

/// Raw asset listing for one account
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn list_assets(&self, account: &SpireonAccount) -> Result<Vec<SpireonAsset>, FetchError>;
}

/// Production source backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpAssetSource {
    client: Client,
}

impl HttpAssetSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    async fn list_assets(&self, account: &SpireonAccount) -> Result<Vec<SpireonAsset>, FetchError> {
        let url = format!("{}/assets", account.base_url.trim_end_matches('/'));
        debug!("GET {} ({})", url, account.name);

        let response = self
            .client
            .get(&url)
            .basic_auth(&account.username, Some(&account.password))
            .header("X-Nspire-AppToken", &account.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        parse_asset_listing(&body)
    }
}

// ============================================================================
// Protocol client
// ============================================================================

pub struct SpireonClient<S = HttpAssetSource> {
    source: S,
}

impl SpireonClient<HttpAssetSource> {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self::with_source(HttpAssetSource::new(timeout)?))
    }
}

impl<S: AssetSource> SpireonClient<S> {
    pub fn with_source(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: AssetSource> ProtocolClient for SpireonClient<S> {
    type Account = SpireonAccount;

    fn provider(&self) -> Provider {
        Provider::Spireon
    }

    async fn try_fetch(&self, account: &SpireonAccount) -> Result<Vec<TrailerRecord>, FetchError> {
        info!("Fetching {} data...", account.name);
        let assets = self.source.list_assets(account).await?;
        let records = normalize::normalize_spireon(account, &assets);
        info!(
            "{}: {} trailers with GPS data ({} assets listed)",
            account.name,
            records.len(),
            assets.len()
        );
        Ok(records)
    }
}
