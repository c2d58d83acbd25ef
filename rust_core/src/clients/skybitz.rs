//! SkyBitz XML client
//!
//! `QueryPositions` is tried with two parameter variants because API version
//! support differs per account: first with `version=2.67`, then without.
//! Each variant gets up to `Backoff::max_attempts` tries, retrying only on
//! the vendor's rate-limit code. The first variant that yields at least one
//! record wins.

use super::{ProtocolClient, USER_AGENT};
use crate::error::FetchError;
use crate::models::{Provider, TrailerRecord};
use crate::normalize;
use crate::registry::SkyBitzAccount;
use crate::retry::{execute_with_backoff, Backoff};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const API_VERSION: &str = "2.67";

// ============================================================================
// Wire types
// ============================================================================

/// `<skybitz>` root. `<gls>` may appear zero, one, or many times.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkyBitzResponse {
    /// Vendor error code, `0` on success
    pub e: Option<String>,
    pub gls: Vec<Gls>,
}

/// One position report
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Gls {
    pub mtsn: Option<String>,
    pub asset: Option<GlsAsset>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    /// km/h
    pub speed: Option<String>,
    pub time: Option<String>,
    pub devicetype: Option<String>,
    pub totaldevicemileage: Option<String>,
    pub landmark: Option<Landmark>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GlsAsset {
    pub assetid: Option<String>,
    pub assettype: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Landmark {
    pub geoname: Option<String>,
    pub state: Option<String>,
}

/// Decode a `QueryPositions` body. A non-zero `<e>` turns the whole response
/// into an error.
pub fn parse_response(xml: &str) -> Result<Vec<Gls>, FetchError> {
    let response: SkyBitzResponse = quick_xml::de::from_str(xml)?;
    if let Some(err) = FetchError::from_vendor_code(response.e.as_deref()) {
        return Err(err);
    }
    Ok(response.gls)
}

// ============================================================================
// Query variants
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionQuery {
    pub asset_id: String,
    pub version: Option<String>,
}

impl PositionQuery {
    /// Primary (versioned) then fallback (unversioned) query for all assets
    pub fn variants() -> Vec<PositionQuery> {
        vec![
            PositionQuery {
                asset_id: "ALL".to_string(),
                version: Some(API_VERSION.to_string()),
            },
            PositionQuery {
                asset_id: "ALL".to_string(),
                version: None,
            },
        ]
    }

    pub fn params<'a>(&'a self, account: &'a SkyBitzAccount) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![
            ("customer", account.username.as_str()),
            ("password", account.password.as_str()),
            ("assetid", self.asset_id.as_str()),
        ];
        if let Some(version) = &self.version {
            params.push(("version", version.as_str()));
        }
        params
    }

    fn label(&self) -> &'static str {
        if self.version.is_some() {
            "versioned"
        } else {
            "unversioned"
        }
    }
}

// ============================================================================
// Raw source
// ============================================================================

/// Raw XML body for one query variant
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn query(&self, account: &SkyBitzAccount, query: &PositionQuery)
        -> Result<String, FetchError>;
}

/// Production source backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpPositionSource {
    client: Client,
}

impl HttpPositionSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PositionSource for HttpPositionSource {
    async fn query(
        &self,
        account: &SkyBitzAccount,
        query: &PositionQuery,
    ) -> Result<String, FetchError> {
        let url = format!("{}/QueryPositions", account.base_url.trim_end_matches('/'));
        debug!("GET {} ({}, {})", url, account.name, query.label());

        let response = self
            .client
            .get(&url)
            .query(&query.params(account))
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

        Ok(response.text().await?)
    }
}

// ============================================================================
// Protocol client
// ============================================================================

pub struct SkyBitzClient<S = HttpPositionSource> {
    source: S,
    backoff: Backoff,
}

impl SkyBitzClient<HttpPositionSource> {
    pub fn new(timeout: Duration, backoff: Backoff) -> Result<Self, FetchError> {
        Ok(Self::with_source(HttpPositionSource::new(timeout)?, backoff))
    }
}

impl<S: PositionSource> SkyBitzClient<S> {
    pub fn with_source(source: S, backoff: Backoff) -> Self {
        Self { source, backoff }
    }

    async fn attempt(
        &self,
        account: &SkyBitzAccount,
        query: &PositionQuery,
    ) -> Result<Vec<Gls>, FetchError> {
        let body = self.source.query(account, query).await?;
        parse_response(&body)
    }

    /// Query every variant in order until one yields records.
    ///
    /// Returns the last error only when no variant produced a response at all.
    pub async fn query_positions(
        &self,
        account: &SkyBitzAccount,
    ) -> Result<Vec<TrailerRecord>, FetchError> {
        info!("Fetching {} data...", account.name);
        let mut last_error = None;
        let mut answered = false;

        for query in PositionQuery::variants() {
            let label = format!("{} ({})", account.name, query.label());
            let result =
                execute_with_backoff(&self.backoff, &label, || self.attempt(account, &query)).await;

            match result {
                Ok(reports) => {
                    answered = true;
                    let records = normalize::normalize_skybitz(account, &reports);
                    if !records.is_empty() {
                        info!("{}: {} trailers found", account.name, records.len());
                        return Ok(records);
                    }
                    debug!("{}: no usable positions, trying next variant", label);
                }
                Err(e) => {
                    warn!("{}: query failed: {}", label, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => {
                info!("{}: 0 trailers found", account.name);
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl<S: PositionSource> ProtocolClient for SkyBitzClient<S> {
    type Account = SkyBitzAccount;

    fn provider(&self) -> Provider {
        Provider::SkyBitz
    }

    async fn try_fetch(&self, account: &SkyBitzAccount) -> Result<Vec<TrailerRecord>, FetchError> {
        self.query_positions(account).await
    }
}
