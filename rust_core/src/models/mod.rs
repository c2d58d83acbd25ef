// Shared models for the fleet ingestion engine
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Speed (mph) above which a trailer counts as moving.
pub const MOVING_SPEED_THRESHOLD: f64 = 5.0;

// ============================================================================
// Provider & Status Enums
// ============================================================================

/// Telematics vendor a record or account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    /// REST/token vendor (HTTP Basic auth + application token, JSON).
    Spireon,
    /// XML-poll vendor (credentials in the query string, XML).
    SkyBitz,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Spireon => "Spireon",
            Provider::SkyBitz => "SkyBitz",
        }
    }

    /// Lowercase kind, the `kind` field of a serialized provider summary
    pub fn kind(&self) -> &'static str {
        match self {
            Provider::Spireon => "spireon",
            Provider::SkyBitz => "skybitz",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrailerStatus {
    Moving,
    Parked,
}

impl TrailerStatus {
    /// Strictly greater than the threshold is moving; 5.0 exactly is parked.
    pub fn from_speed(speed: f64) -> Self {
        if speed > MOVING_SPEED_THRESHOLD {
            TrailerStatus::Moving
        } else {
            TrailerStatus::Parked
        }
    }
}

// ============================================================================
// Canonical Trailer Record
// ============================================================================

/// One trailer position, normalized from any vendor payload.
///
/// Only produced with a valid, non-zero coordinate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailerRecord {
    /// Account name without whitespace, `-`, vendor asset id
    pub id: String,
    pub provider: Provider,
    pub account: String,
    pub latitude: f64,
    pub longitude: f64,
    /// mph, rounded to one decimal
    pub speed: f64,
    pub status: TrailerStatus,
    pub last_update: DateTime<Utc>,
    pub driver: String,
    pub device_id: String,
    pub original_id: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub vin: Option<String>,
    pub odometer: Option<f64>,
    pub address: String,
}

impl TrailerRecord {
    /// Case-insensitive substring match used by snapshot search.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.original_id.to_lowercase().contains(needle)
            || self.driver.to_lowercase().contains(needle)
            || self.account.to_lowercase().contains(needle)
            || self.provider.as_str().to_lowercase().contains(needle)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Complete set of records produced by one refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub records: Vec<TrailerRecord>,
    pub captured_at: DateTime<Utc>,
}

/// Result of `get_snapshot`, optionally filtered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotView {
    pub records: Vec<TrailerRecord>,
    /// `None` until the first refresh cycle commits
    pub captured_at: Option<DateTime<Utc>>,
    pub count: usize,
}

/// Aggregate counts over the current snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStats {
    pub total: usize,
    pub moving: usize,
    pub parked: usize,
    pub per_provider: BTreeMap<String, usize>,
    pub per_account: BTreeMap<String, usize>,
}

impl FleetStats {
    pub fn from_records(records: &[TrailerRecord]) -> Self {
        let mut stats = FleetStats {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            match record.status {
                TrailerStatus::Moving => stats.moving += 1,
                TrailerStatus::Parked => stats.parked += 1,
            }
            *stats
                .per_provider
                .entry(record.provider.as_str().to_string())
                .or_insert(0) += 1;
            *stats.per_account.entry(record.account.clone()).or_insert(0) += 1;
        }

        stats
    }
}

// ============================================================================
// Engine Outputs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No refresh cycle has committed yet
    Pending,
    /// Account contributed records to the last snapshot
    Connected,
    /// Last snapshot holds nothing from this account
    NoData,
}

/// Display-safe view of one configured account. Never carries credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub name: String,
    #[serde(with = "provider_kind")]
    pub kind: Provider,
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub record_count: usize,
}

mod provider_kind {
    use super::Provider;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(kind: &Provider, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(kind.kind())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Provider, D::Error> {
        let raw = String::deserialize(deserializer)?;
        [Provider::Spireon, Provider::SkyBitz]
            .into_iter()
            .find(|p| p.kind() == raw)
            .ok_or_else(|| de::Error::unknown_variant(&raw, &["spireon", "skybitz"]))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCounts {
    pub spireon: usize,
    pub skybitz: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub trailers: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub providers: AccountCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCheck {
    pub account: String,
    pub success: bool,
    pub count: usize,
}

/// Outcome of a connection check against every account of one vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheck {
    pub provider: Provider,
    pub success: bool,
    pub message: String,
    pub results: Vec<AccountCheck>,
    pub total_trailers: usize,
}
