pub mod skybitz;
pub mod skybitz_time;
pub mod spireon;

use crate::error::FetchError;
use crate::models::{Provider, TrailerRecord};
use crate::registry::{SkyBitzAccount, SpireonAccount};
use async_trait::async_trait;
use tracing::error;

// Re-export commonly used types
pub use skybitz::{HttpPositionSource, PositionQuery, PositionSource, SkyBitzClient};
pub use skybitz_time::SkyBitzTime;
pub use spireon::{AssetSource, HttpAssetSource, SpireonClient};

pub const USER_AGENT: &str = "GPS-Fleet-Management/1.0";

/// Anything a protocol client can be pointed at
pub trait VendorAccount: Send + Sync {
    fn name(&self) -> &str;
}

impl VendorAccount for SpireonAccount {
    fn name(&self) -> &str {
        &self.name
    }
}

impl VendorAccount for SkyBitzAccount {
    fn name(&self) -> &str {
        &self.name
    }
}

/// One vendor protocol: fetch an account's trailers as canonical records.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    type Account: VendorAccount;

    fn provider(&self) -> Provider;

    /// Fetch and normalize, surfacing the failure reason.
    async fn try_fetch(&self, account: &Self::Account) -> Result<Vec<TrailerRecord>, FetchError>;

    /// Fetch and normalize. Failures are logged and yield no records, so one
    /// account can never abort a refresh cycle.
    async fn fetch(&self, account: &Self::Account) -> Vec<TrailerRecord> {
        match self.try_fetch(account).await {
            Ok(records) => records,
            Err(e) => {
                error!("{} ({}) error: {}", account.name(), self.provider(), e);
                Vec::new()
            }
        }
    }
}
