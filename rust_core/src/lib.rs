//! Fleet Core - trailer GPS telemetry ingestion.
//!
//! This module provides:
//! - Vendor protocol clients (Spireon REST, SkyBitz XML)
//! - Normalization of vendor payloads into one trailer record shape
//! - Rate-limit aware retry with exponential backoff
//! - Paced sequential refresh cycles across every configured account
//! - An atomically swapped snapshot with search, stats and per-account summaries

pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalize;
pub mod registry;
pub mod retry;

pub use config::EngineConfig;
pub use engine::{FleetEngine, SnapshotStore};
pub use error::FetchError;
pub use models::*;
pub use registry::{AccountRegistry, SkyBitzAccount, SpireonAccount};
