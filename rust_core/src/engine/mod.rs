//! Fleet engine
//!
//! Owns the account registry, one protocol client per vendor and the
//! snapshot store. A refresh cycle walks every account sequentially with
//! fixed pacing, then publishes the merged result as one new snapshot.
//! Concurrent refresh triggers share the cycle already in progress.

pub mod store;

use crate::clients::{ProtocolClient, SkyBitzClient, SpireonClient, VendorAccount};
use crate::config::EngineConfig;
use crate::error::FetchError;
use crate::models::{
    AccountCounts, FleetStats, HealthSummary, ConnectionCheck, AccountCheck, Provider,
    ProviderSummary, RefreshOutcome, Snapshot, SnapshotView, SyncStatus, TrailerRecord,
};
use crate::registry::{AccountRegistry, SkyBitzAccount, SpireonAccount};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub use store::SnapshotStore;

pub type SpireonProtocol = dyn ProtocolClient<Account = SpireonAccount>;
pub type SkyBitzProtocol = dyn ProtocolClient<Account = SkyBitzAccount>;

pub struct FleetEngine {
    registry: Arc<AccountRegistry>,
    config: EngineConfig,
    spireon: Arc<SpireonProtocol>,
    skybitz: Arc<SkyBitzProtocol>,
    store: SnapshotStore,
    /// Held for the duration of a cycle
    refresh_gate: Mutex<()>,
    /// Completed cycles, used to let waiting triggers join a finished cycle
    cycles: AtomicU64,
}

impl FleetEngine {
    /// Build an engine with HTTP-backed vendor clients
    pub fn new(registry: Arc<AccountRegistry>, config: EngineConfig) -> Result<Self, FetchError> {
        let spireon = SpireonClient::new(config.spireon_timeout)?;
        let skybitz = SkyBitzClient::new(config.skybitz_timeout, config.skybitz_backoff)?;
        Ok(Self::with_clients(
            registry,
            config,
            Arc::new(spireon),
            Arc::new(skybitz),
        ))
    }

    pub fn with_clients(
        registry: Arc<AccountRegistry>,
        config: EngineConfig,
        spireon: Arc<SpireonProtocol>,
        skybitz: Arc<SkyBitzProtocol>,
    ) -> Self {
        Self {
            registry,
            config,
            spireon,
            skybitz,
            store: SnapshotStore::new(),
            refresh_gate: Mutex::new(()),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Run a refresh cycle, or join the one already running.
    ///
    /// A trigger that arrives while a cycle is in flight waits for it and
    /// returns its outcome instead of starting a second cycle.
    pub async fn trigger_refresh(&self) -> RefreshOutcome {
        let observed = self.cycles.load(Ordering::SeqCst);
        let _gate = self.refresh_gate.lock().await;

        if self.cycles.load(Ordering::SeqCst) != observed {
            if let Some(snapshot) = self.store.current() {
                info!("Joined refresh cycle that completed while waiting");
                return outcome(&snapshot);
            }
        }

        let snapshot = self.refresh_all().await;
        self.cycles.fetch_add(1, Ordering::SeqCst);
        outcome(&snapshot)
    }

    /// One full cycle. Callers go through `trigger_refresh` so two cycles
    /// never overlap.
    async fn refresh_all(&self) -> Arc<Snapshot> {
        info!("Updating trailer data from all providers...");
        let mut records = Vec::new();

        for (i, account) in self.registry.spireon().iter().enumerate() {
            if i > 0 {
                pace(self.config.spireon_account_delay).await;
            }
            records.extend(fetch_isolated(&self.spireon, account).await);
        }

        let skybitz = self.registry.skybitz();
        if !skybitz.is_empty() {
            info!(
                "Waiting {}ms before SkyBitz requests...",
                self.config.skybitz_phase_delay.as_millis()
            );
            pace(self.config.skybitz_phase_delay).await;
        }

        for (i, account) in skybitz.iter().enumerate() {
            if i > 0 {
                pace(self.config.skybitz_account_delay).await;
            }
            records.extend(fetch_isolated(&self.skybitz, account).await);
        }

        let snapshot = self.store.publish(dedupe(records));
        log_cycle_summary(&snapshot);
        snapshot
    }

    /// Initial blocking load, then the periodic loop on a background task
    pub async fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let outcome = self.trigger_refresh().await;
        info!("Initial load complete: {} trailers", outcome.count);

        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run_periodic().await })
    }

    /// Trigger a refresh every `refresh_interval`. The first cycle fires one
    /// full interval after this is called.
    pub async fn run_periodic(&self) {
        let period = self.config.refresh_interval;
        if period.is_zero() {
            error!("Periodic refresh disabled: refresh interval must be non-zero");
            return;
        }
        info!("Periodic refresh started (interval: {}s)", period.as_secs());

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            info!("Running scheduled update...");
            self.trigger_refresh().await;
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_snapshot(&self, filter: Option<&str>) -> SnapshotView {
        self.store.view(filter)
    }

    pub fn search(&self, query: &str) -> Vec<TrailerRecord> {
        self.store.search(Some(query))
    }

    pub fn get_stats(&self) -> FleetStats {
        self.store.stats()
    }

    /// One entry per configured account, Spireon accounts first
    pub fn get_provider_summary(&self) -> Vec<ProviderSummary> {
        let snapshot = self.store.current();
        let mut counts: BTreeMap<(Provider, &str), usize> = BTreeMap::new();
        if let Some(snapshot) = &snapshot {
            for record in &snapshot.records {
                *counts
                    .entry((record.provider, record.account.as_str()))
                    .or_insert(0) += 1;
            }
        }

        self.registry
            .accounts()
            .into_iter()
            .map(|account| {
                let record_count = counts
                    .get(&(account.provider, account.name.as_str()))
                    .copied()
                    .unwrap_or(0);
                let status = match (&snapshot, record_count) {
                    (None, _) => SyncStatus::Pending,
                    (Some(_), 0) => SyncStatus::NoData,
                    (Some(_), _) => SyncStatus::Connected,
                };
                ProviderSummary {
                    name: account.name,
                    kind: account.provider,
                    status,
                    last_sync: snapshot.as_ref().map(|s| s.captured_at),
                    record_count,
                }
            })
            .collect()
    }

    pub fn health(&self) -> HealthSummary {
        let snapshot = self.store.current();
        HealthSummary {
            trailers: snapshot.as_ref().map_or(0, |s| s.records.len()),
            last_update: snapshot.map(|s| s.captured_at),
            providers: AccountCounts {
                spireon: self.registry.count(Provider::Spireon),
                skybitz: self.registry.count(Provider::SkyBitz),
            },
        }
    }

    /// Fetch every account of one vendor with normal pacing and report per
    /// account outcomes. The snapshot is left untouched.
    pub async fn check_connections(&self, provider: Provider) -> ConnectionCheck {
        info!("Testing {} accounts...", provider);
        let results = match provider {
            Provider::Spireon => {
                check_accounts(
                    &self.spireon,
                    self.registry.spireon(),
                    self.config.spireon_account_delay,
                )
                .await
            }
            Provider::SkyBitz => {
                check_accounts(
                    &self.skybitz,
                    self.registry.skybitz(),
                    self.config.skybitz_account_delay,
                )
                .await
            }
        };

        let succeeded = results.iter().filter(|r| r.success).count();
        let total_trailers = results.iter().map(|r| r.count).sum();
        ConnectionCheck {
            provider,
            success: succeeded > 0,
            message: format!(
                "{} test completed. {}/{} accounts successful",
                provider,
                succeeded,
                results.len()
            ),
            results,
            total_trailers,
        }
    }
}

fn outcome(snapshot: &Snapshot) -> RefreshOutcome {
    RefreshOutcome {
        count: snapshot.records.len(),
        timestamp: snapshot.captured_at,
    }
}

async fn pace(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Run one account fetch on its own task so a panic inside a client costs
/// that account's records and nothing else. Awaited immediately; accounts
/// are still fetched one at a time.
async fn fetch_isolated<A>(
    client: &Arc<dyn ProtocolClient<Account = A>>,
    account: &A,
) -> Vec<TrailerRecord>
where
    A: VendorAccount + Clone + 'static,
{
    let task_client = Arc::clone(client);
    let task_account = account.clone();
    let handle = tokio::spawn(async move { task_client.fetch(&task_account).await });

    match handle.await {
        Ok(records) => records,
        Err(e) => {
            error!(
                "{} ({}) fetch aborted: {}",
                account.name(),
                client.provider(),
                e
            );
            Vec::new()
        }
    }
}

async fn check_accounts<A>(
    client: &Arc<dyn ProtocolClient<Account = A>>,
    accounts: &[A],
    delay: Duration,
) -> Vec<AccountCheck>
where
    A: VendorAccount,
{
    let mut results = Vec::with_capacity(accounts.len());
    for (i, account) in accounts.iter().enumerate() {
        if i > 0 {
            pace(delay).await;
        }
        let result = match client.try_fetch(account).await {
            Ok(records) => AccountCheck {
                account: account.name().to_string(),
                success: true,
                count: records.len(),
            },
            Err(e) => {
                warn!("{} connection check failed: {}", account.name(), e);
                AccountCheck {
                    account: account.name().to_string(),
                    success: false,
                    count: 0,
                }
            }
        };
        results.push(result);
    }
    results
}

/// Keep the first record for each id
fn dedupe(records: Vec<TrailerRecord>) -> Vec<TrailerRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| {
            let fresh = seen.insert(record.id.clone());
            if !fresh {
                warn!("Duplicate trailer id {} dropped", record.id);
            }
            fresh
        })
        .collect()
}

fn log_cycle_summary(snapshot: &Snapshot) {
    let mut per_source: BTreeMap<String, usize> = BTreeMap::new();
    for record in &snapshot.records {
        *per_source
            .entry(format!("{} - {}", record.provider, record.account))
            .or_insert(0) += 1;
    }

    info!(
        "Updated {} trailers at {}",
        snapshot.records.len(),
        snapshot.captured_at.to_rfc3339()
    );
    for (source, count) in &per_source {
        info!("  {}: {} trailers", source, count);
    }
}
