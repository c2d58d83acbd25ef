//! Integration tests for the refresh cycle
//!
//! Vendor traffic is replaced by scripted sources; tokio time is paused so
//! pacing and backoff delays are observed exactly without waiting.

use async_trait::async_trait;
use fleet_rust_core::clients::spireon::SpireonAsset;
use fleet_rust_core::clients::{
    AssetSource, HttpAssetSource, PositionQuery, PositionSource, SkyBitzClient, SpireonClient,
};
use fleet_rust_core::{
    AccountRegistry, EngineConfig, FetchError, FleetEngine, Provider, SkyBitzAccount,
    SpireonAccount, SyncStatus, TrailerStatus,
};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;

// ============================================================================
// Scripted sources
// ============================================================================

/// Clones share the call log
#[derive(Clone, Default)]
struct FakeAssetSource {
    /// Account name -> assets; accounts not listed answer HTTP 500
    assets: HashMap<String, Vec<SpireonAsset>>,
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl FakeAssetSource {
    fn with(mut self, account: &str, assets: Vec<SpireonAsset>) -> Self {
        self.assets.insert(account.to_string(), assets);
        self
    }

    fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetSource for FakeAssetSource {
    async fn list_assets(&self, account: &SpireonAccount) -> Result<Vec<SpireonAsset>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((account.name.clone(), Instant::now()));
        match self.assets.get(&account.name) {
            Some(assets) => Ok(assets.clone()),
            None => Err(FetchError::Status {
                status: 500,
                body: "upstream unavailable".to_string(),
            }),
        }
    }
}

/// Clones share scripts and the call log
#[derive(Clone, Default)]
struct FakePositionSource {
    /// Account name -> bodies handed out in order; an empty script answers
    /// with a successful response holding no reports
    scripts: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    calls: Arc<Mutex<Vec<(String, bool, Instant)>>>,
}

impl FakePositionSource {
    fn script(self, account: &str, bodies: &[&str]) -> Self {
        self.scripts.lock().unwrap().insert(
            account.to_string(),
            bodies.iter().map(|b| b.to_string()).collect(),
        );
        self
    }

    /// (account, versioned, when)
    fn calls(&self) -> Vec<(String, bool, Instant)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PositionSource for FakePositionSource {
    async fn query(
        &self,
        account: &SkyBitzAccount,
        query: &PositionQuery,
    ) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push((
            account.name.clone(),
            query.version.is_some(),
            Instant::now(),
        ));
        let body = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&account.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| "<skybitz><e>0</e></skybitz>".to_string());
        Ok(body)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

const RATE_LIMITED: &str = "<skybitz><e>97</e></skybitz>";

const TWO_VALID_ONE_ZERO: &str = r#"<skybitz>
  <e>0</e>
  <gls>
    <mtsn>500100</mtsn>
    <asset><assetid>SB-1</assetid><owner>Dock 4</owner></asset>
    <latitude>41.8781</latitude>
    <longitude>-87.6298</longitude>
    <speed>10.0</speed>
    <time>05/jan/2024-13:45:10</time>
  </gls>
  <gls>
    <mtsn>500101</mtsn>
    <asset><assetid>SB-2</assetid></asset>
    <latitude>39.7392</latitude>
    <longitude>-104.9903</longitude>
    <speed>0</speed>
  </gls>
  <gls>
    <mtsn>500102</mtsn>
    <latitude>0</latitude>
    <longitude>0</longitude>
  </gls>
</skybitz>"#;

/// Accounts pointed at a loopback address go over real HTTP; the rest are scripted
struct LoopbackOrFake {
    http: HttpAssetSource,
    fake: FakeAssetSource,
}

#[async_trait]
impl AssetSource for LoopbackOrFake {
    async fn list_assets(&self, account: &SpireonAccount) -> Result<Vec<SpireonAsset>, FetchError> {
        if account.base_url.starts_with("http://127.0.0.1") {
            self.http.list_assets(account).await
        } else {
            self.fake.list_assets(account).await
        }
    }
}

/// Accepts connections and never answers
async fn stalled_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

/// A loopback address with nothing listening
async fn refused_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn spireon_account(name: &str) -> SpireonAccount {
    SpireonAccount {
        name: name.to_string(),
        base_url: "http://spireon.invalid".to_string(),
        api_key: "key".to_string(),
        username: "user".to_string(),
        password: "pass".to_string(),
    }
}

fn skybitz_account(name: &str) -> SkyBitzAccount {
    SkyBitzAccount {
        name: name.to_string(),
        base_url: "http://skybitz.invalid".to_string(),
        username: "cust".to_string(),
        password: "pass".to_string(),
    }
}

fn asset(id: &str, lat: f64, lng: f64, speed: f64) -> SpireonAsset {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Trailer {}", id),
        "lastLocation": { "lat": lat, "lng": lng },
        "speed": speed,
        "driverName": "Pat Lee",
    }))
    .unwrap()
}

fn three_assets() -> Vec<SpireonAsset> {
    vec![
        asset("101", 32.7767, -96.797, 0.0),
        asset("102", 29.7604, -95.3698, 42.0),
        asset("103", 35.4676, -97.5164, 3.0),
    ]
}

fn engine(
    config: EngineConfig,
    spireon_accounts: Vec<SpireonAccount>,
    skybitz_accounts: Vec<SkyBitzAccount>,
    spireon: FakeAssetSource,
    skybitz: FakePositionSource,
) -> FleetEngine {
    let backoff = config.skybitz_backoff;
    FleetEngine::with_clients(
        Arc::new(AccountRegistry::new(spireon_accounts, skybitz_accounts)),
        config,
        Arc::new(SpireonClient::with_source(spireon)),
        Arc::new(SkyBitzClient::with_source(skybitz, backoff)),
    )
}

// ============================================================================
// Refresh cycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_account_is_isolated_and_paced() {
    let spireon = FakeAssetSource::default().with("Acme Freight", three_assets());
    let engine = engine(
        EngineConfig::default(),
        vec![spireon_account("Acme Freight"), spireon_account("Broken Co")],
        Vec::new(),
        spireon.clone(),
        FakePositionSource::default(),
    );

    let started = Instant::now();
    let outcome = engine.trigger_refresh().await;

    assert_eq!(outcome.count, 3);
    let calls = spireon.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "Acme Freight");
    assert_eq!(calls[1].0, "Broken Co");
    assert!(calls[1].1 - calls[0].1 >= Duration::from_secs(2));
    assert!(started.elapsed() >= Duration::from_secs(2));

    let view = engine.get_snapshot(None);
    assert_eq!(view.count, 3);
    assert!(view.records.iter().all(|r| r.account == "Acme Freight"));
    assert_eq!(view.records[0].id, "AcmeFreight-101");
    assert_eq!(view.records[1].status, TrailerStatus::Moving);
}

#[tokio::test]
async fn test_spireon_timeout_and_refused_connection_are_isolated() {
    let stalled = SpireonAccount {
        base_url: stalled_server().await,
        ..spireon_account("Stalled Co")
    };
    let refused = SpireonAccount {
        base_url: refused_server().await,
        ..spireon_account("Refused Co")
    };

    let http = HttpAssetSource::new(Duration::from_millis(200)).unwrap();
    let err = http.list_assets(&stalled).await.unwrap_err();
    assert!(matches!(&err, FetchError::Transport(e) if e.is_timeout()), "{err:?}");
    let err = http.list_assets(&refused).await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)), "{err:?}");

    let config = EngineConfig::immediate();
    let backoff = config.skybitz_backoff;
    let source = LoopbackOrFake {
        http,
        fake: FakeAssetSource::default().with("Acme Freight", three_assets()),
    };
    let engine = FleetEngine::with_clients(
        Arc::new(AccountRegistry::new(
            vec![stalled, refused, spireon_account("Acme Freight")],
            Vec::new(),
        )),
        config,
        Arc::new(SpireonClient::with_source(source)),
        Arc::new(SkyBitzClient::with_source(
            FakePositionSource::default(),
            backoff,
        )),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(10), engine.trigger_refresh())
        .await
        .expect("refresh cycle should finish despite a stalled vendor");

    assert_eq!(outcome.count, 3);
    let summary = engine.get_provider_summary();
    assert_eq!(summary[0].status, SyncStatus::NoData);
    assert_eq!(summary[1].status, SyncStatus::NoData);
    assert_eq!(summary[2].status, SyncStatus::Connected);
    assert_eq!(summary[2].record_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_skybitz_rate_limit_backoff_then_success() {
    let skybitz = FakePositionSource::default().script(
        "Northern Haul",
        &[RATE_LIMITED, RATE_LIMITED, TWO_VALID_ONE_ZERO],
    );
    let engine = engine(
        EngineConfig::default(),
        Vec::new(),
        vec![skybitz_account("Northern Haul")],
        FakeAssetSource::default(),
        skybitz.clone(),
    );

    let started = Instant::now();
    let outcome = engine.trigger_refresh().await;

    assert_eq!(outcome.count, 2);

    let calls = skybitz.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(_, versioned, _)| *versioned));
    // phase pause, then 4s and 8s backoff
    assert!(calls[0].2 - started >= Duration::from_secs(5));
    assert_eq!(calls[1].2 - calls[0].2, Duration::from_secs(4));
    assert_eq!(calls[2].2 - calls[1].2, Duration::from_secs(8));
    assert_eq!(started.elapsed(), Duration::from_secs(17));

    let records = engine.get_snapshot(None).records;
    assert_eq!(records[0].id, "NorthernHaul-SB-1");
    assert_eq!(records[0].speed, 6.2);
    assert_eq!(records[0].status, TrailerStatus::Moving);
    assert_eq!(records[0].driver, "Dock 4");
    assert_eq!(records[1].status, TrailerStatus::Parked);
}

#[tokio::test(start_paused = true)]
async fn test_skybitz_falls_back_to_unversioned_query() {
    let single = "<skybitz><e>0</e><gls><mtsn>9</mtsn><latitude>40.1</latitude><longitude>-75.2</longitude></gls></skybitz>";
    let skybitz = FakePositionSource::default().script(
        "Keystone",
        &["<skybitz><e>0</e></skybitz>", single],
    );
    let engine = engine(
        EngineConfig::immediate(),
        Vec::new(),
        vec![skybitz_account("Keystone")],
        FakeAssetSource::default(),
        skybitz.clone(),
    );

    let outcome = engine.trigger_refresh().await;

    assert_eq!(outcome.count, 1);
    let calls = skybitz.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].1);
    assert!(!calls[1].1);
}

#[tokio::test(start_paused = true)]
async fn test_skybitz_accounts_paced_after_spireon_phase() {
    let spireon = FakeAssetSource::default().with("Acme Freight", three_assets());
    let skybitz = FakePositionSource::default()
        .script("Keystone", &[TWO_VALID_ONE_ZERO])
        .script("Northern Haul", &[TWO_VALID_ONE_ZERO]);
    let engine = engine(
        EngineConfig::default(),
        vec![spireon_account("Acme Freight")],
        vec![skybitz_account("Keystone"), skybitz_account("Northern Haul")],
        spireon.clone(),
        skybitz.clone(),
    );

    let outcome = engine.trigger_refresh().await;
    assert_eq!(outcome.count, 7);

    let spireon_at = spireon.calls()[0].1;
    let calls = skybitz.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].2 - spireon_at >= Duration::from_secs(5));
    assert!(calls[1].2 - calls[0].2 >= Duration::from_secs(3));

    // Spireon records come first
    let records = engine.get_snapshot(None).records;
    assert_eq!(records[0].provider, Provider::Spireon);
    assert_eq!(records[6].provider, Provider::SkyBitz);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_ids_keep_first() {
    let mut second = asset("101", 10.0, 10.0, 0.0);
    second.driver_name = Some("Second".to_string());
    let spireon = FakeAssetSource::default()
        .with("Acme Freight", vec![asset("101", 32.0, -96.0, 0.0), second]);
    let engine = engine(
        EngineConfig::immediate(),
        vec![spireon_account("Acme Freight")],
        Vec::new(),
        spireon,
        FakePositionSource::default(),
    );

    assert_eq!(engine.trigger_refresh().await.count, 1);
    assert_eq!(engine.get_snapshot(None).records[0].driver, "Pat Lee");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_triggers_share_one_cycle() {
    let spireon = FakeAssetSource::default().with("Acme Freight", three_assets());
    let engine = engine(
        EngineConfig::immediate(),
        vec![spireon_account("Acme Freight")],
        Vec::new(),
        spireon.clone(),
        FakePositionSource::default(),
    );

    let (first, second) = tokio::join!(engine.trigger_refresh(), engine.trigger_refresh());

    assert_eq!(first.count, 3);
    assert_eq!(second.count, 3);
    assert_eq!(first.timestamp, second.timestamp);
    assert_eq!(spireon.calls().len(), 1);
    assert_eq!(engine.get_snapshot(None).count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_captured_at_is_monotonic() {
    let engine = engine(
        EngineConfig::immediate(),
        vec![spireon_account("Acme Freight")],
        Vec::new(),
        FakeAssetSource::default().with("Acme Freight", three_assets()),
        FakePositionSource::default(),
    );

    let first = engine.trigger_refresh().await;
    let second = engine.trigger_refresh().await;
    assert!(second.timestamp >= first.timestamp);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_refresh_skips_immediate_tick() {
    let spireon = FakeAssetSource::default().with("Acme Freight", three_assets());
    let engine = Arc::new(engine(
        EngineConfig {
            refresh_interval: Duration::from_secs(600),
            ..EngineConfig::immediate()
        },
        vec![spireon_account("Acme Freight")],
        Vec::new(),
        spireon.clone(),
        FakePositionSource::default(),
    ));

    let periodic = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run_periodic().await })
    };

    tokio::time::sleep(Duration::from_secs(599)).await;
    assert!(spireon.calls().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(spireon.calls().len(), 1);
    assert_eq!(engine.get_snapshot(None).count, 3);

    periodic.abort();
}

#[tokio::test(start_paused = true)]
async fn test_periodic_refresh_with_zero_interval_returns() {
    let spireon = FakeAssetSource::default().with("Acme Freight", three_assets());
    let engine = engine(
        EngineConfig {
            refresh_interval: Duration::ZERO,
            ..EngineConfig::immediate()
        },
        vec![spireon_account("Acme Freight")],
        Vec::new(),
        spireon.clone(),
        FakePositionSource::default(),
    );

    tokio::time::timeout(Duration::from_secs(1), engine.run_periodic())
        .await
        .expect("zero interval should return immediately");
    assert!(spireon.calls().is_empty());
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_queries_after_refresh() {
    let engine = engine(
        EngineConfig::immediate(),
        vec![spireon_account("Acme Freight"), spireon_account("Broken Co")],
        vec![skybitz_account("Northern Haul")],
        FakeAssetSource::default().with("Acme Freight", three_assets()),
        FakePositionSource::default().script("Northern Haul", &[TWO_VALID_ONE_ZERO]),
    );

    // Before the first cycle everything reads as empty and pending.
    assert_eq!(engine.get_snapshot(None).count, 0);
    assert!(engine.get_snapshot(None).captured_at.is_none());
    assert!(engine
        .get_provider_summary()
        .iter()
        .all(|p| p.status == SyncStatus::Pending));

    engine.trigger_refresh().await;

    let all = engine.get_snapshot(None);
    assert_eq!(all.count, 5);
    assert_eq!(engine.search(""), all.records);
    assert_eq!(engine.get_snapshot(Some("")).records, all.records);

    let by_account = engine.get_snapshot(Some("northern"));
    assert_eq!(by_account.count, 2);
    assert_eq!(engine.search("pat lee").len(), 3);
    assert_eq!(engine.search("SKYBITZ").len(), 2);

    let stats = engine.get_stats();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.moving, 2);
    assert_eq!(stats.parked, 3);
    assert_eq!(stats.per_provider["Spireon"], 3);
    assert_eq!(stats.per_provider["SkyBitz"], 2);

    let summary = engine.get_provider_summary();
    assert_eq!(summary.len(), 3);
    assert_eq!(summary[0].name, "Acme Freight");
    assert_eq!(summary[0].status, SyncStatus::Connected);
    assert_eq!(summary[0].record_count, 3);
    assert_eq!(summary[1].name, "Broken Co");
    assert_eq!(summary[1].status, SyncStatus::NoData);
    assert_eq!(summary[2].kind, Provider::SkyBitz);
    assert_eq!(summary[2].record_count, 2);
    assert_eq!(summary[2].last_sync, all.captured_at);

    let health = engine.health();
    assert_eq!(health.trailers, 5);
    assert_eq!(health.providers.spireon, 2);
    assert_eq!(health.providers.skybitz, 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_check_reports_per_account_without_publishing() {
    let engine = engine(
        EngineConfig::immediate(),
        vec![spireon_account("Acme Freight"), spireon_account("Broken Co")],
        Vec::new(),
        FakeAssetSource::default().with("Acme Freight", three_assets()),
        FakePositionSource::default(),
    );

    let report = engine.check_connections(Provider::Spireon).await;

    assert!(report.success);
    assert_eq!(report.total_trailers, 3);
    assert_eq!(report.message, "Spireon test completed. 1/2 accounts successful");
    assert_eq!(report.results.len(), 2);
    assert!(report.results[0].success);
    assert_eq!(report.results[0].count, 3);
    assert!(!report.results[1].success);
    assert!(engine.get_snapshot(None).captured_at.is_none());

    let empty = engine.check_connections(Provider::SkyBitz).await;
    assert!(!empty.success);
    assert!(empty.results.is_empty());
}
