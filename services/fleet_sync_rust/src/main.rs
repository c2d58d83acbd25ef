use anyhow::{Context, Result};
use dotenv::dotenv;
use fleet_rust_core::{AccountRegistry, EngineConfig, FleetEngine};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Fleet Sync Service...");

    // Config
    let config = EngineConfig::from_env().context("Invalid engine configuration")?;
    let registry = Arc::new(AccountRegistry::from_env());
    if registry.is_empty() {
        warn!("No vendor accounts configured; snapshots will stay empty");
    }

    // Engine
    let engine = Arc::new(
        FleetEngine::new(registry, config).context("Failed to initialize vendor clients")?,
    );

    // Initial load, then the scheduled loop
    let periodic = engine.start().await;

    let health = engine.health();
    info!(
        "Tracking {} trailers ({} Spireon, {} SkyBitz accounts)",
        health.trailers, health.providers.spireon, health.providers.skybitz
    );
    for summary in engine.get_provider_summary() {
        info!(
            "  {} - {}: {:?} ({} trailers)",
            summary.kind, summary.name, summary.status, summary.record_count
        );
    }
    info!(
        "Next refresh in {}s",
        engine.config().refresh_interval.as_secs()
    );

    shutdown_signal().await;

    periodic.abort();
    info!("Fleet Sync Service stopped");

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM");
            }
            Err(err) => {
                error!("Unable to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
