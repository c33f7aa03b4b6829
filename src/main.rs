//! LMSR Exchange — Entry Point
//!
//! Initializes configuration, logging and the store, then serves the
//! HTTP API until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Restore the in-memory store from the last snapshot
//! 4. Build metrics, identity provider and use-case services
//! 5. Spawn the API server (API + /live + /ready + /metrics)
//! 6. Spawn the periodic snapshot and top-up tasks
//! 7. Wait for SIGINT → graceful shutdown (drain→stop→save→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use lmsr_exchange::adapters::api::{self, AppState};
use lmsr_exchange::adapters::identity::StaticTokenProvider;
use lmsr_exchange::adapters::metrics::MetricsRegistry;
use lmsr_exchange::adapters::persistence::{InMemoryStore, SnapshotFile};
use lmsr_exchange::config;
use lmsr_exchange::ports::clock::SystemClock;

type State = AppState<InMemoryStore, SystemClock, StaticTokenProvider>;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.server.name,
        version = env!("CARGO_PKG_VERSION"),
        liquidity = config.engine.default_liquidity,
        "Starting LMSR exchange"
    );

    // ── 3. Restore store from snapshot ──────────────────────
    let snapshots = Arc::new(
        SnapshotFile::new(&config.persistence.data_dir)
            .await
            .context("Failed to open snapshot directory")?,
    );
    let store = match snapshots.load().await.context("Failed to load snapshot")? {
        Some(snapshot) => InMemoryStore::from_snapshot(
            snapshot,
            config.store.max_transaction_attempts,
            config.store.max_batch_size,
        ),
        None => InMemoryStore::new(
            config.store.max_transaction_attempts,
            config.store.max_batch_size,
        ),
    };
    let store = Arc::new(store);

    // ── 4. Metrics, identity and services ───────────────────
    let metrics = if config.metrics.enabled {
        Some(Arc::new(
            MetricsRegistry::new().context("Failed to register metrics")?,
        ))
    } else {
        None
    };
    let identity = Arc::new(StaticTokenProvider::from_config(&config.identity));
    let state: Arc<State> = Arc::new(AppState::new(
        Arc::clone(&store),
        Arc::new(SystemClock),
        identity,
        &config,
        metrics,
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // ── 5. Spawn API server ─────────────────────────────────
    let app = api::router(Arc::clone(&state));
    let server_handle = tokio::spawn(api::serve(
        app,
        config.server.bind_address.clone(),
        shutdown_tx.subscribe(),
    ));

    // ── 6. Spawn background tasks ───────────────────────────
    let snapshot_handle = tokio::spawn(run_snapshots(
        Arc::clone(&store),
        Arc::clone(&snapshots),
        Duration::from_secs(config.persistence.snapshot_interval_seconds),
        shutdown_tx.subscribe(),
    ));
    let top_up_handle = tokio::spawn(run_top_ups(
        Arc::clone(&state),
        Duration::from_secs(config.wallets.top_up_check_seconds),
        shutdown_tx.subscribe(),
    ));

    info!("All tasks spawned, exchange is running");

    // ── 7. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
    }
    info!("SIGINT received, initiating graceful shutdown");

    // 1. Readiness probe → 503
    state.health.begin_drain();

    // 2. Signal all tasks to stop
    let _ = shutdown_tx.send(());

    // 3. Wait for in-flight requests (up to 30s)
    match tokio::time::timeout(Duration::from_secs(30), server_handle).await {
        Ok(Ok(Err(e))) => warn!(error = %e, "API server exited with error"),
        Err(_) => warn!("API server did not stop within 30s"),
        _ => {}
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), snapshot_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), top_up_handle).await;

    // 4. Final snapshot
    snapshots
        .save(&store.snapshot())
        .await
        .context("Failed to save final snapshot")?;

    info!("Shutdown complete");
    Ok(())
}

/// Save a snapshot every `interval` until shutdown.
async fn run_snapshots(
    store: Arc<InMemoryStore>,
    snapshots: Arc<SnapshotFile>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if let Err(e) = snapshots.save(&store.snapshot()).await {
                    error!(error = %e, "Periodic snapshot failed");
                }
            }
        }
    }
}

/// Run scheduled top-ups every `interval` until shutdown.
async fn run_top_ups(state: Arc<State>, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if let Err(e) = state.wallets.run_top_ups().await {
                    error!(error = %e, "Top-up run failed, will retry next tick");
                }
            }
        }
    }
}
