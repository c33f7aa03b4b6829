//! HTTP API Adapter - Exchange REST Surface
//!
//! Serves the trading, wallet, lifecycle and read-side operations over
//! axum 0.7, plus the `/live`, `/ready` and `/metrics` probes. Every
//! `/v1` request authenticates with a bearer token that the identity
//! provider resolves and the eligibility policy turns into a caller.
//!
//! Sub-modules:
//! - `error`: engine error to HTTP status mapping
//! - `routes`: request handlers and the router
//! - `types`: request/response bodies

pub mod error;
pub mod routes;
pub mod types;

use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::adapters::metrics::{HealthState, MetricsRegistry};
use crate::config::AppConfig;
use crate::ports::clock::Clock;
use crate::ports::identity::IdentityProvider;
use crate::ports::store::Store;
use crate::usecases::access::EligibilityPolicy;
use crate::usecases::leaderboard::Leaderboard;
use crate::usecases::lifecycle::MarketLifecycle;
use crate::usecases::portfolio::PortfolioService;
use crate::usecases::settlement::SettlementService;
use crate::usecases::trading::TradeService;
use crate::usecases::wallet_manager::{WalletManager, WalletPolicy};

pub use error::ApiError;
pub use routes::router;

/// Services and collaborators shared by all handlers.
pub struct AppState<S: Store, C: Clock, I: IdentityProvider> {
    pub trades: TradeService<S, C>,
    pub wallets: WalletManager<S, C>,
    pub lifecycle: MarketLifecycle<S, C>,
    pub settlement: SettlementService<S, C>,
    pub portfolio: PortfolioService<S>,
    pub leaderboard: Leaderboard<S>,
    pub identity: Arc<I>,
    pub policy: EligibilityPolicy,
    /// `None` when metrics export is disabled.
    pub metrics: Option<Arc<MetricsRegistry>>,
    pub health: HealthState,
    store: Arc<S>,
}

impl<S: Store, C: Clock, I: IdentityProvider> AppState<S, C, I> {
    /// Wire every use case over one store and clock.
    pub fn new(
        store: Arc<S>,
        clock: Arc<C>,
        identity: Arc<I>,
        config: &AppConfig,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            trades: TradeService::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                config.engine.sizing_params(),
            ),
            wallets: WalletManager::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                WalletPolicy::from_config(&config.wallets),
            ),
            lifecycle: MarketLifecycle::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                config.engine.default_liquidity,
            ),
            settlement: SettlementService::new(Arc::clone(&store), clock),
            portfolio: PortfolioService::new(Arc::clone(&store)),
            leaderboard: Leaderboard::new(Arc::clone(&store)),
            identity,
            policy: EligibilityPolicy::from_config(&config.identity),
            metrics,
            health: HealthState::new(),
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Serve the router until the shutdown signal fires.
#[instrument(skip(app, shutdown_rx))]
pub async fn serve(
    app: Router,
    bind_address: String,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    Ok(())
}
