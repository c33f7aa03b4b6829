//! API Routes - Request Handlers and Router
//!
//! Handlers authenticate, translate bodies into use-case requests, record
//! metrics and map engine errors. No business rule lives here.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::debug;

use super::error::ApiError;
use super::types::{
    BetBody, LeaderboardQuery, LockBody, QuoteBody, QuoteResponse, ResolveBody, SellBody,
    WalletScope,
};
use super::AppState;
use crate::domain::caller::Caller;
use crate::domain::error::EngineResult;
use crate::domain::ledger::Wallet;
use crate::domain::market::{Market, MarketId};
use crate::domain::notification::Notification;
use crate::domain::scoring::UserScore;
use crate::ports::clock::Clock;
use crate::ports::identity::IdentityProvider;
use crate::ports::store::Store;
use crate::usecases::lifecycle::NewMarket;
use crate::usecases::portfolio::Portfolio;
use crate::usecases::settlement::SettlementReport;
use crate::usecases::trading::{BetReceipt, BetRequest, SellReceipt, SellRequest};

const DEFAULT_LEADERBOARD_ROWS: usize = 50;
const MAX_LEADERBOARD_ROWS: usize = 500;

type Shared<S, C, I> = State<Arc<AppState<S, C, I>>>;
type Body<T> = Result<Json<T>, JsonRejection>;

/// Build the full router: probes, metrics and the `/v1` API.
pub fn router<S: Store, C: Clock, I: IdentityProvider>(state: Arc<AppState<S, C, I>>) -> Router {
    Router::new()
        .route("/live", get(liveness))
        .route("/ready", get(readiness::<S, C, I>))
        .route("/metrics", get(metrics::<S, C, I>))
        .route("/v1/markets", post(create_market::<S, C, I>))
        .route("/v1/markets/:id", get(get_market::<S, C, I>))
        .route("/v1/markets/:id/lock", post(lock_market::<S, C, I>))
        .route("/v1/markets/:id/bets", post(place_bet::<S, C, I>))
        .route("/v1/markets/:id/sells", post(sell_shares::<S, C, I>))
        .route("/v1/markets/:id/quote", post(quote::<S, C, I>))
        .route("/v1/markets/:id/resolve", post(resolve_market::<S, C, I>))
        .route("/v1/markets/:id/cancel", post(cancel_market::<S, C, I>))
        .route(
            "/v1/wallets",
            post(open_wallet::<S, C, I>).get(wallet_balance::<S, C, I>),
        )
        .route("/v1/portfolio", get(portfolio::<S, C, I>))
        .route("/v1/notifications", get(notifications::<S, C, I>))
        .route("/v1/leaderboard", get(leaderboard::<S, C, I>))
        .with_state(state)
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness probe: 200 only while accepting traffic with a healthy store.
async fn readiness<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
) -> impl IntoResponse {
    if state.health.is_ready(state.store().is_healthy().await) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(metrics) = &state.metrics else {
        return Ok((StatusCode::NOT_FOUND, [(header::CONTENT_TYPE, "text/plain")], String::new()));
    };
    metrics
        .store_conflicts
        .set(i64::try_from(state.store().conflict_count()).unwrap_or(i64::MAX));
    let text = metrics
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}

async fn create_market<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    body: Body<NewMarket>,
) -> Result<(StatusCode, Json<Market>), ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let Json(request) = body.map_err(bad_request)?;
    let market = observed(
        &state,
        "create_market",
        state.lifecycle.create_market(&caller, request).await,
    )?;
    Ok((StatusCode::CREATED, Json(market)))
}

async fn get_market<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    Path(market_id): Path<MarketId>,
) -> Result<Json<Market>, ApiError> {
    authenticate(&state, &headers).await?;
    let market = observed(&state, "get_market", state.lifecycle.market(&market_id).await)?;
    Ok(Json(market))
}

async fn lock_market<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    Path(market_id): Path<MarketId>,
    body: Body<LockBody>,
) -> Result<Json<Market>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let Json(body) = body.map_err(bad_request)?;
    let market = observed(
        &state,
        "lock",
        state
            .lifecycle
            .set_locked(&caller, &market_id, body.locked)
            .await,
    )?;
    Ok(Json(market))
}

async fn place_bet<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    Path(market_id): Path<MarketId>,
    body: Body<BetBody>,
) -> Result<Json<BetReceipt>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let Json(body) = body.map_err(bad_request)?;
    let request = BetRequest {
        market_id,
        side: body.side,
        amount: body.amount,
        scope_id: body.scope_id,
    };

    let started = Instant::now();
    let receipt = observed(&state, "bet", state.trades.place_bet(&caller, request).await)?;
    if let Some(metrics) = &state.metrics {
        metrics.record_trade("buy", receipt.side, elapsed_us(started));
    }
    Ok(Json(receipt))
}

async fn sell_shares<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    Path(market_id): Path<MarketId>,
    body: Body<SellBody>,
) -> Result<Json<SellReceipt>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let Json(body) = body.map_err(bad_request)?;
    let request = SellRequest {
        market_id,
        side: body.side,
        shares: body.shares,
        scope_id: body.scope_id,
    };

    let started = Instant::now();
    let receipt = observed(&state, "sell", state.trades.sell_shares(&caller, request).await)?;
    if let Some(metrics) = &state.metrics {
        metrics.record_trade("sell", receipt.side, elapsed_us(started));
    }
    Ok(Json(receipt))
}

async fn quote<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    Path(market_id): Path<MarketId>,
    body: Body<QuoteBody>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let Json(body) = body.map_err(bad_request)?;
    let response = match (body.amount, body.shares) {
        (Some(amount), None) => {
            let request = BetRequest {
                market_id,
                side: body.side,
                amount,
                scope_id: body.scope_id,
            };
            QuoteResponse::Buy(observed(
                &state,
                "quote",
                state.trades.quote_bet(&caller, &request).await,
            )?)
        }
        (None, Some(shares)) => {
            let request = SellRequest {
                market_id,
                side: body.side,
                shares,
                scope_id: body.scope_id,
            };
            QuoteResponse::Sell(observed(
                &state,
                "quote",
                state.trades.quote_sale(&caller, &request).await,
            )?)
        }
        _ => {
            return Err(ApiError::BadRequest(
                "quote needs exactly one of amount or shares".to_string(),
            ));
        }
    };
    Ok(Json(response))
}

async fn resolve_market<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    Path(market_id): Path<MarketId>,
    body: Body<ResolveBody>,
) -> Result<Json<SettlementReport>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let Json(body) = body.map_err(bad_request)?;
    let report = observed(
        &state,
        "resolve",
        state
            .settlement
            .resolve_market(&caller, &market_id, body.outcome)
            .await,
    )?;
    record_settlement(&state, &report);
    Ok(Json(report))
}

async fn cancel_market<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    Path(market_id): Path<MarketId>,
) -> Result<Json<SettlementReport>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let report = observed(
        &state,
        "cancel",
        state.settlement.cancel_market(&caller, &market_id).await,
    )?;
    record_settlement(&state, &report);
    Ok(Json(report))
}

async fn open_wallet<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    body: Body<WalletScope>,
) -> Result<Json<Wallet>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let Json(scope) = body.map_err(bad_request)?;
    let wallet = observed(
        &state,
        "open_wallet",
        state.wallets.open_wallet(&caller, scope.scope_id).await,
    )?;
    Ok(Json(wallet))
}

async fn wallet_balance<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    Query(scope): Query<WalletScope>,
) -> Result<Json<Wallet>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let wallet = observed(
        &state,
        "balance",
        state.wallets.balance(&caller, scope.scope_id).await,
    )?;
    Ok(Json(wallet))
}

async fn portfolio<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
) -> Result<Json<Portfolio>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let portfolio = observed(&state, "portfolio", state.portfolio.portfolio(&caller).await)?;
    Ok(Json(portfolio))
}

async fn notifications<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let notifications = observed(
        &state,
        "notifications",
        state.portfolio.notifications(&caller).await,
    )?;
    Ok(Json(notifications))
}

async fn leaderboard<S: Store, C: Clock, I: IdentityProvider>(
    State(state): Shared<S, C, I>,
    headers: HeaderMap,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<UserScore>>, ApiError> {
    authenticate(&state, &headers).await?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_ROWS)
        .clamp(1, MAX_LEADERBOARD_ROWS);
    let scores = observed(&state, "leaderboard", state.leaderboard.top(limit).await)?;
    Ok(Json(scores))
}

/// Bearer token -> identity -> caller with eligibility decided.
async fn authenticate<S: Store, C: Clock, I: IdentityProvider>(
    state: &AppState<S, C, I>,
    headers: &HeaderMap,
) -> Result<Caller, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
    let identity = state
        .identity
        .resolve(token)
        .await
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
    Ok(state.policy.assess(identity))
}

/// Count engine rejections per operation before mapping them.
fn observed<T, S: Store, C: Clock, I: IdentityProvider>(
    state: &AppState<S, C, I>,
    operation: &str,
    result: EngineResult<T>,
) -> Result<T, ApiError> {
    result.map_err(|error| {
        if let Some(metrics) = &state.metrics {
            metrics.record_rejection(operation, &error);
        }
        debug!(operation, error = %error, "Request rejected");
        ApiError::Engine(error)
    })
}

fn record_settlement<S: Store, C: Clock, I: IdentityProvider>(
    state: &AppState<S, C, I>,
    report: &SettlementReport,
) {
    if let Some(metrics) = &state.metrics {
        metrics.record_settlement(report.kind, report.credited);
    }
}

fn bad_request(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

fn elapsed_us(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1e6
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::adapters::identity::StaticTokenProvider;
    use crate::adapters::metrics::MetricsRegistry;
    use crate::adapters::persistence::InMemoryStore;
    use crate::config::loader::parse_config;
    use crate::domain::market::Outcome;
    use crate::ports::clock::SystemClock;

    const CONFIG: &str = r#"
[server]
name = "test"

[wallets]
initial_balance = 100.0

[[identity.tokens]]
token = "t-alice"
user_id = "alice"
email = "alice@example.edu"
claims = [{ claim = "verified" }]

[[identity.tokens]]
token = "t-guest"
user_id = "guest"
"#;

    type TestState = AppState<InMemoryStore, SystemClock, StaticTokenProvider>;

    fn state() -> Arc<TestState> {
        let config = parse_config(CONFIG).unwrap();
        Arc::new(AppState::new(
            Arc::new(InMemoryStore::new(5, 100)),
            Arc::new(SystemClock),
            Arc::new(StaticTokenProvider::from_config(&config.identity)),
            &config,
            Some(Arc::new(MetricsRegistry::new().unwrap())),
        ))
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_missing_or_unknown_token_is_unauthorized() {
        let state = state();
        let err = portfolio(State(Arc::clone(&state)), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = portfolio(State(state), bearer("t-nobody")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bet_flow_through_handlers() {
        let state = state();
        let alice = bearer("t-alice");

        open_wallet(
            State(Arc::clone(&state)),
            alice.clone(),
            Ok(Json(WalletScope::default())),
        )
        .await
        .unwrap();
        let (status, Json(market)) = create_market(
            State(Arc::clone(&state)),
            alice.clone(),
            Ok(Json(NewMarket {
                question: "Will it snow?".into(),
                liquidity: None,
                scope_id: None,
            })),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(receipt) = place_bet(
            State(Arc::clone(&state)),
            alice.clone(),
            Path(market.id.clone()),
            Ok(Json(BetBody {
                side: Outcome::Yes,
                amount: 10.0,
                scope_id: None,
            })),
        )
        .await
        .unwrap();
        assert!(receipt.new_probability > 0.5);
        assert_eq!(receipt.balance, 90.0);

        let rendered = state.metrics.as_ref().unwrap().render().unwrap();
        assert!(rendered.contains("kind=\"buy\""));
    }

    #[tokio::test]
    async fn test_ineligible_caller_is_forbidden_and_counted() {
        let state = state();
        let err = open_wallet(
            State(Arc::clone(&state)),
            bearer("t-guest"),
            Ok(Json(WalletScope::default())),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let rendered = state.metrics.as_ref().unwrap().render().unwrap();
        assert!(rendered.contains("reason=\"not_eligible\""));
    }

    #[tokio::test]
    async fn test_quote_requires_exactly_one_size() {
        let state = state();
        let err = quote(
            State(state),
            bearer("t-alice"),
            Path("m".to_string()),
            Ok(Json(QuoteBody {
                side: Outcome::No,
                amount: Some(1.0),
                shares: Some(1.0),
                scope_id: None,
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
