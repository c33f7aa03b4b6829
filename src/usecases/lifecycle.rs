//! Market Lifecycle Use Case - Creation and Locking
//!
//! Terminal transitions (resolve / cancel) live in the settlement use case
//! because they trigger the payout sweep.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::caller::Caller;
use crate::domain::error::{EngineError, EngineResult};
use crate::domain::market::{Market, MarketId, ScopeId};
use crate::ports::clock::Clock;
use crate::ports::store::Store;
use crate::usecases::trading::{market_not_found, require_market};

/// Parameters for a new market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMarket {
  pub question: String,
  /// Liquidity parameter b; the configured default when absent.
  #[serde(default)]
  pub liquidity: Option<f64>,
  #[serde(default)]
  pub scope_id: Option<ScopeId>,
}

/// Creates markets and toggles trading locks.
pub struct MarketLifecycle<S: Store, C: Clock> {
  store: Arc<S>,
  clock: Arc<C>,
  default_liquidity: f64,
}

impl<S: Store, C: Clock> MarketLifecycle<S, C> {
  pub fn new(store: Arc<S>, clock: Arc<C>, default_liquidity: f64) -> Self {
    Self {
      store,
      clock,
      default_liquidity,
    }
  }

  /// Open a new market with an empty pool; the caller becomes its creator.
  #[instrument(skip(self, caller, request), fields(user = %caller.user_id))]
  pub async fn create_market(&self, caller: &Caller, request: NewMarket) -> EngineResult<Market> {
    caller.ensure_eligible()?;
    caller.ensure_scope_access(request.scope_id.as_ref())?;

    let market = Market::try_new(
      Uuid::new_v4().to_string(),
      request.question,
      caller.user_id.clone(),
      request.liquidity.unwrap_or(self.default_liquidity),
      request.scope_id,
      self.clock.now(),
    )?;
    self.store.insert_market(market.clone()).await?;

    info!(
      market = %market.id,
      liquidity = market.liquidity,
      scope = ?market.scope_id,
      "Market created"
    );
    Ok(market)
  }

  /// Lock (`true`) or reopen (`false`) trading. Creator or admin only.
  #[instrument(skip(self, caller), fields(user = %caller.user_id))]
  pub async fn set_locked(&self, caller: &Caller, market_id: &MarketId, locked: bool) -> EngineResult<Market> {
    let market = self
      .store
      .transact(|tx| {
        let mut market = require_market(tx, market_id)?;
        ensure_manager(caller, &market)?;
        market.set_locked(locked)?;
        tx.put_market(market.clone());
        Ok(market)
      })
      .await?;

    info!(market = %market.id, status = %market.status, "Market lock toggled");
    Ok(market)
  }

  /// Fetch one market.
  pub async fn market(&self, market_id: &MarketId) -> EngineResult<Market> {
    self
      .store
      .market(market_id)
      .await?
      .ok_or_else(|| market_not_found(market_id))
  }
}

/// Creator-level operations need the creator or an admin claim.
pub(crate) fn ensure_manager(caller: &Caller, market: &Market) -> EngineResult<()> {
  if market.is_managed_by(&caller.user_id, caller.is_admin()) {
    Ok(())
  } else {
    Err(EngineError::Forbidden(format!(
      "user {} may not manage market {}",
      caller.user_id, market.id
    )))
  }
}
