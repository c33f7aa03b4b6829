//! Portfolio Use Case - Position Views and Totals
//!
//! Positions are folded from the caller's ledger on demand and valued
//! against each market's current state. Fully exited positions (both
//! sides below the closed-position threshold) are left out.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::caller::Caller;
use crate::domain::error::EngineResult;
use crate::domain::market::{Market, MarketId, MarketStatus, Outcome, UserId};
use crate::domain::notification::Notification;
use crate::domain::position::{Position, Valuation, fold_positions};
use crate::ports::store::Store;
use crate::usecases::trading::market_not_found;

/// One open position with its market context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
  pub market_id: MarketId,
  pub question: String,
  pub status: MarketStatus,
  pub yes_shares: f64,
  pub no_shares: f64,
  pub avg_yes_price: Option<f64>,
  pub avg_no_price: Option<f64>,
  #[serde(flatten)]
  pub valuation: Valuation,
}

impl PositionView {
  fn build(position: &Position, market: &Market) -> EngineResult<Self> {
    Ok(Self {
      market_id: market.id.clone(),
      question: market.question.clone(),
      status: market.status,
      yes_shares: position.net_shares(Outcome::Yes),
      no_shares: position.net_shares(Outcome::No),
      avg_yes_price: position.average_entry_price(Outcome::Yes),
      avg_no_price: position.average_entry_price(Outcome::No),
      valuation: position.valuation(market)?,
    })
  }
}

/// A user's open positions and their totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
  pub user_id: UserId,
  pub positions: Vec<PositionView>,
  pub total_value: f64,
  pub total_cost_basis: f64,
  pub unrealized_pnl: f64,
}

/// Read-side view over a user's ledger.
pub struct PortfolioService<S: Store> {
  store: Arc<S>,
}

impl<S: Store> PortfolioService<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store }
  }

  /// Open positions of the caller, newest market first.
  #[instrument(skip(self, caller), fields(user = %caller.user_id))]
  pub async fn portfolio(&self, caller: &Caller) -> EngineResult<Portfolio> {
    let entries = self.store.user_ledger(&caller.user_id).await?;
    let mut markets: HashMap<MarketId, Market> = HashMap::new();
    let mut positions = Vec::new();

    for ((_, market_id), position) in fold_positions(&entries) {
      if position.is_closed() {
        continue;
      }
      if !markets.contains_key(&market_id) {
        let market = self
          .store
          .market(&market_id)
          .await?
          .ok_or_else(|| market_not_found(&market_id))?;
        markets.insert(market_id.clone(), market);
      }
      if let Some(market) = markets.get(&market_id) {
        positions.push(PositionView::build(&position, market)?);
      }
    }

    positions.sort_by(|a, b| {
      let created = |id: &MarketId| markets.get(id).map(|m| m.created_at);
      created(&b.market_id).cmp(&created(&a.market_id))
    });

    let total_value = positions.iter().map(|p| p.valuation.value).sum();
    let total_cost_basis = positions.iter().map(|p| p.valuation.cost_basis).sum();
    debug!(open_positions = positions.len(), "Portfolio built");
    Ok(Portfolio {
      user_id: caller.user_id.clone(),
      positions,
      total_value,
      total_cost_basis,
      unrealized_pnl: total_value - total_cost_basis,
    })
  }

  /// Settlement notifications addressed to the caller, newest first.
  pub async fn notifications(&self, caller: &Caller) -> EngineResult<Vec<Notification>> {
    self.store.notifications(&caller.user_id).await
  }
}
