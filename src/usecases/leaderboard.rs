//! Leaderboard Use Case - Contrarian Scores across Resolved Markets

use std::sync::Arc;

use tracing::debug;

use crate::domain::error::EngineResult;
use crate::domain::market::MarketStatus;
use crate::domain::scoring::{UserScore, aggregate_scores};
use crate::ports::store::Store;

/// Ranks users by accumulated contrarian score.
pub struct Leaderboard<S: Store> {
  store: Arc<S>,
}

impl<S: Store> Leaderboard<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store }
  }

  /// Highest scores first, at most `limit` rows.
  pub async fn top(&self, limit: usize) -> EngineResult<Vec<UserScore>> {
    let markets: Vec<_> = self
      .store
      .markets()
      .await?
      .into_iter()
      .filter(|m| m.status == MarketStatus::Resolved)
      .collect();

    let mut entries = Vec::new();
    for market in &markets {
      entries.extend(self.store.market_ledger(&market.id).await?);
    }

    let mut scores = aggregate_scores(&markets, &entries);
    scores.truncate(limit);
    debug!(resolved_markets = markets.len(), rows = scores.len(), "Leaderboard computed");
    Ok(scores)
  }
}
