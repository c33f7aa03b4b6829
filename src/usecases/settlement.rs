//! Settlement Use Case - Resolution Payouts and Cancellation Refunds
//!
//! Settling a market is a terminal transition followed by a payout sweep.
//! The sweep is too large for one transaction, so it is chunked into
//! atomic batches of at most the store's write limit. Each credit carries
//! a per-(market, user) settlement record that the store checks inside
//! the batch, which makes the sweep safe to resume after a partial failure.
//!
//! Settlement flow:
//! 1. Transaction: authorize, then OPEN/LOCKED -> RESOLVED or CANCELLED
//! 2. Point-in-time read of the market's ledger
//! 3. Compute payouts (winning shares 1:1) or refunds (net positive cost)
//! 4. Commit credits and their notifications batch by batch
//! 5. Stamp `settled_at` once every batch has landed

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::domain::caller::Caller;
use crate::domain::error::EngineResult;
use crate::domain::ledger::WalletKey;
use crate::domain::market::{Market, MarketId, MarketStatus, Outcome, UserId};
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::payout::{
  SettlementKind, SettlementRecord, cancellation_refunds, resolution_payouts,
};
use crate::ports::clock::Clock;
use crate::ports::store::{Store, WriteOp};
use crate::usecases::lifecycle::ensure_manager;
use crate::usecases::trading::require_market;

/// Requested terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
  Resolve(Outcome),
  Cancel,
}

impl Terminal {
  /// Whether `market` already recorded this exact transition.
  fn recorded_on(self, market: &Market) -> bool {
    match self {
      Self::Resolve(outcome) => {
        market.status == MarketStatus::Resolved && market.resolution == Some(outcome)
      }
      Self::Cancel => market.status == MarketStatus::Cancelled,
    }
  }
}

/// Result of settling one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
  pub market_id: MarketId,
  pub status: MarketStatus,
  pub resolution: Option<Outcome>,
  /// Payout or refund, by terminal state.
  pub kind: SettlementKind,
  /// Users credited by this run.
  pub credited: usize,
  /// Users already settled by an earlier run.
  pub skipped: usize,
  /// Currency credited by this run.
  pub amount_credited: f64,
  /// Whether this run resumed an unfinished sweep.
  pub resumed: bool,
  pub settled_at: DateTime<Utc>,
}

/// Resolves and cancels markets and pays out their positions.
pub struct SettlementService<S: Store, C: Clock> {
  store: Arc<S>,
  clock: Arc<C>,
}

impl<S: Store, C: Clock> SettlementService<S, C> {
  pub fn new(store: Arc<S>, clock: Arc<C>) -> Self {
    Self { store, clock }
  }

  /// Resolve a market to `outcome` and pay winning shares 1:1.
  ///
  /// # Errors
  /// - `Forbidden` unless the caller created the market or is an admin
  /// - `AlreadyTerminal` when the market is terminal and either a different
  ///   transition was recorded or its sweep already finished
  /// - `Store` when a batch fails; re-running resumes the sweep
  #[instrument(skip(self, caller), fields(user = %caller.user_id, outcome = %outcome))]
  pub async fn resolve_market(
    &self,
    caller: &Caller,
    market_id: &MarketId,
    outcome: Outcome,
  ) -> EngineResult<SettlementReport> {
    let (market, resumed) = self
      .transition(caller, market_id, Terminal::Resolve(outcome))
      .await?;

    let entries = self.store.market_ledger(&market.id).await?;
    let now = self.clock.now();
    let ops = resolution_payouts(&entries, outcome)?
      .into_iter()
      .map(|payout| WriteOp::Payout {
        record: record(&market, &payout.user_id, SettlementKind::Payout, payout.amount, now),
        notice: Notification::new(
          payout.user_id.clone(),
          market.id.clone(),
          market.question.clone(),
          NotificationKind::MarketResolved {
            outcome,
            payout: payout.amount,
          },
          now,
        ),
      })
      .collect();

    self.sweep(market, SettlementKind::Payout, ops, resumed).await
  }

  /// Cancel a market and refund each user's net positive contribution.
  ///
  /// # Errors
  /// As [`SettlementService::resolve_market`].
  #[instrument(skip(self, caller), fields(user = %caller.user_id))]
  pub async fn cancel_market(&self, caller: &Caller, market_id: &MarketId) -> EngineResult<SettlementReport> {
    let (market, resumed) = self.transition(caller, market_id, Terminal::Cancel).await?;

    let entries = self.store.market_ledger(&market.id).await?;
    let now = self.clock.now();
    let ops = cancellation_refunds(&entries)?
      .into_iter()
      .map(|refund| WriteOp::Refund {
        record: record(&market, &refund.user_id, SettlementKind::Refund, refund.amount, now),
        notice: Notification::new(
          refund.user_id.clone(),
          market.id.clone(),
          market.question.clone(),
          NotificationKind::MarketCancelled {
            refund: refund.amount,
          },
          now,
        ),
        entry_ids: refund.entry_ids,
      })
      .collect();

    self.sweep(market, SettlementKind::Refund, ops, resumed).await
  }

  /// Apply the terminal transition, or detect an unfinished sweep to resume.
  async fn transition(
    &self,
    caller: &Caller,
    market_id: &MarketId,
    terminal: Terminal,
  ) -> EngineResult<(Market, bool)> {
    let now = self.clock.now();
    self
      .store
      .transact(|tx| {
        let mut market = require_market(tx, market_id)?;
        ensure_manager(caller, &market)?;
        if market.settled_at.is_none() && terminal.recorded_on(&market) {
          return Ok((market, true));
        }
        match terminal {
          Terminal::Resolve(outcome) => market.resolve(outcome, now)?,
          Terminal::Cancel => market.cancel(now)?,
        }
        market.check_invariants()?;
        tx.put_market(market.clone());
        Ok((market, false))
      })
      .await
  }

  /// Commit credits in store-sized batches, then stamp `settled_at`.
  async fn sweep(
    &self,
    market: Market,
    kind: SettlementKind,
    ops: Vec<WriteOp>,
    resumed: bool,
  ) -> EngineResult<SettlementReport> {
    if resumed {
      warn!(market = %market.id, status = %market.status, "Resuming unfinished settlement sweep");
    }

    let settled: HashSet<UserId> = self
      .store
      .settlement_records(&market.id)
      .await?
      .into_iter()
      .map(|r| r.user_id)
      .collect();
    let total = ops.len();
    let pending: Vec<WriteOp> = ops
      .into_iter()
      .filter(|op| match op {
        WriteOp::Payout { record, .. } | WriteOp::Refund { record, .. } => {
          !settled.contains(&record.user_id)
        }
        WriteOp::TopUp { .. } => true,
      })
      .collect();

    let mut report = SettlementReport {
      market_id: market.id.clone(),
      status: market.status,
      resolution: market.resolution,
      kind,
      credited: 0,
      skipped: total - pending.len(),
      amount_credited: 0.0,
      resumed,
      settled_at: self.clock.now(),
    };

    for chunk in pending.chunks(self.store.max_batch_size()) {
      match self.store.commit_batch(chunk.to_vec()).await {
        Ok(outcome) => {
          report.credited += outcome.applied;
          report.skipped += outcome.skipped;
          report.amount_credited += outcome.credited;
        }
        Err(e) => {
          error!(
            market = %market.id,
            error = %e,
            credited = report.credited,
            "Settlement batch failed, sweep left resumable"
          );
          return Err(e);
        }
      }
    }

    let settled_at = report.settled_at;
    self
      .store
      .transact(|tx| {
        let mut current = require_market(tx, &market.id)?;
        if current.settled_at.is_none() {
          current.settled_at = Some(settled_at);
          tx.put_market(current);
        }
        Ok(())
      })
      .await?;

    info!(
      market = %report.market_id,
      kind = %report.kind,
      credited = report.credited,
      skipped = report.skipped,
      amount = report.amount_credited,
      "Settlement complete"
    );
    Ok(report)
  }
}

fn record(
  market: &Market,
  user_id: &UserId,
  kind: SettlementKind,
  amount: f64,
  settled_at: DateTime<Utc>,
) -> SettlementRecord {
  SettlementRecord {
    market_id: market.id.clone(),
    user_id: user_id.clone(),
    wallet: WalletKey::for_market(user_id, market),
    kind,
    amount,
    settled_at,
  }
}
