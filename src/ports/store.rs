//! Store Port - Transactional Document Store Interface
//!
//! The engine's only persistence collaborator. Required capabilities:
//! - point reads and listings (outside transactions, may be slightly stale)
//! - `transact`: optimistic read-modify-write with transparent retry on
//!   write conflicts; closure errors abort without writing anything
//! - `commit_batch`: bounded-size atomic batches of conditional writes used
//!   by bulk settlement and top-up jobs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::error::EngineResult;
use crate::domain::ledger::{LedgerEntry, Wallet, WalletKey};
use crate::domain::market::{Market, MarketId, UserId};
use crate::domain::notification::Notification;
use crate::domain::payout::SettlementRecord;

/// Read/write view handed to a transaction closure.
///
/// Reads observe the latest committed state and are tracked for conflict
/// detection. Writes are buffered and applied only if the closure returns
/// `Ok` and no tracked document changed in the meantime.
pub trait Transaction {
  /// Read a market document.
  fn market(&mut self, id: &MarketId) -> EngineResult<Option<Market>>;

  /// Read a wallet document.
  fn wallet(&mut self, key: &WalletKey) -> EngineResult<Option<Wallet>>;

  /// Read every ledger entry of one user on one market.
  fn user_market_ledger(
    &mut self,
    user_id: &UserId,
    market_id: &MarketId,
  ) -> EngineResult<Vec<LedgerEntry>>;

  /// Buffer a market write.
  fn put_market(&mut self, market: Market);

  /// Buffer a wallet write.
  fn put_wallet(&mut self, wallet: Wallet);

  /// Buffer a ledger append.
  fn append_ledger(&mut self, entry: LedgerEntry);
}

/// One write inside an atomic batch.
///
/// Every write is conditional: the store re-checks its idempotency marker
/// while applying the batch and skips writes an earlier run already
/// applied. A settlement notice is recorded only when its credit is.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
  /// Credit a payout; skipped if a record for (market, user) exists.
  Payout {
    record: SettlementRecord,
    notice: Notification,
  },
  /// Credit a refund and void the listed entries; skipped if a record for
  /// (market, user) exists.
  Refund {
    record: SettlementRecord,
    entry_ids: Vec<Uuid>,
    notice: Notification,
  },
  /// Credit a top-up; skipped if the wallet was topped up after `not_since`.
  TopUp {
    wallet: WalletKey,
    amount: f64,
    at: DateTime<Utc>,
    not_since: DateTime<Utc>,
  },
}

impl WriteOp {
  /// Currency this write credits if applied.
  pub fn amount(&self) -> f64 {
    match self {
      Self::Payout { record, .. } | Self::Refund { record, .. } => record.amount,
      Self::TopUp { amount, .. } => *amount,
    }
  }
}

/// What a committed batch actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchOutcome {
  /// Writes applied.
  pub applied: usize,
  /// Writes skipped because their marker was already present.
  pub skipped: usize,
  /// Currency credited by the applied writes.
  pub credited: f64,
}

/// Trait for transactional document stores.
#[async_trait]
pub trait Store: Send + Sync + 'static {
  /// Fetch one market.
  async fn market(&self, id: &MarketId) -> EngineResult<Option<Market>>;

  /// List all markets.
  async fn markets(&self) -> EngineResult<Vec<Market>>;

  /// Create a market document (fails if the id exists).
  async fn insert_market(&self, market: Market) -> EngineResult<()>;

  /// Fetch one wallet.
  async fn wallet(&self, key: &WalletKey) -> EngineResult<Option<Wallet>>;

  /// List all wallets.
  async fn wallets(&self) -> EngineResult<Vec<Wallet>>;

  /// Point-in-time read of one market's ledger.
  async fn market_ledger(&self, market_id: &MarketId) -> EngineResult<Vec<LedgerEntry>>;

  /// Point-in-time read of one user's ledger across markets.
  async fn user_ledger(&self, user_id: &UserId) -> EngineResult<Vec<LedgerEntry>>;

  /// Settlement records already written for a market.
  async fn settlement_records(&self, market_id: &MarketId) -> EngineResult<Vec<SettlementRecord>>;

  /// Notifications addressed to a user, newest first.
  async fn notifications(&self, user_id: &UserId) -> EngineResult<Vec<Notification>>;

  /// Run `f` as one optimistic transaction.
  ///
  /// Write conflicts are retried transparently up to the store's attempt
  /// budget; errors returned by `f` abort immediately with no writes.
  async fn transact<T, F>(&self, f: F) -> EngineResult<T>
  where
    T: Send,
    F: FnMut(&mut dyn Transaction) -> EngineResult<T> + Send;

  /// Atomically apply a batch of at most [`Store::max_batch_size`] writes.
  async fn commit_batch(&self, ops: Vec<WriteOp>) -> EngineResult<BatchOutcome>;

  /// Store write limit per batch.
  fn max_batch_size(&self) -> usize;

  /// Check whether the store is usable.
  async fn is_healthy(&self) -> bool;

  /// Transaction attempts retried after a write conflict so far.
  fn conflict_count(&self) -> u64 {
    0
  }
}
