//! In-Memory Store - Optimistic Transactions over Versioned Documents
//!
//! Implements the `Store` port for single-process deployments and tests.
//! Every document carries a version. A transaction records the version of
//! each document it reads, buffers its writes, and commits only if none of
//! those versions moved; otherwise it re-runs the closure against fresh
//! state, up to `max_attempts` times.
//!
//! Locks are held only for the duration of a single read or a single
//! commit, never across a closure call or an await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::error::{EngineError, EngineResult, StoreError};
use crate::domain::ledger::{LedgerEntry, Wallet, WalletKey};
use crate::domain::market::{Market, MarketId, UserId};
use crate::domain::notification::Notification;
use crate::domain::payout::SettlementRecord;
use crate::ports::store::{BatchOutcome, Store, Transaction, WriteOp};

/// Snapshot format version.
const SNAPSHOT_VERSION: &str = "1";

/// Serializable copy of the whole store, used for crash recovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: String,
    pub taken_at: Option<DateTime<Utc>>,
    pub markets: Vec<Market>,
    pub wallets: Vec<Wallet>,
    pub ledger: Vec<LedgerEntry>,
    pub settlements: Vec<SettlementRecord>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone)]
struct Versioned<T> {
    value: T,
    version: u64,
}

/// Document identity used for read tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DocKey {
    Market(MarketId),
    Wallet(WalletKey),
    /// The ledger of one market; bumped on append and on refund voiding.
    Ledger(MarketId),
}

#[derive(Debug, Default)]
struct StoreState {
    markets: HashMap<MarketId, Versioned<Market>>,
    wallets: HashMap<WalletKey, Versioned<Wallet>>,
    ledger: Vec<LedgerEntry>,
    ledger_versions: HashMap<MarketId, u64>,
    settlements: HashMap<(MarketId, UserId), SettlementRecord>,
    notifications: Vec<Notification>,
}

impl StoreState {
    fn version_of(&self, key: &DocKey) -> u64 {
        match key {
            DocKey::Market(id) => self.markets.get(id).map_or(0, |d| d.version),
            DocKey::Wallet(k) => self.wallets.get(k).map_or(0, |d| d.version),
            DocKey::Ledger(id) => self.ledger_versions.get(id).copied().unwrap_or(0),
        }
    }

    fn put_market(&mut self, market: Market) {
        let version = self.version_of(&DocKey::Market(market.id.clone())) + 1;
        self.markets
            .insert(market.id.clone(), Versioned { value: market, version });
    }

    fn put_wallet(&mut self, wallet: Wallet) {
        let version = self.version_of(&DocKey::Wallet(wallet.key.clone())) + 1;
        self.wallets
            .insert(wallet.key.clone(), Versioned { value: wallet, version });
    }

    fn append_ledger(&mut self, entry: LedgerEntry) {
        *self
            .ledger_versions
            .entry(entry.market_id.clone())
            .or_default() += 1;
        self.ledger.push(entry);
    }

    /// Credit a wallet, opening it at zero if the user never held one.
    fn credit(&mut self, key: &WalletKey, amount: f64, at: DateTime<Utc>) -> EngineResult<()> {
        let mut wallet = self
            .wallets
            .get(key)
            .map_or_else(|| Wallet::new(key.clone(), 0.0, at), |d| d.value.clone());
        wallet.credit(amount)?;
        self.put_wallet(wallet);
        Ok(())
    }

    fn void_entries(&mut self, market_id: &MarketId, entry_ids: &[uuid::Uuid]) {
        let mut touched = false;
        for entry in self
            .ledger
            .iter_mut()
            .filter(|e| &e.market_id == market_id && entry_ids.contains(&e.id))
        {
            entry.refunded = true;
            touched = true;
        }
        if touched {
            *self.ledger_versions.entry(market_id.clone()).or_default() += 1;
        }
    }

    /// Apply one batch write; `Ok(false)` when its marker says it already ran.
    fn apply(&mut self, op: WriteOp) -> EngineResult<bool> {
        match op {
            WriteOp::Payout { record, notice } => {
                let key = (record.market_id.clone(), record.user_id.clone());
                if self.settlements.contains_key(&key) {
                    return Ok(false);
                }
                self.credit(&record.wallet, record.amount, record.settled_at)?;
                self.settlements.insert(key, record);
                self.notifications.push(notice);
                Ok(true)
            }
            WriteOp::Refund {
                record,
                entry_ids,
                notice,
            } => {
                let key = (record.market_id.clone(), record.user_id.clone());
                if self.settlements.contains_key(&key) {
                    return Ok(false);
                }
                self.credit(&record.wallet, record.amount, record.settled_at)?;
                self.void_entries(&record.market_id, &entry_ids);
                self.settlements.insert(key, record);
                self.notifications.push(notice);
                Ok(true)
            }
            WriteOp::TopUp {
                wallet,
                amount,
                at,
                not_since,
            } => {
                let Some(doc) = self.wallets.get(&wallet) else {
                    return Ok(false);
                };
                if doc.value.last_top_up.is_some_and(|last| last > not_since) {
                    return Ok(false);
                }
                let mut updated = doc.value.clone();
                updated.credit(amount)?;
                updated.last_top_up = Some(at);
                self.put_wallet(updated);
                Ok(true)
            }
        }
    }
}

/// Buffered transaction over [`InMemoryStore`].
struct MemoryTransaction<'a> {
    state: &'a RwLock<StoreState>,
    reads: HashMap<DocKey, u64>,
    markets: HashMap<MarketId, Market>,
    wallets: HashMap<WalletKey, Wallet>,
    entries: Vec<LedgerEntry>,
}

impl<'a> MemoryTransaction<'a> {
    fn new(state: &'a RwLock<StoreState>) -> Self {
        Self {
            state,
            reads: HashMap::new(),
            markets: HashMap::new(),
            wallets: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// First read of a document pins its version for the commit check.
    fn track(&mut self, key: DocKey, version: u64) {
        self.reads.entry(key).or_insert(version);
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn market(&mut self, id: &MarketId) -> EngineResult<Option<Market>> {
        if let Some(buffered) = self.markets.get(id) {
            return Ok(Some(buffered.clone()));
        }
        let (value, version) = {
            let state = self.state.read();
            state
                .markets
                .get(id)
                .map_or((None, 0), |d| (Some(d.value.clone()), d.version))
        };
        self.track(DocKey::Market(id.clone()), version);
        Ok(value)
    }

    fn wallet(&mut self, key: &WalletKey) -> EngineResult<Option<Wallet>> {
        if let Some(buffered) = self.wallets.get(key) {
            return Ok(Some(buffered.clone()));
        }
        let (value, version) = {
            let state = self.state.read();
            state
                .wallets
                .get(key)
                .map_or((None, 0), |d| (Some(d.value.clone()), d.version))
        };
        self.track(DocKey::Wallet(key.clone()), version);
        Ok(value)
    }

    fn user_market_ledger(
        &mut self,
        user_id: &UserId,
        market_id: &MarketId,
    ) -> EngineResult<Vec<LedgerEntry>> {
        let (entries, version) = {
            let state = self.state.read();
            let entries: Vec<LedgerEntry> = state
                .ledger
                .iter()
                .filter(|e| &e.user_id == user_id && &e.market_id == market_id)
                .cloned()
                .collect();
            (entries, state.version_of(&DocKey::Ledger(market_id.clone())))
        };
        self.track(DocKey::Ledger(market_id.clone()), version);
        let pending = self
            .entries
            .iter()
            .filter(|e| &e.user_id == user_id && &e.market_id == market_id)
            .cloned();
        Ok(entries.into_iter().chain(pending).collect())
    }

    fn put_market(&mut self, market: Market) {
        self.markets.insert(market.id.clone(), market);
    }

    fn put_wallet(&mut self, wallet: Wallet) {
        self.wallets.insert(wallet.key.clone(), wallet);
    }

    fn append_ledger(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }
}

/// In-process implementation of the `Store` port.
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    /// Attempts per transaction before `RetriesExhausted`.
    max_attempts: u32,
    /// Writes allowed per batch.
    max_batch_size: usize,
    /// Transaction attempts lost to a concurrent writer.
    conflicts: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new(max_attempts: u32, max_batch_size: usize) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            max_attempts: max_attempts.max(1),
            max_batch_size: max_batch_size.max(1),
            conflicts: AtomicU64::new(0),
        }
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot, max_attempts: u32, max_batch_size: usize) -> Self {
        let store = Self::new(max_attempts, max_batch_size);
        {
            let mut state = store.state.write();
            for market in snapshot.markets {
                state.put_market(market);
            }
            for wallet in snapshot.wallets {
                state.put_wallet(wallet);
            }
            for entry in snapshot.ledger {
                state.append_ledger(entry);
            }
            for record in snapshot.settlements {
                state
                    .settlements
                    .insert((record.market_id.clone(), record.user_id.clone()), record);
            }
            state.notifications = snapshot.notifications;
        }
        store
    }

    /// Copy the current state out for persistence.
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read();
        let mut markets: Vec<Market> = state.markets.values().map(|d| d.value.clone()).collect();
        markets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let mut wallets: Vec<Wallet> = state.wallets.values().map(|d| d.value.clone()).collect();
        wallets.sort_by(|a, b| a.key.cmp(&b.key));
        let mut settlements: Vec<SettlementRecord> = state.settlements.values().cloned().collect();
        settlements.sort_by(|a, b| {
            (&a.market_id, &a.user_id).cmp(&(&b.market_id, &b.user_id))
        });
        StoreSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            taken_at: Some(Utc::now()),
            markets,
            wallets,
            ledger: state.ledger.clone(),
            settlements,
            notifications: state.notifications.clone(),
        }
    }

    /// Validate read versions and apply buffered writes in one critical section.
    fn try_commit(&self, tx: MemoryTransaction<'_>) -> Result<(), DocKey> {
        let MemoryTransaction {
            reads,
            markets,
            wallets,
            entries,
            ..
        } = tx;
        let mut state = self.state.write();
        if let Some((key, _)) = reads.iter().find(|(key, v)| state.version_of(key) != **v) {
            return Err(key.clone());
        }
        for market in markets.into_values() {
            state.put_market(market);
        }
        for wallet in wallets.into_values() {
            state.put_wallet(wallet);
        }
        for entry in entries {
            state.append_ledger(entry);
        }
        Ok(())
    }

    #[cfg(test)]
    fn write_directly(&self, wallet: Wallet) {
        self.state.write().put_wallet(wallet);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn market(&self, id: &MarketId) -> EngineResult<Option<Market>> {
        Ok(self.state.read().markets.get(id).map(|d| d.value.clone()))
    }

    async fn markets(&self) -> EngineResult<Vec<Market>> {
        Ok(self.snapshot().markets)
    }

    async fn insert_market(&self, market: Market) -> EngineResult<()> {
        let mut state = self.state.write();
        if state.markets.contains_key(&market.id) {
            return Err(EngineError::invalid(format!(
                "market {} already exists",
                market.id
            )));
        }
        state.put_market(market);
        Ok(())
    }

    async fn wallet(&self, key: &WalletKey) -> EngineResult<Option<Wallet>> {
        Ok(self.state.read().wallets.get(key).map(|d| d.value.clone()))
    }

    async fn wallets(&self) -> EngineResult<Vec<Wallet>> {
        let mut wallets: Vec<Wallet> = self
            .state
            .read()
            .wallets
            .values()
            .map(|d| d.value.clone())
            .collect();
        wallets.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(wallets)
    }

    async fn market_ledger(&self, market_id: &MarketId) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self
            .state
            .read()
            .ledger
            .iter()
            .filter(|e| &e.market_id == market_id)
            .cloned()
            .collect())
    }

    async fn user_ledger(&self, user_id: &UserId) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self
            .state
            .read()
            .ledger
            .iter()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn settlement_records(&self, market_id: &MarketId) -> EngineResult<Vec<SettlementRecord>> {
        Ok(self
            .state
            .read()
            .settlements
            .values()
            .filter(|r| &r.market_id == market_id)
            .cloned()
            .collect())
    }

    async fn notifications(&self, user_id: &UserId) -> EngineResult<Vec<Notification>> {
        let mut found: Vec<Notification> = self
            .state
            .read()
            .notifications
            .iter()
            .filter(|n| &n.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn transact<T, F>(&self, mut f: F) -> EngineResult<T>
    where
        T: Send,
        F: FnMut(&mut dyn Transaction) -> EngineResult<T> + Send,
    {
        for attempt in 1..=self.max_attempts {
            let mut tx = MemoryTransaction::new(&self.state);
            let value = f(&mut tx)?;
            match self.try_commit(tx) {
                Ok(()) => return Ok(value),
                Err(key) => {
                    self.conflicts.fetch_add(1, Ordering::Relaxed);
                    debug!(attempt, document = ?key, "Transaction conflict, retrying");
                }
            }
        }
        warn!(attempts = self.max_attempts, "Transaction retries exhausted");
        Err(StoreError::RetriesExhausted {
            attempts: self.max_attempts,
        }
        .into())
    }

    async fn commit_batch(&self, ops: Vec<WriteOp>) -> EngineResult<BatchOutcome> {
        if ops.len() > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size: ops.len(),
                limit: self.max_batch_size,
            }
            .into());
        }
        for op in &ops {
            validate_op(op)?;
        }

        let mut state = self.state.write();
        let mut outcome = BatchOutcome::default();
        for op in ops {
            let amount = op.amount();
            if state.apply(op)? {
                outcome.applied += 1;
                outcome.credited += amount;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(outcome)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }
}

/// Reject malformed credits before touching state so batches stay all-or-nothing.
fn validate_op(op: &WriteOp) -> EngineResult<()> {
    let amount = op.amount();
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::invalid(format!(
            "batch credit must be finite and >= 0, got {amount}"
        )))
    }
}
