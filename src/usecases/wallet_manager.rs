//! Wallet Manager Use Case - Wallet Opening, Balances and Top-Ups
//!
//! A user holds one global wallet plus one wallet per community scope they
//! trade in. Wallets are opened with a configured starting balance and are
//! periodically topped up by a batch job whose idempotency marker is the
//! wallet's `last_top_up` timestamp, re-checked by the store inside each
//! atomic batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::WalletsConfig;
use crate::domain::caller::Caller;
use crate::domain::error::{EngineError, EngineResult};
use crate::domain::ledger::{Wallet, WalletKey};
use crate::domain::market::ScopeId;
use crate::ports::clock::Clock;
use crate::ports::store::{Store, WriteOp};

/// Starting balance and top-up schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletPolicy {
  /// Balance credited when a wallet is opened.
  pub initial_balance: f64,
  /// Amount credited per scheduled top-up (0 disables top-ups).
  pub top_up_amount: f64,
  /// Minimum time between two top-ups of one wallet.
  pub top_up_interval: Duration,
}

impl WalletPolicy {
  /// Build from the `[wallets]` config section.
  pub fn from_config(config: &WalletsConfig) -> Self {
    Self {
      initial_balance: config.initial_balance,
      top_up_amount: config.top_up_amount,
      top_up_interval: Duration::days(i64::from(config.top_up_interval_days)),
    }
  }
}

/// Summary of one top-up run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopUpReport {
  /// Wallets that looked due when the run started.
  pub wallets_due: usize,
  /// Wallets actually credited.
  pub credited: usize,
  /// Wallets skipped because another run credited them first.
  pub skipped: usize,
  /// Currency credited in total.
  pub amount_credited: f64,
  pub timestamp: Option<DateTime<Utc>>,
}

/// Opens wallets, reports balances and runs scheduled top-ups.
pub struct WalletManager<S: Store, C: Clock> {
  store: Arc<S>,
  clock: Arc<C>,
  policy: WalletPolicy,
}

impl<S: Store, C: Clock> WalletManager<S, C> {
  /// Create a wallet manager.
  pub fn new(store: Arc<S>, clock: Arc<C>, policy: WalletPolicy) -> Self {
    Self {
      store,
      clock,
      policy,
    }
  }

  /// Open the caller's wallet for `scope`, or return it if it exists.
  ///
  /// Scoped wallets require a membership claim for that scope.
  #[instrument(skip(self, caller), fields(user = %caller.user_id))]
  pub async fn open_wallet(&self, caller: &Caller, scope: Option<ScopeId>) -> EngineResult<Wallet> {
    caller.ensure_eligible()?;
    caller.ensure_scope_access(scope.as_ref())?;

    let key = WalletKey::new(caller.user_id.clone(), scope);
    let now = self.clock.now();
    let initial = self.policy.initial_balance;
    let (wallet, created) = self
      .store
      .transact(|tx| {
        if let Some(existing) = tx.wallet(&key)? {
          return Ok((existing, false));
        }
        let wallet = Wallet::new(key.clone(), initial, now);
        tx.put_wallet(wallet.clone());
        Ok((wallet, true))
      })
      .await?;

    if created {
      info!(wallet = %key, balance = wallet.balance, "Wallet opened");
    } else {
      debug!(wallet = %key, "Wallet already open");
    }
    Ok(wallet)
  }

  /// The caller's wallet for `scope`.
  pub async fn balance(&self, caller: &Caller, scope: Option<ScopeId>) -> EngineResult<Wallet> {
    caller.ensure_scope_access(scope.as_ref())?;
    let key = WalletKey::new(caller.user_id.clone(), scope);
    self
      .store
      .wallet(&key)
      .await?
      .ok_or_else(|| EngineError::NotFound {
        kind: "wallet",
        id: key.to_string(),
      })
  }

  /// Credit every wallet whose last top-up is at least one interval old.
  ///
  /// Safe to re-run after a partial failure: wallets credited by an
  /// earlier run carry a fresh `last_top_up` and are skipped by the store.
  #[instrument(skip(self))]
  pub async fn run_top_ups(&self) -> EngineResult<TopUpReport> {
    let now = self.clock.now();
    let mut report = TopUpReport {
      timestamp: Some(now),
      ..TopUpReport::default()
    };
    if self.policy.top_up_amount <= 0.0 {
      debug!("Top-ups disabled");
      return Ok(report);
    }

    let not_since = now - self.policy.top_up_interval;
    let due: Vec<WalletKey> = self
      .store
      .wallets()
      .await?
      .into_iter()
      .filter(|w| w.top_up_due(now, self.policy.top_up_interval))
      .map(|w| w.key)
      .collect();
    report.wallets_due = due.len();

    for chunk in due.chunks(self.store.max_batch_size()) {
      let ops = chunk
        .iter()
        .map(|key| WriteOp::TopUp {
          wallet: key.clone(),
          amount: self.policy.top_up_amount,
          at: now,
          not_since,
        })
        .collect();
      match self.store.commit_batch(ops).await {
        Ok(outcome) => {
          report.credited += outcome.applied;
          report.skipped += outcome.skipped;
          report.amount_credited += outcome.credited;
        }
        Err(e) => {
          warn!(error = %e, credited = report.credited, "Top-up batch failed");
          return Err(e);
        }
      }
    }

    info!(
      due = report.wallets_due,
      credited = report.credited,
      skipped = report.skipped,
      "Top-up run complete"
    );
    Ok(report)
  }
}
