//! Resolution payouts and cancellation refunds.
//!
//! Pure computations over one market's ledger. The settlement use case
//! turns the results into conditional store writes; the
//! [`SettlementRecord`] each write carries is what makes a re-run skip
//! users already settled.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::EngineResult;
use super::ledger::{LedgerEntry, WalletKey};
use super::market::{MarketId, Outcome, UserId};
use super::position::{CLOSED_POSITION_EPSILON, fold_positions};
use super::sizing::round_currency;

/// Which kind of credit a settlement record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementKind {
    Payout,
    Refund,
}

impl std::fmt::Display for SettlementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Payout => write!(f, "PAYOUT"),
            Self::Refund => write!(f, "REFUND"),
        }
    }
}

/// Idempotency marker: one per (market, user) once credited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub market_id: MarketId,
    pub user_id: UserId,
    pub wallet: WalletKey,
    pub kind: SettlementKind,
    pub amount: f64,
    pub settled_at: DateTime<Utc>,
}

/// Winning-side payout owed to one user.
#[derive(Debug, Clone, PartialEq)]
pub struct Payout {
    pub user_id: UserId,
    /// Net winning-side shares, paid 1:1.
    pub winning_shares: f64,
    /// Currency credited (rounded).
    pub amount: f64,
}

/// Refund owed to one user on cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct Refund {
    pub user_id: UserId,
    /// Net signed contribution (cost paid minus payouts received), rounded.
    pub amount: f64,
    /// Entries voided by this refund.
    pub entry_ids: Vec<Uuid>,
}

/// Pay each user's net winning-side shares 1:1.
///
/// Refunded entries are skipped. Users with no winning shares are omitted.
pub fn resolution_payouts(entries: &[LedgerEntry], outcome: Outcome) -> EngineResult<Vec<Payout>> {
    let mut payouts = Vec::new();
    for ((user_id, _), position) in fold_positions(entries) {
        let winning_shares = position.net_shares(outcome);
        if winning_shares < CLOSED_POSITION_EPSILON {
            continue;
        }
        let amount = round_currency(winning_shares)?;
        if amount > 0.0 {
            payouts.push(Payout {
                user_id,
                winning_shares,
                amount,
            });
        }
    }
    Ok(payouts)
}

/// Refund each user's strictly positive net contribution.
///
/// Users who net-sold are not charged and get nothing.
pub fn cancellation_refunds(entries: &[LedgerEntry]) -> EngineResult<Vec<Refund>> {
    let mut per_user: BTreeMap<&str, (f64, Vec<Uuid>)> = BTreeMap::new();
    for entry in entries.iter().filter(|e| !e.refunded) {
        let slot = per_user.entry(entry.user_id.as_str()).or_default();
        slot.0 += entry.amount;
        slot.1.push(entry.id);
    }

    let mut refunds = Vec::new();
    for (user_id, (net, entry_ids)) in per_user {
        let amount = round_currency(net)?;
        if amount > 0.0 {
            refunds.push(Refund {
                user_id: user_id.to_string(),
                amount,
                entry_ids,
            });
        }
    }
    Ok(refunds)
}
