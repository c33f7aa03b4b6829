//! Oracle / contrarian scoring.
//!
//! A user's contribution on a resolved market is
//! `net winning shares × (1 − average BUY price on the winning side)`:
//! buying the eventual winner cheaply, against the crowd, scores most.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::ledger::LedgerEntry;
use super::market::{Market, MarketId, MarketStatus, Outcome, UserId};
use super::position::{Position, fold_positions};

/// Aggregate score for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserScore {
    pub user_id: UserId,
    pub score: f64,
    /// Resolved markets that contributed a positive amount.
    pub markets_scored: usize,
}

/// Contribution of one position on a market resolved to `outcome`.
///
/// Zero or negative contributions count as zero.
pub fn contribution(position: &Position, outcome: Outcome) -> f64 {
    let Some(avg_price) = position.average_entry_price(outcome) else {
        return 0.0;
    };
    let value = position.net_shares(outcome) * (1.0 - avg_price);
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Sum contributions across every resolved market in `markets`.
///
/// Cancelled and still-open markets are ignored. Entries for markets not
/// in `markets` are ignored. Results are sorted by score, highest first.
pub fn aggregate_scores(markets: &[Market], entries: &[LedgerEntry]) -> Vec<UserScore> {
    let resolved: HashMap<&MarketId, Outcome> = markets
        .iter()
        .filter(|m| m.status == MarketStatus::Resolved)
        .filter_map(|m| m.resolution.map(|r| (&m.id, r)))
        .collect();

    let mut totals: BTreeMap<UserId, (f64, usize)> = BTreeMap::new();
    for ((user_id, market_id), position) in fold_positions(entries) {
        let Some(&outcome) = resolved.get(&market_id) else {
            continue;
        };
        let value = contribution(&position, outcome);
        if value > 0.0 {
            let slot = totals.entry(user_id).or_default();
            slot.0 += value;
            slot.1 += 1;
        }
    }

    let mut scores: Vec<UserScore> = totals
        .into_iter()
        .map(|(user_id, (score, markets_scored))| UserScore {
            user_id,
            score,
            markets_scored,
        })
        .collect();
    scores.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.user_id.cmp(&b.user_id)));
    scores
}
