//! Position aggregation over the trade ledger.
//!
//! A position is derived, never stored: the fold of one user's ledger
//! entries on one market. BUY entries add their shares and cost, SELL
//! entries subtract (their stored values are already negative).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::EngineResult;
use super::ledger::{LedgerEntry, TradeKind};
use super::market::{Market, MarketId, MarketStatus, Outcome, UserId};

/// Net share counts below this are treated as fully exited.
pub const CLOSED_POSITION_EPSILON: f64 = 1e-4;

/// Running totals for one side of a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideTotals {
    /// Net shares held (buys minus sells).
    pub shares: f64,
    /// Net currency committed (cost paid minus payouts received).
    pub cost: f64,
    /// Gross shares acquired through BUY entries.
    pub bought_shares: f64,
    /// Gross currency spent on BUY entries.
    pub bought_cost: f64,
}

/// Net holdings of one user in one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub user_id: UserId,
    pub market_id: MarketId,
    pub yes: SideTotals,
    pub no: SideTotals,
}

/// Mark of a position against its market's state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub value: f64,
    pub cost_basis: f64,
    pub unrealized_pnl: f64,
}

impl Position {
    pub fn empty(user_id: UserId, market_id: MarketId) -> Self {
        Self {
            user_id,
            market_id,
            yes: SideTotals::default(),
            no: SideTotals::default(),
        }
    }

    /// Fold one entry in. Refunded entries contribute nothing.
    pub fn apply(&mut self, entry: &LedgerEntry) {
        if entry.refunded {
            return;
        }
        let totals = self.side_mut(entry.side);
        totals.shares += entry.shares;
        totals.cost += entry.amount;
        if entry.kind == TradeKind::Buy {
            totals.bought_shares += entry.shares;
            totals.bought_cost += entry.amount;
        }
    }

    pub const fn side(&self, side: Outcome) -> &SideTotals {
        match side {
            Outcome::Yes => &self.yes,
            Outcome::No => &self.no,
        }
    }

    const fn side_mut(&mut self, side: Outcome) -> &mut SideTotals {
        match side {
            Outcome::Yes => &mut self.yes,
            Outcome::No => &mut self.no,
        }
    }

    pub const fn net_shares(&self, side: Outcome) -> f64 {
        self.side(side).shares
    }

    /// Net currency committed across both sides.
    pub fn cost_basis(&self) -> f64 {
        self.yes.cost + self.no.cost
    }

    /// Share-weighted average price paid on BUY entries of `side`.
    ///
    /// Sales reduce net shares but leave this average unchanged.
    pub fn average_entry_price(&self, side: Outcome) -> Option<f64> {
        let totals = self.side(side);
        (totals.bought_shares > CLOSED_POSITION_EPSILON)
            .then(|| totals.bought_cost / totals.bought_shares)
    }

    /// Both sides round to zero shares.
    pub fn is_closed(&self) -> bool {
        self.yes.shares.abs() < CLOSED_POSITION_EPSILON
            && self.no.shares.abs() < CLOSED_POSITION_EPSILON
    }

    /// Current worth of the position.
    ///
    /// - OPEN/LOCKED: mark-to-market at the pool's YES price
    /// - RESOLVED: winning-side shares at 1.0
    /// - CANCELLED: net cost basis (full refund)
    pub fn value(&self, market: &Market) -> EngineResult<f64> {
        Ok(match market.status {
            MarketStatus::Open | MarketStatus::Locked => {
                let p = market.current_price()?;
                self.yes.shares * p + self.no.shares * (1.0 - p)
            }
            MarketStatus::Resolved => market
                .resolution
                .map_or(0.0, |outcome| self.net_shares(outcome)),
            MarketStatus::Cancelled => self.cost_basis(),
        })
    }

    pub fn valuation(&self, market: &Market) -> EngineResult<Valuation> {
        let value = self.value(market)?;
        let cost_basis = self.cost_basis();
        Ok(Valuation {
            value,
            cost_basis,
            unrealized_pnl: value - cost_basis,
        })
    }
}

/// Fold ledger entries into positions keyed by (user, market).
///
/// Fully exited positions are kept; callers building views drop them with
/// [`Position::is_closed`].
pub fn fold_positions<'a, I>(entries: I) -> BTreeMap<(UserId, MarketId), Position>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut positions: BTreeMap<(UserId, MarketId), Position> = BTreeMap::new();
    for entry in entries {
        positions
            .entry((entry.user_id.clone(), entry.market_id.clone()))
            .or_insert_with(|| Position::empty(entry.user_id.clone(), entry.market_id.clone()))
            .apply(entry);
    }
    positions
}

/// Fold one user's entries on one market.
pub fn fold_position<'a, I>(user_id: &str, market_id: &str, entries: I) -> Position
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut position = Position::empty(user_id.to_string(), market_id.to_string());
    entries
        .into_iter()
        .filter(|e| e.user_id == user_id && e.market_id == market_id)
        .for_each(|e| position.apply(e));
    position
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn market() -> Market {
        Market::try_new("m".into(), "q", "c".into(), 100.0, None, Utc::now()).unwrap()
    }

    fn buy(m: &Market, user: &str, side: Outcome, amount: f64, shares: f64) -> LedgerEntry {
        LedgerEntry::buy(user.into(), m, side, amount, shares, 0.5, Utc::now()).unwrap()
    }

    fn sell(m: &Market, user: &str, side: Outcome, payout: f64, shares: f64) -> LedgerEntry {
        LedgerEntry::sell(user.into(), m, side, payout, shares, 0.5, Utc::now()).unwrap()
    }

    #[test]
    fn test_fold_nets_buys_and_sells() {
        let m = market();
        let entries = vec![
            buy(&m, "a", Outcome::Yes, 10.0, 20.0),
            buy(&m, "a", Outcome::Yes, 10.0, 15.0),
            sell(&m, "a", Outcome::Yes, 8.0, 12.0),
            buy(&m, "a", Outcome::No, 4.0, 7.0),
        ];
        let p = fold_position("a", "m", &entries);
        assert_eq!(p.net_shares(Outcome::Yes), 23.0);
        assert_eq!(p.net_shares(Outcome::No), 7.0);
        assert_eq!(p.cost_basis(), 16.0);
        let avg = p.average_entry_price(Outcome::Yes).unwrap();
        assert!((avg - 20.0 / 35.0).abs() < 1e-12);
    }

    #[test]
    fn test_full_exit_is_closed() {
        let m = market();
        let entries = vec![
            buy(&m, "a", Outcome::No, 10.0, 19.0),
            sell(&m, "a", Outcome::No, 9.99, 19.0),
        ];
        let positions = fold_positions(&entries);
        assert!(positions[&("a".to_string(), "m".to_string())].is_closed());
    }

    #[test]
    fn test_refunded_entries_are_ignored() {
        let m = market();
        let mut entry = buy(&m, "a", Outcome::Yes, 10.0, 19.0);
        entry.refunded = true;
        let p = fold_position("a", "m", [&entry]);
        assert!(p.is_closed());
        assert_eq!(p.cost_basis(), 0.0);
    }

    #[test]
    fn test_valuation_by_status() {
        let mut m = market();
        let entries = vec![
            buy(&m, "a", Outcome::Yes, 10.0, 20.0),
            buy(&m, "a", Outcome::No, 5.0, 6.0),
        ];
        let p = fold_position("a", "m", &entries);

        // Symmetric pool: price 0.5.
        let open = p.valuation(&m).unwrap();
        assert!((open.value - 13.0).abs() < 1e-12);
        assert!((open.unrealized_pnl - (-2.0)).abs() < 1e-12);

        m.resolve(Outcome::No, Utc::now()).unwrap();
        assert_eq!(p.value(&m).unwrap(), 6.0);

        let mut cancelled = market();
        cancelled.cancel(Utc::now()).unwrap();
        assert_eq!(p.value(&cancelled).unwrap(), 15.0);
    }

    #[test]
    fn test_fold_groups_by_user() {
        let m = market();
        let entries = vec![
            buy(&m, "a", Outcome::Yes, 1.0, 2.0),
            buy(&m, "b", Outcome::Yes, 3.0, 5.0),
        ];
        let positions = fold_positions(&entries);
        assert_eq!(positions.len(), 2);
    }
}
