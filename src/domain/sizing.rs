//! Trade sizing on top of the LMSR kernel.
//!
//! Buys are sized by bisection on the (strictly increasing) spend curve
//! `C(pool + s·side) - C(pool)`. Sells are priced directly from the cost
//! function. Rounding to currency / share precision happens only on the
//! final outputs, never inside the search loop. Shares bought and sale
//! payouts round toward zero so no sequence of trades can mint money.

use std::f64::consts::LN_2;

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult, ensure_finite};
use super::lmsr::LmsrModel;
use super::market::{Outcome, Pool};

/// Decimal places kept for currency amounts.
pub const CURRENCY_DECIMALS: u32 = 2;

/// Decimal places kept for share counts.
pub const SHARE_DECIMALS: u32 = 6;

/// Sell payouts within this distance of zero are treated as zero.
const PAYOUT_NOISE: f64 = 1e-9;

/// Numeric knobs for the sizing search and the sell guard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingParams {
    /// Bisection step budget.
    pub max_iterations: u32,
    /// Early-exit tolerance on |spent - amount|.
    pub search_tolerance: f64,
    /// Largest accepted residual after the search; beyond it the buy fails.
    pub convergence_tolerance: f64,
    /// A sale may not push the sold side below `-sell_bound_multiple * b`.
    pub sell_bound_multiple: f64,
}

impl Default for SizingParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            search_tolerance: 1e-4,
            convergence_tolerance: 1e-2,
            sell_bound_multiple: 20.0,
        }
    }
}

/// Result of sizing a buy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuyQuote {
    /// Side bought.
    pub side: Outcome,
    /// Currency spent (rounded).
    pub amount: f64,
    /// Shares acquired (rounded, >= 0).
    pub shares: f64,
    /// Pool after the trade.
    pub pool_after: Pool,
    /// YES price after the trade.
    pub probability_after: f64,
}

/// Result of pricing a sale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SellQuote {
    /// Side sold.
    pub side: Outcome,
    /// Shares liquidated (rounded).
    pub shares: f64,
    /// Currency returned to the seller (rounded, >= 0).
    pub payout: f64,
    /// Pool after the trade.
    pub pool_after: Pool,
    /// YES price after the trade.
    pub probability_after: f64,
}

/// Sizes buys and prices sells for one market.
#[derive(Debug, Clone, Copy)]
pub struct TradeSizer {
    model: LmsrModel,
    params: SizingParams,
}

impl TradeSizer {
    pub const fn new(model: LmsrModel, params: SizingParams) -> Self {
        Self { model, params }
    }

    pub const fn model(&self) -> &LmsrModel {
        &self.model
    }

    /// Shares bought by spending `amount` on `side`.
    ///
    /// # Errors
    /// - `InvalidParameter` for a non-finite / non-positive amount or bad pool
    /// - `ConvergenceFailure` when the search ends further than
    ///   `convergence_tolerance` from the requested amount
    pub fn quote_buy(&self, pool: Pool, side: Outcome, amount: f64) -> EngineResult<BuyQuote> {
        let amount = positive(amount, "amount")?;
        let base = self.model.cost(pool)?;
        let spent = |shares: f64| -> EngineResult<f64> {
            Ok(self.model.cost(pool.with_delta(side, shares))? - base)
        };

        let mut hi = self.upper_bracket(pool, side, amount)?;
        if spent(hi)? < amount {
            // Rounding left the price-based seed marginally short.
            hi = self.fallback_bracket(pool, side, amount);
        }

        let mut lo = 0.0;
        let mut shares = hi;
        let mut cost = spent(hi)?;
        for _ in 0..self.params.max_iterations {
            let mid = 0.5 * (lo + hi);
            let mid_cost = spent(mid)?;
            shares = mid;
            cost = mid_cost;
            let diff = mid_cost - amount;
            if diff.abs() < self.params.search_tolerance {
                break;
            }
            if diff < 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let residual = ensure_finite((cost - amount).abs(), "sizing residual")?;
        if residual > self.params.convergence_tolerance {
            return Err(EngineError::ConvergenceFailure { amount, residual });
        }

        let shares = round_shares_down(shares.max(0.0))?;
        let pool_after = pool.with_delta(side, shares);
        Ok(BuyQuote {
            side,
            amount: round_currency(amount)?,
            shares,
            pool_after,
            probability_after: self.model.price(pool_after, Outcome::Yes)?,
        })
    }

    /// Payout for liquidating `shares` of `side`: `C(pool) - C(pool - s·side)`.
    ///
    /// Does not check holdings or side liquidity; callers do.
    ///
    /// # Errors
    /// - `InvalidParameter` for a non-finite / non-positive share count
    /// - `UnsafeSellBounds` when the sold side would fall below `-k·b`
    pub fn quote_sell(&self, pool: Pool, side: Outcome, shares: f64) -> EngineResult<SellQuote> {
        let shares = round_shares(positive(shares, "shares")?)?;
        let pool_after = pool.with_delta(side, -shares);

        let bound = self.params.sell_bound_multiple * self.model.liquidity();
        let resulting = pool_after.get(side);
        if resulting < -bound {
            return Err(EngineError::UnsafeSellBounds { resulting, bound });
        }

        let mut payout = self.model.cost(pool)? - self.model.cost(pool_after)?;
        if payout.abs() < PAYOUT_NOISE {
            payout = 0.0;
        }
        Ok(SellQuote {
            side,
            shares,
            payout: round_currency_down(payout.max(0.0))?,
            pool_after,
            probability_after: self.model.price(pool_after, Outcome::Yes)?,
        })
    }

    /// Upper end of the search interval.
    ///
    /// Spend is at least `s·p` (price only rises while buying), so
    /// `amount / p` brackets the root; the fallback bracket caps it when
    /// `p` is tiny.
    fn upper_bracket(&self, pool: Pool, side: Outcome, amount: f64) -> EngineResult<f64> {
        let fallback = self.fallback_bracket(pool, side, amount);
        let price = self.model.raw_price(pool, side)?;
        if price > 0.0 {
            Ok((amount / price).min(fallback))
        } else {
            Ok(fallback)
        }
    }

    /// `C(pool + s) >= q_side + s` and `C(pool) <= max(q) + b·ln2`, so
    /// `s = amount + gap + b·ln2` always costs at least `amount`.
    fn fallback_bracket(&self, pool: Pool, side: Outcome, amount: f64) -> f64 {
        let gap = (pool.get(side.opposite()) - pool.get(side)).max(0.0);
        amount + gap + self.model.liquidity() * LN_2 + 1.0
    }
}

fn positive(value: f64, what: &str) -> EngineResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(EngineError::invalid(format!(
            "{what} must be finite and > 0, got {value}"
        )))
    }
}

/// Round a currency amount to two decimal places (half away from zero).
pub fn round_currency(value: f64) -> EngineResult<f64> {
    round_to(value, CURRENCY_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncate a currency amount to whole cents, toward zero.
pub fn round_currency_down(value: f64) -> EngineResult<f64> {
    round_to(value, CURRENCY_DECIMALS, RoundingStrategy::ToZero)
}

/// Round a share count to share precision.
pub fn round_shares(value: f64) -> EngineResult<f64> {
    round_to(value, SHARE_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncate a share count to share precision, toward zero.
pub fn round_shares_down(value: f64) -> EngineResult<f64> {
    round_to(value, SHARE_DECIMALS, RoundingStrategy::ToZero)
}

fn round_to(value: f64, dp: u32, strategy: RoundingStrategy) -> EngineResult<f64> {
    let value = ensure_finite(value, "rounded value")?;
    let decimal = Decimal::from_f64(value).ok_or_else(|| {
        EngineError::NumericFault(format!("{value} is outside the decimal range"))
    })?;
    decimal
        .round_dp_with_strategy(dp, strategy)
        .to_f64()
        .ok_or_else(|| EngineError::NumericFault(format!("cannot convert {decimal} back to f64")))
}
