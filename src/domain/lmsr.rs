//! Logarithmic Market Scoring Rule (LMSR) pricing kernel.
//!
//! Stateless cost and price functions for binary (YES/NO) markets.
//! Reference: Hanson (2003) "Combinatorial Information Market Design"
//!
//! Both functions use the max-subtraction (log-sum-exp) trick so they stay
//! finite for pools far larger than `b`.

use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult, ensure_finite};
use super::market::{Outcome, Pool};

/// Externally exposed prices are kept this far away from 0 and 1.
pub const PRICE_EPSILON: f64 = 1e-9;

/// LMSR pricing model for binary outcome markets.
///
/// The liquidity parameter `b` controls market depth:
/// - Higher `b` = more liquidity, slower price movement
/// - Lower `b` = less liquidity, faster price movement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LmsrModel {
    /// Liquidity parameter (b > 0)
    b: f64,
}

impl LmsrModel {
    /// Creates a model with the given liquidity parameter.
    ///
    /// # Errors
    /// `InvalidParameter` if `b` is not finite and strictly positive.
    pub fn new(b: f64) -> EngineResult<Self> {
        if !b.is_finite() || b <= 0.0 {
            return Err(EngineError::invalid(format!(
                "liquidity parameter b must be finite and > 0, got {b}"
            )));
        }
        Ok(Self { b })
    }

    /// Returns the liquidity parameter.
    pub const fn liquidity(&self) -> f64 {
        self.b
    }

    /// C(q) = b * ln(exp(q_yes/b) + exp(q_no/b)).
    ///
    /// Computed as `max + b * ln(1 + exp(-|q_yes - q_no| / b))`.
    pub fn cost(&self, pool: Pool) -> EngineResult<f64> {
        validate_pool(pool)?;
        let max = pool.yes.max(pool.no);
        let gap = (pool.yes - pool.no).abs() / self.b;
        let cost = max + self.b * (-gap).exp().ln_1p();
        ensure_finite(cost, "cost")
    }

    /// Unclamped instantaneous price of `side`, in [0, 1].
    ///
    /// Softmax of the two pool terms. Symmetric pools give exactly 0.5.
    pub fn raw_price(&self, pool: Pool, side: Outcome) -> EngineResult<f64> {
        validate_pool(pool)?;
        let d = (pool.get(side) - pool.get(side.opposite())) / self.b;
        let price = if d >= 0.0 {
            1.0 / (1.0 + (-d).exp())
        } else {
            let e = d.exp();
            e / (1.0 + e)
        };
        ensure_finite(price, "price")
    }

    /// Price of `side` clamped to `[PRICE_EPSILON, 1 - PRICE_EPSILON]`.
    pub fn price(&self, pool: Pool, side: Outcome) -> EngineResult<f64> {
        Ok(clamp_price(self.raw_price(pool, side)?))
    }

    /// Cost of acquiring `shares` of `side` (negative when liquidating).
    pub fn cost_delta(&self, pool: Pool, side: Outcome, shares: f64) -> EngineResult<f64> {
        let after = pool.with_delta(side, shares);
        let delta = self.cost(after)? - self.cost(pool)?;
        ensure_finite(delta, "cost delta")
    }
}

/// Keep a price strictly inside (0, 1).
pub fn clamp_price(price: f64) -> f64 {
    price.clamp(PRICE_EPSILON, 1.0 - PRICE_EPSILON)
}

fn validate_pool(pool: Pool) -> EngineResult<()> {
    if pool.is_finite() {
        Ok(())
    } else {
        Err(EngineError::invalid(format!(
            "pool values must be finite, got yes={} no={}",
            pool.yes, pool.no
        )))
    }
}
