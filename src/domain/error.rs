//! Engine error taxonomy.
//!
//! Every rejection the engine can produce is one variant of
//! [`EngineError`]. Variants fall into four families:
//! - malformed input (`InvalidParameter`), rejected before any store access
//! - stale client view (`MarketNotTradeable`, `ScopeMismatch`), refresh and retry
//! - business-rule rejections (`InsufficientBalance`, `InsufficientShares`,
//!   `LiquidityExceeded`, `UnsafeSellBounds`, `ConvergenceFailure`)
//! - faults (`NumericFault`, `Store`), never coerced into a default value

use thiserror::Error;

use super::market::MarketStatus;

/// Result alias used throughout the domain and use-case layers.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the market-making and settlement engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Malformed input: non-finite numbers, non-positive b/amount/shares.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Trade-sizing search did not reach tolerance.
    #[error("trade sizing did not converge for amount {amount} (residual {residual:.6}); try a different amount")]
    ConvergenceFailure {
        /// Requested spend.
        amount: f64,
        /// Distance between the converged cost and the requested amount.
        residual: f64,
    },

    /// Market status is not OPEN.
    #[error("market {market_id} is not tradeable (status {status})")]
    MarketNotTradeable {
        /// Market that rejected the trade.
        market_id: String,
        /// Status observed at validation time.
        status: MarketStatus,
    },

    /// Request scope differs from the market's current scope.
    #[error("scope mismatch: market is in {market_scope}, request referenced {requested_scope}")]
    ScopeMismatch {
        /// Scope recorded on the market ("global" when unscoped).
        market_scope: String,
        /// Scope the caller sent ("global" when unscoped).
        requested_scope: String,
    },

    /// Wallet balance cannot cover the debit.
    #[error("insufficient balance: need {needed:.2}, have {available:.2}")]
    InsufficientBalance {
        /// Amount the trade would debit.
        needed: f64,
        /// Balance at validation time.
        available: f64,
    },

    /// Caller holds fewer net shares than requested.
    #[error("insufficient shares: requested {requested:.4}, held {held:.4}")]
    InsufficientShares {
        /// Shares the caller tried to sell.
        requested: f64,
        /// Net shares held on that side.
        held: f64,
    },

    /// The market's side liquidity cannot absorb the sale.
    #[error("liquidity exceeded: requested {requested:.4}, available {available:.4}")]
    LiquidityExceeded {
        /// Shares the caller tried to sell.
        requested: f64,
        /// Outstanding shares on that side of the pool.
        available: f64,
    },

    /// Sale would drive the pool past the configured sanity bound.
    #[error("unsafe sell bounds: resulting pool value {resulting:.4} beyond -{bound:.4}")]
    UnsafeSellBounds {
        /// Pool value on the sold side after the sale.
        resulting: f64,
        /// Configured magnitude bound (multiple of b).
        bound: f64,
    },

    /// A referenced document does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Document kind ("market", "wallet").
        kind: &'static str,
        /// Requested identifier.
        id: String,
    },

    /// The caller's identity assertion does not grant trading eligibility.
    #[error("caller is not eligible: {0}")]
    NotEligible(String),

    /// A privileged operation was attempted without the required claim.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Illegal lifecycle move.
    #[error("invalid market transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: MarketStatus,
        /// Requested status.
        to: MarketStatus,
    },

    /// Resolving or cancelling a market that already reached a terminal state.
    #[error("market {market_id} is already terminal ({status})")]
    AlreadyTerminal {
        /// Market identifier.
        market_id: String,
        /// Terminal status already recorded.
        status: MarketStatus,
    },

    /// NaN or infinity surfaced in a computed result.
    #[error("numeric fault: {0}")]
    NumericFault(String),

    /// Store-level failure after bounded retries.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures reported by the document store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Concurrent writer touched a document read by the transaction.
    #[error("write conflict on {0}")]
    Conflict(String),

    /// Transient conflicts persisted past the retry budget.
    #[error("transaction aborted after {attempts} conflicting attempts")]
    RetriesExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Batch exceeds the store's per-commit write limit.
    #[error("batch of {size} writes exceeds limit {limit}")]
    BatchTooLarge {
        /// Writes in the rejected batch.
        size: usize,
        /// Store limit.
        limit: usize,
    },

    /// Backend unreachable or unusable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    /// Stable machine-readable label, used for metrics and API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::ConvergenceFailure { .. } => "convergence_failure",
            Self::MarketNotTradeable { .. } => "market_not_tradeable",
            Self::ScopeMismatch { .. } => "scope_mismatch",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InsufficientShares { .. } => "insufficient_shares",
            Self::LiquidityExceeded { .. } => "liquidity_exceeded",
            Self::UnsafeSellBounds { .. } => "unsafe_sell_bounds",
            Self::NotFound { .. } => "not_found",
            Self::NotEligible(_) => "not_eligible",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::AlreadyTerminal { .. } => "already_terminal",
            Self::NumericFault(_) => "numeric_fault",
            Self::Store(_) => "store_failure",
        }
    }

    /// True when the caller's view of the market is stale and should be refreshed.
    pub fn is_stale_state(&self) -> bool {
        matches!(
            self,
            Self::MarketNotTradeable { .. } | Self::ScopeMismatch { .. }
        )
    }

    /// Shorthand for [`EngineError::InvalidParameter`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }
}

/// Fail with `NumericFault` when a computed value is NaN or infinite.
pub fn ensure_finite(value: f64, what: &str) -> EngineResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::NumericFault(format!("{what} is {value}")))
    }
}
