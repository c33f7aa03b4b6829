//! Market documents, scoring-rule pool state, and lifecycle.
//!
//! A market starts OPEN, may toggle between OPEN and LOCKED any number of
//! times, and ends in exactly one terminal state: RESOLVED (with a fixed
//! resolution) or CANCELLED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};
use super::lmsr::LmsrModel;

/// Market identifier.
pub type MarketId = String;

/// User identifier asserted by the identity collaborator.
pub type UserId = String;

/// Community / tenant scope identifier. `None` means the global scope.
pub type ScopeId = String;

/// Renders an optional scope the way errors and logs show it.
pub fn scope_label(scope: Option<&ScopeId>) -> String {
    scope.map_or_else(|| "global".to_string(), Clone::clone)
}

/// Binary outcome side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    /// The other side of the market.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// Scoring-rule state: signed cumulative share counts per side.
///
/// These are not literal outstanding share totals held by the house and
/// may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pool {
    pub yes: f64,
    pub no: f64,
}

impl Pool {
    pub const fn new(yes: f64, no: f64) -> Self {
        Self { yes, no }
    }

    /// Share count on one side.
    pub const fn get(&self, side: Outcome) -> f64 {
        match side {
            Outcome::Yes => self.yes,
            Outcome::No => self.no,
        }
    }

    /// Copy of the pool with `delta` added to one side.
    #[must_use]
    pub fn with_delta(&self, side: Outcome, delta: f64) -> Self {
        match side {
            Outcome::Yes => Self::new(self.yes + delta, self.no),
            Outcome::No => Self::new(self.yes, self.no + delta),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.yes.is_finite() && self.no.is_finite()
    }
}

/// Market lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Open,
    Locked,
    Resolved,
    Cancelled,
}

impl MarketStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Locked => write!(f, "LOCKED"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A binary outcome question priced by the scoring-rule market maker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Unique market identifier.
    pub id: MarketId,
    /// Question text.
    pub question: String,
    /// User who created the market and may lock or resolve it.
    pub creator_id: UserId,
    /// Scoring-rule state.
    pub pool: Pool,
    /// Liquidity parameter b (> 0).
    pub liquidity: f64,
    /// Cached YES price. Recompute from `pool` before trusting it.
    pub probability: f64,
    /// Lifecycle status.
    pub status: MarketStatus,
    /// Winning side, set iff `status == Resolved`.
    pub resolution: Option<Outcome>,
    /// Community scope; `None` trades against global wallets.
    pub scope_id: Option<ScopeId>,
    /// Cumulative absolute amount traded.
    pub volume: f64,
    pub created_at: DateTime<Utc>,
    /// When the market reached a terminal state.
    pub closed_at: Option<DateTime<Utc>>,
    /// When the payout/refund sweep for the terminal state finished.
    pub settled_at: Option<DateTime<Utc>>,
}

impl Market {
    /// Create an OPEN market with an empty pool.
    ///
    /// # Errors
    /// `InvalidParameter` for an empty question or a non-finite / non-positive `liquidity`.
    pub fn try_new(
        id: MarketId,
        question: impl Into<String>,
        creator_id: UserId,
        liquidity: f64,
        scope_id: Option<ScopeId>,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(EngineError::invalid("question must not be empty"));
        }
        let model = LmsrModel::new(liquidity)?;
        let pool = Pool::default();
        Ok(Self {
            id,
            question,
            creator_id,
            pool,
            liquidity,
            probability: model.price(pool, Outcome::Yes)?,
            status: MarketStatus::Open,
            resolution: None,
            scope_id,
            volume: 0.0,
            created_at: now,
            closed_at: None,
            settled_at: None,
        })
    }

    /// Pricing kernel for this market's liquidity parameter.
    pub fn model(&self) -> EngineResult<LmsrModel> {
        LmsrModel::new(self.liquidity)
    }

    /// YES price recomputed from the pool (never the cached field).
    pub fn current_price(&self) -> EngineResult<f64> {
        self.model()?.price(self.pool, Outcome::Yes)
    }

    /// Status/resolution agreement and finite pool.
    pub fn check_invariants(&self) -> EngineResult<()> {
        if !self.pool.is_finite() {
            return Err(EngineError::NumericFault(format!(
                "market {} has a non-finite pool",
                self.id
            )));
        }
        let consistent = match self.status {
            MarketStatus::Resolved => self.resolution.is_some(),
            _ => self.resolution.is_none(),
        };
        if consistent {
            Ok(())
        } else {
            Err(EngineError::invalid(format!(
                "market {} has status {} with resolution {:?}",
                self.id, self.status, self.resolution
            )))
        }
    }

    /// Trading preconditions: OPEN, and the request scope matches the market's.
    pub fn ensure_tradeable(&self, requested_scope: Option<&ScopeId>) -> EngineResult<()> {
        if self.status != MarketStatus::Open {
            return Err(EngineError::MarketNotTradeable {
                market_id: self.id.clone(),
                status: self.status,
            });
        }
        if self.scope_id.as_ref() != requested_scope {
            return Err(EngineError::ScopeMismatch {
                market_scope: scope_label(self.scope_id.as_ref()),
                requested_scope: scope_label(requested_scope),
            });
        }
        Ok(())
    }

    /// Whether the user may run creator-level operations on this market.
    pub fn is_managed_by(&self, user_id: &str, admin: bool) -> bool {
        admin || self.creator_id == user_id
    }

    /// Record a committed trade.
    pub fn apply_trade(&mut self, pool: Pool, probability: f64, amount: f64) -> EngineResult<()> {
        if !pool.is_finite() {
            return Err(EngineError::NumericFault(format!(
                "trade on {} produced a non-finite pool",
                self.id
            )));
        }
        self.pool = pool;
        self.probability = probability;
        self.volume += amount.abs();
        Ok(())
    }

    /// Toggle between OPEN and LOCKED.
    pub fn set_locked(&mut self, locked: bool) -> EngineResult<()> {
        let target = if locked {
            MarketStatus::Locked
        } else {
            MarketStatus::Open
        };
        if self.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Terminal transition to RESOLVED.
    pub fn resolve(&mut self, outcome: Outcome, now: DateTime<Utc>) -> EngineResult<()> {
        self.ensure_not_terminal()?;
        self.status = MarketStatus::Resolved;
        self.resolution = Some(outcome);
        self.closed_at = Some(now);
        Ok(())
    }

    /// Terminal transition to CANCELLED.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        self.ensure_not_terminal()?;
        self.status = MarketStatus::Cancelled;
        self.resolution = None;
        self.closed_at = Some(now);
        Ok(())
    }

    fn ensure_not_terminal(&self) -> EngineResult<()> {
        if self.status.is_terminal() {
            Err(EngineError::AlreadyTerminal {
                market_id: self.id.clone(),
                status: self.status,
            })
        } else {
            Ok(())
        }
    }
}
