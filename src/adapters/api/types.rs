//! API Request/Response Types
//!
//! JSON bodies of the HTTP surface. Market ids come from the path; the
//! caller always comes from the bearer token, never from a body field.

use serde::{Deserialize, Serialize};

use crate::domain::market::{Outcome, ScopeId};
use crate::domain::sizing::{BuyQuote, SellQuote};

/// `POST /v1/markets/:id/bets`
#[derive(Debug, Clone, Deserialize)]
pub struct BetBody {
  pub side: Outcome,
  pub amount: f64,
  #[serde(default)]
  pub scope_id: Option<ScopeId>,
}

/// `POST /v1/markets/:id/sells`
#[derive(Debug, Clone, Deserialize)]
pub struct SellBody {
  pub side: Outcome,
  pub shares: f64,
  #[serde(default)]
  pub scope_id: Option<ScopeId>,
}

/// `POST /v1/markets/:id/quote`: exactly one of `amount` or `shares`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteBody {
  pub side: Outcome,
  #[serde(default)]
  pub amount: Option<f64>,
  #[serde(default)]
  pub shares: Option<f64>,
  #[serde(default)]
  pub scope_id: Option<ScopeId>,
}

/// Quote answer, tagged by direction.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "direction", rename_all = "snake_case")]
pub enum QuoteResponse {
  Buy(BuyQuote),
  Sell(SellQuote),
}

/// `POST /v1/markets/:id/lock`
#[derive(Debug, Clone, Deserialize)]
pub struct LockBody {
  pub locked: bool,
}

/// `POST /v1/markets/:id/resolve`
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveBody {
  pub outcome: Outcome,
}

/// `POST /v1/wallets` and `GET /v1/wallets?scope_id=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletScope {
  #[serde(default)]
  pub scope_id: Option<ScopeId>,
}

/// `GET /v1/leaderboard?limit=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardQuery {
  #[serde(default)]
  pub limit: Option<usize>,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
  /// Stable machine-readable error kind.
  pub error: String,
  pub message: String,
  /// True when the client should refresh market state and retry.
  pub stale: bool,
}
