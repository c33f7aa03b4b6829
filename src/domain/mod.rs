//! Domain layer - Core business logic and models.
//!
//! Pure pricing, sizing, ledger and settlement logic for the play-money
//! market maker. No I/O here (hexagonal architecture inner ring).
//! All types are serializable and testable in isolation.

pub mod caller;
pub mod error;
pub mod ledger;
pub mod lmsr;
pub mod market;
pub mod notification;
pub mod payout;
pub mod position;
pub mod scoring;
pub mod sizing;

// Re-export core types for convenience
pub use caller::{Caller, Claim};
pub use error::{EngineError, EngineResult, StoreError};
pub use ledger::{LedgerEntry, TradeKind, Wallet, WalletKey};
pub use lmsr::LmsrModel;
pub use market::{Market, MarketId, MarketStatus, Outcome, Pool, ScopeId, UserId};
pub use notification::{Notification, NotificationKind};
pub use payout::{SettlementKind, SettlementRecord};
pub use position::{Position, Valuation};
pub use sizing::{BuyQuote, SellQuote, SizingParams, TradeSizer};
