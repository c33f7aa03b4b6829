//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the engine's workflows. Each use case is a self-contained
//! business operation over the `Store` port.
//!
//! Use cases:
//! - `TradeService`: Bets, sales and read-only quotes
//! - `WalletManager`: Wallet opening, balances and scheduled top-ups
//! - `MarketLifecycle`: Market creation and locking
//! - `SettlementService`: Resolution payouts and cancellation refunds
//! - `PortfolioService`: Position views and notifications
//! - `Leaderboard`: Contrarian scores across resolved markets
//! - `EligibilityPolicy`: Identity assertion to caller

pub mod access;
pub mod leaderboard;
pub mod lifecycle;
pub mod portfolio;
pub mod settlement;
pub mod trading;
pub mod wallet_manager;
