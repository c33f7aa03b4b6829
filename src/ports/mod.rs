//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `Store`: transactional document store (markets, wallets, ledger)
//! - `IdentityProvider`: caller identity assertion
//! - `Clock`: time source

pub mod clock;
pub mod identity;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use identity::{Identity, IdentityProvider};
pub use store::{BatchOutcome, Store, Transaction, WriteOp};
