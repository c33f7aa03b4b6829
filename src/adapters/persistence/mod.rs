//! Persistence Adapters - In-Memory Store and JSON Snapshots
//!
//! Implements the Store port with an in-process versioned document
//! store, and persists it as atomic JSON snapshots.
//! No database dependency - lightweight and crash-recoverable.

pub mod memory;
pub mod snapshot;

pub use memory::{InMemoryStore, StoreSnapshot};
pub use snapshot::SnapshotFile;
