//! Clock Port - Time Source
//!
//! Timestamps on ledger entries, lifecycle transitions and top-up markers
//! come from this trait so tests can pin time.

use chrono::{DateTime, Utc};

/// Trait for time sources.
pub trait Clock: Send + Sync + 'static {
  /// Current wall-clock time.
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}
