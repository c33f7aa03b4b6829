//! Health State - Liveness and Readiness
//!
//! Readiness depends on the store being usable and the service not
//! draining for shutdown. The `/live` and `/ready` routes are served by
//! the API router.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Cleared when shutdown begins so load balancers stop routing.
    accepting: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state (accepting traffic).
    pub fn new() -> Self {
        Self {
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stop reporting ready.
    pub fn begin_drain(&self) {
        self.accepting.store(false, Ordering::Relaxed);
    }

    /// Ready when accepting traffic and the store is healthy.
    pub fn is_ready(&self, store_healthy: bool) -> bool {
        store_healthy && self.accepting.load(Ordering::Relaxed)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
