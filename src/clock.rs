//! Time sources for the orchestrator
//!
//! Every component that compares procedure windows against "now" reads the
//! time from a [`Clock`], so scans can be driven deterministically in tests
//! and demos with a [`ManualClock`].

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::sync::RwLock;

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// Current time in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by [`Utc::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    current: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: RwLock::new(start),
        }
    }

    /// Jump to an absolute instant (backwards jumps are allowed)
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = instant;
    }

    /// Move forward by `step`
    pub fn advance(&self, step: Duration) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current += step;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Create a shared system clock
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
