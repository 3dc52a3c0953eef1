//! Time sources
//!
//! Batch formation is driven by wall-clock milliseconds. Sessions take the
//! clock as a trait object so tests and simulations can run in virtual time.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for deterministic runs
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    /// Move the clock forward and return the new time
    pub fn advance(&self, delta_millis: i64) -> i64 {
        self.now.fetch_add(delta_millis, Ordering::SeqCst) + delta_millis
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
