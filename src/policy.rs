//! Batch formation policy
//!
//! The buffer fills at the sensor's native rate, which is often faster than
//! the nominal target. A full buffer alone is not enough to ship a batch: a
//! minimum interval since the previous formation throttles send attempts.
//! While the interval has not elapsed the buffer stays full and new samples
//! are dropped by the buffer.

use crate::config::MIN_TRANSMISSION_INTERVAL_MILLIS;

/// Decides when a full motion buffer becomes a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFormationPolicy {
    last_transmission_millis: i64,
    min_interval_millis: i64,
}

impl Default for BatchFormationPolicy {
    fn default() -> Self {
        Self::new(MIN_TRANSMISSION_INTERVAL_MILLIS)
    }
}

impl BatchFormationPolicy {
    /// Policy with no transmission recorded yet (last transmission at 0)
    pub fn new(min_interval_millis: i64) -> Self {
        Self {
            last_transmission_millis: 0,
            min_interval_millis,
        }
    }

    /// True iff the buffer is full and the minimum interval has elapsed
    pub fn should_form(&self, now_millis: i64, buffer_full: bool) -> bool {
        buffer_full && self.millis_since_last(now_millis) >= self.min_interval_millis
    }

    /// Record that a batch was formed at `now_millis`
    pub fn record_formation(&mut self, now_millis: i64) {
        self.last_transmission_millis = now_millis;
    }

    /// Restart the interval, used when tracking starts
    pub fn reset(&mut self, now_millis: i64) {
        self.last_transmission_millis = now_millis;
    }

    pub fn millis_since_last(&self, now_millis: i64) -> i64 {
        now_millis.saturating_sub(self.last_transmission_millis)
    }

    pub fn last_transmission_millis(&self) -> i64 {
        self.last_transmission_millis
    }

    pub fn min_interval_millis(&self) -> i64 {
        self.min_interval_millis
    }
}
