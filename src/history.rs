//! Retained heart-rate history
//!
//! A fixed-capacity FIFO of validated heart-rate samples used for on-demand
//! bulk export. Insertion order is time order; on overflow the single oldest
//! entry is evicted.

use crate::config::MAX_RETAINED;
use crate::types::ValidatedHeartRateSample;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe bounded history store
#[derive(Debug)]
pub struct BoundedHistoryStore {
    samples: Mutex<VecDeque<ValidatedHeartRateSample>>,
    capacity: usize,
}

impl Default for BoundedHistoryStore {
    fn default() -> Self {
        Self::new(MAX_RETAINED)
    }
}

impl BoundedHistoryStore {
    /// Create a store holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full.
    ///
    /// Returns the evicted sample, if any.
    pub fn insert(&self, sample: ValidatedHeartRateSample) -> Option<ValidatedHeartRateSample> {
        let mut samples = self.lock();
        let evicted = if samples.len() >= self.capacity {
            samples.pop_front()
        } else {
            None
        };
        samples.push_back(sample);
        evicted
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<ValidatedHeartRateSample> {
        self.lock().iter().cloned().collect()
    }

    /// Most recently inserted sample
    pub fn latest(&self) -> Option<ValidatedHeartRateSample> {
        self.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all retained samples
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ValidatedHeartRateSample>> {
        // Every critical section leaves the deque consistent, so a poisoned
        // lock still guards valid data.
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    fn sample(bpm: i32) -> ValidatedHeartRateSample {
        ValidatedHeartRateSample {
            bpm,
            ibi: vec![60_000 / bpm.max(1)],
        }
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(BoundedHistoryStore::default().capacity(), 40);
    }

    #[test]
    fn test_fifo_eviction_preserves_order() {
        let store = BoundedHistoryStore::new(40);
        for bpm in 1..=45 {
            store.insert(sample(bpm));
        }

        let retained: Vec<i32> = store.snapshot().iter().map(|s| s.bpm).collect();
        assert_eq!(retained, (6..=45).collect::<Vec<_>>());
        assert_eq!(store.len(), 40);
        assert_eq!(store.latest().map(|s| s.bpm), Some(45));
    }

    #[test]
    fn test_insert_reports_evicted() {
        let store = BoundedHistoryStore::new(2);
        assert_eq!(store.insert(sample(60)), None);
        assert_eq!(store.insert(sample(61)), None);
        assert_eq!(store.insert(sample(62)), Some(sample(60)));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = BoundedHistoryStore::new(4);
        store.insert(sample(70));
        let snapshot = store.snapshot();
        store.clear();

        assert_eq!(snapshot, vec![sample(70)]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_stay_bounded() {
        let store = Arc::new(BoundedHistoryStore::new(40));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100 {
                        store.insert(sample(t * 100 + i + 1));
                        assert!(store.len() <= 40);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 40);
    }
}
