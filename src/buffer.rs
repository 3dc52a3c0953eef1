//! Motion sample buffer
//!
//! Fixed-capacity FIFO of accelerometer samples fed from the motion driver's
//! callback. It never blocks on I/O and never grows: when full, new samples
//! are dropped. Samples leave only through a full drain (or `clear` on stop),
//! so no sample is ever part of two batches.

use crate::config::BUFFER_CAPACITY;
use crate::types::RawAccelSample;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of offering one sample to the buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    /// The sample was stored (false means it was dropped)
    pub accepted: bool,
    /// Full buffer contents, present when the offer formed a batch
    pub drained: Option<Vec<RawAccelSample>>,
}

/// Thread-safe drop-on-full sample buffer
#[derive(Debug)]
pub struct MotionSampleBuffer {
    samples: Mutex<Vec<RawAccelSample>>,
    capacity: usize,
}

impl Default for MotionSampleBuffer {
    fn default() -> Self {
        Self::new(BUFFER_CAPACITY)
    }
}

impl MotionSampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a sample if there is room. Returns whether it was accepted.
    pub fn push(&self, sample: RawAccelSample) -> bool {
        let mut samples = self.lock();
        Self::push_locked(&mut samples, self.capacity, sample)
    }

    /// Take all samples iff the buffer holds exactly `capacity` of them
    pub fn drain_full(&self) -> Option<Vec<RawAccelSample>> {
        let mut samples = self.lock();
        Self::drain_full_locked(&mut samples, self.capacity)
    }

    /// Push, then decide and drain within one critical section.
    ///
    /// `ready` is evaluated only when the buffer is full after the push
    /// attempt, while the lock is held; if it returns true the buffer is
    /// drained before any other push can interleave. A dropped sample still
    /// triggers the evaluation, so a stalled full buffer ships as soon as the
    /// gate opens.
    pub fn offer<F>(&self, sample: RawAccelSample, ready: F) -> Admission
    where
        F: FnOnce() -> bool,
    {
        let mut samples = self.lock();
        let accepted = Self::push_locked(&mut samples, self.capacity, sample);

        let drained = if samples.len() == self.capacity && ready() {
            Self::drain_full_locked(&mut samples, self.capacity)
        } else {
            None
        };

        Admission { accepted, drained }
    }

    /// Discard everything buffered. Returns the number of discarded samples.
    pub fn clear(&self) -> usize {
        let mut samples = self.lock();
        let discarded = samples.len();
        samples.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lock().len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently accepted sample still in the buffer
    pub fn latest(&self) -> Option<RawAccelSample> {
        self.lock().last().copied()
    }

    fn push_locked(
        samples: &mut Vec<RawAccelSample>,
        capacity: usize,
        sample: RawAccelSample,
    ) -> bool {
        if samples.len() < capacity {
            samples.push(sample);
            true
        } else {
            false
        }
    }

    fn drain_full_locked(
        samples: &mut Vec<RawAccelSample>,
        capacity: usize,
    ) -> Option<Vec<RawAccelSample>> {
        if samples.len() != capacity {
            return None;
        }
        // Swap in a fresh allocation so the drained batch can be moved out
        // while the buffer keeps its fixed capacity.
        Some(std::mem::replace(samples, Vec::with_capacity(capacity)))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RawAccelSample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
