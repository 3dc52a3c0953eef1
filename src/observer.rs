//! Session observers
//!
//! A session reports what happens on the sensor and transmission paths to at
//! most one attached observer (typically the UI bridge). The observer is owned
//! by the session's [`ObserverSlot`] and can be attached and detached at any
//! time; with nothing attached notifications are dropped. None of the
//! pipeline's correctness depends on an observer being present.

use crate::types::{ErrorKind, HeartRateReading, TrackingMode};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Kind of sensor problem surfaced once to the control layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFaultKind {
    /// The device has no motion sensor
    MotionSensorUnavailable,
    /// The motion driver rejected the listener
    MotionSensorRegistration,
    /// The heart-rate tracker reported an error
    HeartRateTracker,
}

/// Notification emitted by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A validated heart-rate reading arrived
    HeartRate { reading: HeartRateReading },
    /// A heart-rate event arrived but did not validate
    HeartRateStatus { active: bool },
    /// A motion batch reached the companion device
    BatchTransmitted {
        peer_id: String,
        samples: usize,
        bpm: i32,
    },
    /// A motion batch was dropped
    TransmissionFailed {
        error_kind: ErrorKind,
        samples: usize,
    },
    /// Sensor problem; tracking continues in `mode`
    SensorFault {
        kind: SensorFaultKind,
        message: String,
        mode: TrackingMode,
    },
}

/// Receiver of session notifications
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionObserver for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

/// Attach/detach holder for one observer
#[derive(Default)]
pub struct ObserverSlot {
    observer: RwLock<Option<Arc<dyn SessionObserver>>>,
}

impl std::fmt::Debug for ObserverSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ObserverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer, replacing and returning any previous one
    pub fn attach(&self, observer: Arc<dyn SessionObserver>) -> Option<Arc<dyn SessionObserver>> {
        self.observer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(observer)
    }

    /// Detach the current observer, returning it
    pub fn detach(&self) -> Option<Arc<dyn SessionObserver>> {
        self.observer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_attached(&self) -> bool {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Deliver an event to the attached observer, if any.
    ///
    /// The observer runs after the slot lock is released, so it may attach or
    /// detach observers itself.
    pub fn notify(&self, event: SessionEvent) {
        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer.on_event(&event);
        }
    }
}
