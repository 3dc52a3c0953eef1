//! Aggregation session
//!
//! One session covers one start-to-stop tracking period. It is fed from two
//! independent producer contexts (the heart-rate tracker callback and the
//! motion driver callback) and driven by a control context (start, stop,
//! diagnostics).
//!
//! Motion path: sample → buffer → formation policy → transmitter. The push,
//! the formation decision and the drain happen in one critical section of the
//! buffer; the network send happens afterwards on the runtime, so the sensor
//! callback never waits on I/O.
//!
//! Heart-rate path: event → validator → history store and latest-bpm cell.
//! The cell is read when a motion batch is formed and may be stale.

use crate::buffer::MotionSampleBuffer;
use crate::clock::Clock;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::history::BoundedHistoryStore;
use crate::observer::{ObserverSlot, SensorFaultKind, SessionEvent, SessionObserver};
use crate::policy::BatchFormationPolicy;
use crate::transmitter::BatchTransmitter;
use crate::transport::Transport;
use crate::types::{
    HeartRateReading, MotionBatch, RawAccelSample, RawHeartRateEvent, SensorAccuracy,
    TrackingMode, TransmissionOutcome, ValidatedHeartRateSample,
};
use crate::validator::HeartRateSampleValidator;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// The device's motion sensor, as seen by a session
pub trait MotionSensor: Send + Sync {
    /// Whether the device has an accelerometer at all
    fn is_present(&self) -> bool;

    /// Start delivering samples to the session
    fn register(&self) -> Result<(), String>;

    /// Stop delivering samples
    fn unregister(&self);
}

/// What happened to one accelerometer sample
#[derive(Debug)]
pub struct SampleAdmission {
    /// The sample entered the buffer
    pub accepted: bool,
    /// Transmission of the batch this sample completed, if one was formed
    pub dispatched: Option<JoinHandle<TransmissionOutcome>>,
}

impl SampleAdmission {
    fn ignored() -> Self {
        Self {
            accepted: false,
            dispatched: None,
        }
    }
}

/// Point-in-time view of a session for debugging and UI
#[derive(Debug, Clone, Serialize)]
pub struct SessionDiagnostics {
    pub session_id: Uuid,
    pub mode: TrackingMode,
    pub buffered_samples: usize,
    pub buffer_capacity: usize,
    pub millis_since_last_transmission: i64,
    pub latest_sample: Option<RawAccelSample>,
    pub current_bpm: i32,
    pub latest_heart_rate: Option<HeartRateReading>,
    pub retained_samples: usize,
    pub retained_capacity: usize,
    pub observer_attached: bool,
}

/// Sensor aggregation and batched relay for one tracking session
///
/// Lock order is `mode` → `buffer` → `policy`. No guard is held while taking
/// a lock earlier in that order.
pub struct AggregationSession {
    session_id: Uuid,
    config: RelayConfig,
    clock: Arc<dyn Clock>,
    buffer: MotionSampleBuffer,
    policy: Mutex<BatchFormationPolicy>,
    current_bpm: AtomicI32,
    latest_reading: Mutex<Option<HeartRateReading>>,
    history: Arc<BoundedHistoryStore>,
    observer: Arc<ObserverSlot>,
    transmitter: BatchTransmitter,
    mode: Mutex<TrackingMode>,
    heart_rate_active: AtomicBool,
    motion_active: AtomicBool,
}

impl AggregationSession {
    /// Create a stopped session. Transmissions are spawned on `runtime`.
    pub fn new(
        config: RelayConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Result<Self, RelayError> {
        let history = Arc::new(BoundedHistoryStore::new(config.max_retained));
        Self::with_history(config, transport, clock, runtime, history)
    }

    /// Create a session around an existing history store, which may outlive it
    pub fn with_history(
        config: RelayConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
        history: Arc<BoundedHistoryStore>,
    ) -> Result<Self, RelayError> {
        config.validate()?;

        let observer = Arc::new(ObserverSlot::new());
        let transmitter = BatchTransmitter::new(transport, Arc::clone(&observer), runtime);

        Ok(Self {
            session_id: Uuid::new_v4(),
            buffer: MotionSampleBuffer::new(config.buffer_capacity),
            policy: Mutex::new(BatchFormationPolicy::new(config.min_transmission_interval_ms)),
            current_bpm: AtomicI32::new(0),
            latest_reading: Mutex::new(None),
            history,
            observer,
            transmitter,
            mode: Mutex::new(TrackingMode::Stopped),
            heart_rate_active: AtomicBool::new(false),
            motion_active: AtomicBool::new(false),
            clock,
            config,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn mode(&self) -> TrackingMode {
        *lock(&self.mode)
    }

    pub fn is_tracking(&self) -> bool {
        self.mode() != TrackingMode::Stopped
    }

    // ------------------------------------------------------------------
    // Control context
    // ------------------------------------------------------------------

    /// Start tracking.
    ///
    /// A missing or rejecting motion sensor is reported once through the
    /// observer and the session runs heart-rate only. Starting an active
    /// session is a no-op.
    pub fn start(&self, motion: &dyn MotionSensor) -> TrackingMode {
        let mut mode = lock(&self.mode);
        if *mode != TrackingMode::Stopped {
            warn!(session = %self.session_id, "Already tracking, ignoring start request");
            return *mode;
        }

        let now = self.clock.now_millis();
        lock(&self.policy).reset(now);

        let fault = if !motion.is_present() {
            error!(
                session = %self.session_id,
                at = now,
                "Accelerometer not available on this device"
            );
            Some((
                SensorFaultKind::MotionSensorUnavailable,
                RelayError::SensorUnavailable(
                    "accelerometer not found on this device".to_string(),
                ),
            ))
        } else {
            match motion.register() {
                Ok(()) => None,
                Err(reason) => {
                    error!(
                        session = %self.session_id,
                        at = now,
                        reason = %reason,
                        "Failed to register accelerometer listener"
                    );
                    Some((
                        SensorFaultKind::MotionSensorRegistration,
                        RelayError::SensorRegistration(reason),
                    ))
                }
            }
        };

        let next = if fault.is_some() {
            TrackingMode::HeartRateOnly
        } else {
            TrackingMode::Full
        };
        *mode = next;
        self.heart_rate_active.store(true, Ordering::Release);
        self.motion_active
            .store(next == TrackingMode::Full, Ordering::Release);
        drop(mode);

        info!(
            session = %self.session_id,
            at = now,
            mode = ?next,
            target_rate_hz = self.config.sample_rate_hz,
            buffer_size = self.config.buffer_capacity,
            min_interval_ms = self.config.min_transmission_interval_ms,
            "Tracking started"
        );

        if let Some((kind, error)) = fault {
            self.observer.notify(SessionEvent::SensorFault {
                kind,
                message: error.to_string(),
                mode: next,
            });
        }

        next
    }

    /// Stop tracking and discard any partial batch.
    ///
    /// Returns the number of buffered samples that were discarded. A batch
    /// already drained keeps its in-flight transmission.
    pub fn stop(&self, motion: &dyn MotionSensor) -> usize {
        let mut mode = lock(&self.mode);
        if *mode == TrackingMode::Stopped {
            debug!(session = %self.session_id, "Not tracking, ignoring stop request");
            return 0;
        }

        self.motion_active.store(false, Ordering::Release);
        self.heart_rate_active.store(false, Ordering::Release);
        if *mode == TrackingMode::Full {
            motion.unregister();
        }
        let discarded = self.buffer.clear();
        *mode = TrackingMode::Stopped;

        info!(
            session = %self.session_id,
            at = self.clock.now_millis(),
            discarded_samples = discarded,
            "Tracking stopped"
        );
        discarded
    }

    /// Observer slot for attach/detach
    pub fn observer(&self) -> &ObserverSlot {
        &self.observer
    }

    pub fn attach_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.observer.attach(observer);
    }

    pub fn detach_observer(&self) {
        self.observer.detach();
    }

    /// Retained history, shared with the sync path
    pub fn history(&self) -> Arc<BoundedHistoryStore> {
        Arc::clone(&self.history)
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }

    /// Bpm that the next motion batch will carry (0 before any valid reading)
    pub fn current_bpm(&self) -> i32 {
        self.current_bpm.load(Ordering::Acquire)
    }

    pub fn latest_heart_rate(&self) -> Option<HeartRateReading> {
        lock(&self.latest_reading).clone()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        let now = self.clock.now_millis();
        let buffered_samples = self.buffer.len();
        let latest_sample = self.buffer.latest();
        // Released before building the snapshot: `on_accel_sample` takes the
        // policy lock while holding the buffer lock.
        let millis_since_last_transmission = lock(&self.policy).millis_since_last(now);

        SessionDiagnostics {
            session_id: self.session_id,
            mode: self.mode(),
            buffered_samples,
            buffer_capacity: self.buffer.capacity(),
            millis_since_last_transmission,
            latest_sample,
            current_bpm: self.current_bpm(),
            latest_heart_rate: self.latest_heart_rate(),
            retained_samples: self.history.len(),
            retained_capacity: self.history.capacity(),
            observer_attached: self.observer.is_attached(),
        }
    }

    // ------------------------------------------------------------------
    // Heart-rate producer context
    // ------------------------------------------------------------------

    /// Handle one event from the heart-rate tracker
    pub fn on_heart_rate_event(
        &self,
        event: &RawHeartRateEvent,
    ) -> Option<ValidatedHeartRateSample> {
        if !self.heart_rate_active.load(Ordering::Acquire) {
            trace!(session = %self.session_id, "Heart rate event while not tracking, ignored");
            return None;
        }

        let Some(sample) = HeartRateSampleValidator::validate(event) else {
            debug!(
                session = %self.session_id,
                status = event.status_code,
                "Heart rate event did not validate"
            );
            self.observer
                .notify(SessionEvent::HeartRateStatus { active: false });
            return None;
        };

        let reading = HeartRateReading {
            sample: sample.clone(),
            received_at_millis: self.clock.now_millis(),
        };
        self.current_bpm.store(sample.bpm, Ordering::Release);
        *lock(&self.latest_reading) = Some(reading.clone());
        self.history.insert(sample.clone());

        debug!(
            session = %self.session_id,
            bpm = sample.bpm,
            ibi_count = sample.ibi.len(),
            "Heart rate sample validated"
        );
        self.observer.notify(SessionEvent::HeartRate { reading });

        Some(sample)
    }

    /// Error reported by the heart-rate tracker; tracking continues
    pub fn on_heart_rate_tracker_error(&self, message: &str) {
        error!(session = %self.session_id, error = message, "Heart rate tracker error");
        self.observer.notify(SessionEvent::SensorFault {
            kind: SensorFaultKind::HeartRateTracker,
            message: message.to_string(),
            mode: self.mode(),
        });
    }

    // ------------------------------------------------------------------
    // Motion producer context
    // ------------------------------------------------------------------

    /// Handle one accelerometer sample. Never blocks on the network.
    pub fn on_accel_sample(&self, x: f32, y: f32, z: f32) -> SampleAdmission {
        if !self.motion_active.load(Ordering::Acquire) {
            trace!(session = %self.session_id, "Accelerometer sample while not tracking, ignored");
            return SampleAdmission::ignored();
        }

        let now = self.clock.now_millis();
        let sample = RawAccelSample::new(x, y, z, now);

        let admission = self.buffer.offer(sample, || {
            let mut policy = lock(&self.policy);
            if policy.should_form(now, true) {
                policy.record_formation(now);
                true
            } else {
                false
            }
        });

        if admission.accepted {
            trace!(at = now, x, y, z, "Accelerometer sample buffered");
        } else if admission.drained.is_none() {
            trace!(at = now, "Buffer full, accelerometer sample dropped");
        }

        let dispatched = admission.drained.map(|samples| {
            let batch = MotionBatch::from_samples(
                &samples,
                self.current_bpm(),
                self.config.sample_rate_hz,
                now,
            );
            info!(
                session = %self.session_id,
                at = now,
                samples = batch.count,
                bpm = batch.bpm,
                "Motion batch formed"
            );
            self.transmitter.dispatch(batch)
        });

        SampleAdmission {
            accepted: admission.accepted,
            dispatched,
        }
    }

    /// Accuracy change from the motion driver; informational only
    pub fn on_sensor_accuracy_changed(&self, accuracy: SensorAccuracy) {
        info!(
            session = %self.session_id,
            at = self.clock.now_millis(),
            accuracy = ?accuracy,
            "Sensor accuracy changed"
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
