//! Motion batch transmission
//!
//! Serializes a formed batch and hands it to the transport on the
//! `/sensor_data` channel. Dispatch is fire-and-forget from the sensor
//! thread's point of view: the send runs as a task on the session's runtime
//! and its outcome resolves through the returned `JoinHandle`. A failed batch
//! is dropped; the next batch is attempted independently.

use crate::encoder::PayloadEncoder;
use crate::observer::{ObserverSlot, SessionEvent};
use crate::transport::{deliver, Transport, SENSOR_DATA_CHANNEL};
use crate::types::{ErrorKind, MotionBatch, TransmissionOutcome};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sends motion batches to the first connected peer
pub struct BatchTransmitter {
    transport: Arc<dyn Transport>,
    observer: Arc<ObserverSlot>,
    runtime: Handle,
}

impl BatchTransmitter {
    pub fn new(
        transport: Arc<dyn Transport>,
        observer: Arc<ObserverSlot>,
        runtime: Handle,
    ) -> Self {
        Self {
            transport,
            observer,
            runtime,
        }
    }

    /// Spawn the transmission and return immediately
    pub fn dispatch(&self, batch: MotionBatch) -> JoinHandle<TransmissionOutcome> {
        let transport = Arc::clone(&self.transport);
        let observer = Arc::clone(&self.observer);
        self.runtime
            .spawn(async move { transmit(transport.as_ref(), &observer, batch).await })
    }

    /// Transmit on the caller's task
    pub async fn send(&self, batch: MotionBatch) -> TransmissionOutcome {
        transmit(self.transport.as_ref(), &self.observer, batch).await
    }
}

async fn transmit(
    transport: &dyn Transport,
    observer: &ObserverSlot,
    batch: MotionBatch,
) -> TransmissionOutcome {
    let samples = batch.count;
    let bpm = batch.bpm;
    info!(
        samples,
        bpm,
        sample_rate = batch.sample_rate_hz,
        timestamp = batch.captured_at_millis,
        "Preparing batch transmission"
    );

    let payload = match PayloadEncoder::encode_motion_batch(&batch) {
        Ok(payload) => payload,
        Err(e) => {
            error!(samples, bpm, error = %e, "Failed to serialize motion batch");
            observer.notify(SessionEvent::TransmissionFailed {
                error_kind: ErrorKind::Serialization,
                samples,
            });
            return TransmissionOutcome::failed(ErrorKind::Serialization, None);
        }
    };
    debug!(bytes = payload.len(), samples, "Motion batch packet created");

    let outcome = deliver(transport, SENSOR_DATA_CHANNEL, &payload).await;

    match (&outcome.peer_id, outcome.error_kind) {
        (Some(peer_id), None) => {
            observer.notify(SessionEvent::BatchTransmitted {
                peer_id: peer_id.clone(),
                samples,
                bpm,
            });
        }
        (_, Some(error_kind)) => {
            warn!(samples, bpm, error_kind = error_kind.as_str(), "Motion batch dropped");
            observer.notify(SessionEvent::TransmissionFailed {
                error_kind,
                samples,
            });
        }
        (None, None) => {}
    }

    outcome
}
