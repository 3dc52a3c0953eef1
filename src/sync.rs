//! On-demand sync with the companion device
//!
//! Separate from the continuous motion-batch path: exports the retained
//! heart-rate history as a single payload, relays pre-serialized single
//! samples, and answers connectivity queries.

use crate::encoder::PayloadEncoder;
use crate::history::BoundedHistoryStore;
use crate::transport::{
    deliver, probe_connectivity, Transport, HEART_RATE_BATCH_CHANNEL, HEART_RATE_CHANNEL,
};
use crate::types::{Connectivity, ErrorKind, TransmissionOutcome};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Bulk export and ad hoc relay over the shared transport
#[derive(Clone)]
pub struct SyncFacade {
    transport: Arc<dyn Transport>,
}

impl SyncFacade {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send a snapshot of the retained history on `/heart_rate_batch`.
    ///
    /// An empty store yields an unsuccessful outcome without touching the
    /// transport. The store is not modified either way.
    pub async fn export_history(&self, store: &BoundedHistoryStore) -> TransmissionOutcome {
        let snapshot = store.snapshot();
        if snapshot.is_empty() {
            warn!("No retained heart rate samples to export");
            return TransmissionOutcome::skipped();
        }

        let payload = match PayloadEncoder::encode_history(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                error!(samples = snapshot.len(), error = %e, "Failed to serialize history");
                return TransmissionOutcome::failed(ErrorKind::Serialization, None);
            }
        };

        info!(samples = snapshot.len(), bytes = payload.len(), "Exporting heart rate history");
        deliver(self.transport.as_ref(), HEART_RATE_BATCH_CHANNEL, &payload).await
    }

    /// Relay one opaque payload on `/heart_rate`
    pub async fn send_single(&self, payload: &[u8]) -> TransmissionOutcome {
        deliver(self.transport.as_ref(), HEART_RATE_CHANNEL, payload).await
    }

    /// Connected-peer probe; transport errors read as "not connected"
    pub async fn query_connectivity(&self) -> Connectivity {
        probe_connectivity(self.transport.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::InboundMessage;
    use crate::error::TransportError;
    use crate::transport::MemoryTransport;
    use crate::types::ValidatedHeartRateSample;
    use pretty_assertions::assert_eq;

    fn sample(bpm: i32) -> ValidatedHeartRateSample {
        ValidatedHeartRateSample {
            bpm,
            ibi: vec![1_000, 990],
        }
    }

    #[tokio::test]
    async fn test_export_empty_store_skips_transport() {
        let transport = Arc::new(MemoryTransport::with_peers(&["phone"]));
        let facade = SyncFacade::new(transport.clone());

        let outcome = facade.export_history(&BoundedHistoryStore::default()).await;

        assert!(!outcome.success);
        assert_eq!(transport.discovery_calls(), 0);
        assert_eq!(transport.send_calls(), 0);
    }

    #[tokio::test]
    async fn test_export_sends_snapshot_oldest_first() {
        let transport = Arc::new(MemoryTransport::with_peers(&["phone"]));
        let facade = SyncFacade::new(transport.clone());
        let store = BoundedHistoryStore::new(3);
        for bpm in [60, 61, 62, 63] {
            store.insert(sample(bpm));
        }

        let outcome = facade.export_history(&store).await;
        assert_eq!(outcome, TransmissionOutcome::delivered("phone"));
        assert_eq!(store.len(), 3);

        let sent = transport.take_sent();
        assert_eq!(sent[0].channel, HEART_RATE_BATCH_CHANNEL);
        assert_eq!(
            InboundMessage::decode(&sent[0].channel, &sent[0].payload).unwrap(),
            InboundMessage::HeartRateHistory(vec![sample(61), sample(62), sample(63)])
        );
    }

    #[tokio::test]
    async fn test_export_without_peer() {
        let facade = SyncFacade::new(Arc::new(MemoryTransport::new()));
        let store = BoundedHistoryStore::default();
        store.insert(sample(70));

        let outcome = facade.export_history(&store).await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::NoPeer));
    }

    #[tokio::test]
    async fn test_send_single_uses_heart_rate_channel() {
        let transport = Arc::new(MemoryTransport::with_peers(&["phone"]));
        let facade = SyncFacade::new(transport.clone());
        let payload = br#"{"bpm":72,"timestamp":1}"#;

        assert!(facade.send_single(payload).await.success);
        let sent = transport.sent();
        assert_eq!(sent[0].channel, HEART_RATE_CHANNEL);
        assert_eq!(sent[0].payload, payload.to_vec());
    }

    #[tokio::test]
    async fn test_query_connectivity_tolerates_errors() {
        let transport = Arc::new(MemoryTransport::with_peers(&["phone"]));
        let facade = SyncFacade::new(transport.clone());
        assert_eq!(
            facade.query_connectivity().await,
            Connectivity {
                connected: true,
                peer_count: 1
            }
        );

        transport.fail_discovery(TransportError::Timeout);
        let connectivity = facade.query_connectivity().await;
        assert!(!connectivity.connected);
        assert_eq!(connectivity.peer_count, 0);
    }
}
