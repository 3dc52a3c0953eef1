//! Companion-device transport
//!
//! The wireless link is an external capability: it lists the peers that are
//! currently connected and delivers a named payload to one of them. Both the
//! motion-batch path and the bulk-export path go through [`deliver`], which
//! applies the single-peer policy and converts failures into a
//! [`TransmissionOutcome`].

use crate::error::TransportError;
use crate::types::{Connectivity, ErrorKind, TransmissionOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub mod memory;

pub use memory::{MemoryTransport, SentMessage};

/// Channel carrying motion batches
pub const SENSOR_DATA_CHANNEL: &str = "/sensor_data";

/// Channel carrying the retained heart-rate history
pub const HEART_RATE_BATCH_CHANNEL: &str = "/heart_rate_batch";

/// Channel carrying single heart-rate payloads
pub const HEART_RATE_CHANNEL: &str = "/heart_rate";

/// A connected companion device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: String,
    pub display_name: String,
}

impl Peer {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Node discovery and messaging to the companion device
#[async_trait]
pub trait Transport: Send + Sync {
    /// Peers reachable right now, in discovery order
    async fn connected_peers(&self) -> Result<Vec<Peer>, TransportError>;

    /// Deliver `payload` on `channel`; resolves once the peer acknowledges
    async fn send(&self, peer: &Peer, channel: &str, payload: &[u8]) -> Result<(), TransportError>;
}

/// Send one payload to the first connected peer.
///
/// With several peers connected only the first discovered one receives the
/// payload; there is no fan-out. Nothing is retried.
pub async fn deliver(
    transport: &dyn Transport,
    channel: &str,
    payload: &[u8],
) -> TransmissionOutcome {
    let started = Instant::now();

    let peers = match transport.connected_peers().await {
        Ok(peers) => peers,
        Err(e) => {
            error!(channel, error = %e, "Failed to list connected peers");
            return TransmissionOutcome::failed(ErrorKind::Discovery, None);
        }
    };

    let Some(peer) = peers.into_iter().next() else {
        warn!(channel, "No connected peer, payload discarded");
        return TransmissionOutcome::failed(ErrorKind::NoPeer, None);
    };

    debug!(channel, peer = %peer.id, name = %peer.display_name, "Sending to peer");

    match transport.send(&peer, channel, payload).await {
        Ok(()) => {
            info!(
                channel,
                peer = %peer.display_name,
                bytes = payload.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Delivery succeeded"
            );
            TransmissionOutcome::delivered(peer.id)
        }
        Err(e) => {
            error!(
                channel,
                peer = %peer.display_name,
                bytes = payload.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "Delivery failed"
            );
            TransmissionOutcome::failed(ErrorKind::SendFailed, Some(peer.id))
        }
    }
}

/// Count connected peers, reporting "not connected" when discovery fails
pub async fn probe_connectivity(transport: &dyn Transport) -> Connectivity {
    match transport.connected_peers().await {
        Ok(peers) => Connectivity {
            connected: !peers.is_empty(),
            peer_count: peers.len(),
        },
        Err(e) => {
            warn!(error = %e, "Connectivity probe failed");
            Connectivity {
                connected: false,
                peer_count: 0,
            }
        }
    }
}
