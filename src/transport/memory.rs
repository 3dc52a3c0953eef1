//! In-memory transport
//!
//! Loopback implementation of [`Transport`] that records every delivered
//! message. Peers, discovery failures and send failures can be changed at
//! any time, which makes it the transport of choice for tests and for the
//! CLI simulation.

use super::{Peer, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Message accepted by a [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub peer_id: String,
    pub channel: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct LinkState {
    peers: Vec<Peer>,
    discovery_error: Option<TransportError>,
    send_error: Option<TransportError>,
    sent: Vec<SentMessage>,
}

/// Recording loopback transport
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<LinkState>,
    discovery_calls: AtomicUsize,
    send_calls: AtomicUsize,
}

impl MemoryTransport {
    /// Transport with no connected peer
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport with the given peers connected, in discovery order
    pub fn with_peers(ids: &[&str]) -> Self {
        let transport = Self::new();
        transport.set_peers(ids.iter().map(|id| Peer::new(*id, *id)).collect());
        transport
    }

    pub fn set_peers(&self, peers: Vec<Peer>) {
        self.lock().peers = peers;
    }

    /// Make every following discovery fail with `error`
    pub fn fail_discovery(&self, error: TransportError) {
        self.lock().discovery_error = Some(error);
    }

    /// Make every following send fail with `error`
    pub fn fail_sends(&self, error: TransportError) {
        self.lock().send_error = Some(error);
    }

    /// Clear injected failures
    pub fn heal(&self) {
        let mut state = self.lock();
        state.discovery_error = None;
        state.send_error = None;
    }

    /// Messages delivered so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Messages delivered so far, emptying the record
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.lock().sent)
    }

    pub fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connected_peers(&self) -> Result<Vec<Peer>, TransportError> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        match &state.discovery_error {
            Some(error) => Err(error.clone()),
            None => Ok(state.peers.clone()),
        }
    }

    async fn send(&self, peer: &Peer, channel: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(error) = &state.send_error {
            return Err(error.clone());
        }
        if !state.peers.iter().any(|p| p.id == peer.id) {
            return Err(TransportError::Disconnected);
        }
        state.sent.push(SentMessage {
            peer_id: peer.id.clone(),
            channel: channel.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_records_deliveries() {
        let transport = MemoryTransport::with_peers(&["watch-peer"]);
        let peer = Peer::new("watch-peer", "watch-peer");
        transport.send(&peer, "/x", b"abc").await.unwrap();

        assert_eq!(
            transport.take_sent(),
            vec![SentMessage {
                peer_id: "watch-peer".to_string(),
                channel: "/x".to_string(),
                payload: b"abc".to_vec(),
            }]
        );
        assert!(transport.sent().is_empty());
        assert_eq!(transport.send_calls(), 1);
    }

    #[tokio::test]
    async fn test_send_to_departed_peer_fails() {
        let transport = MemoryTransport::with_peers(&["a"]);
        transport.set_peers(Vec::new());
        let result = transport.send(&Peer::new("a", "a"), "/x", b"").await;
        assert_eq!(result, Err(TransportError::Disconnected));
    }

    #[tokio::test]
    async fn test_heal_clears_failures() {
        let transport = MemoryTransport::with_peers(&["a"]);
        transport.fail_discovery(TransportError::Timeout);
        assert!(transport.connected_peers().await.is_err());
        transport.heal();
        assert_eq!(transport.connected_peers().await.unwrap().len(), 1);
        assert_eq!(transport.discovery_calls(), 2);
    }
}
