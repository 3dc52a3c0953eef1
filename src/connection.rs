//! Heart-rate service connection
//!
//! The vendor health service connects asynchronously and reports back through
//! success / ended / failed callbacks. This module tracks that lifecycle as an
//! explicit state machine:
//!
//! ```text
//! Disconnected ──request_connect──▶ Connecting ──succeeded──▶ Connected
//!      ▲                               │                         │
//!      │                            failed                 ended │ failed
//!      │                               ▼                         ▼
//!      └────────acknowledge──────── Failed                    Ended
//! ```
//!
//! A connect request while already connected revalidates the continuous
//! heart-rate capability instead of reconnecting blindly.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Reason recorded when the service connects without heart-rate support
pub const CAPABILITY_MISSING: &str = "heart rate tracking not supported";

/// Connection lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Ended,
    Failed(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Ended => write!(f, "ended"),
            ConnectionState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Outcome of a connect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectDecision {
    /// The caller must initiate a new service connection
    StartConnect,
    /// A connection attempt is already under way
    InProgress,
    /// Connected and the capability is still present
    AlreadyConnected,
}

/// Queries the connected service for its tracker capabilities
pub trait CapabilityProbe {
    /// Whether continuous heart-rate tracking is supported.
    ///
    /// An error means the capability could not be read.
    fn supports_continuous_heart_rate(&self) -> Result<bool, String>;
}

/// State machine for the health-service link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthServiceConnection {
    state: ConnectionState,
}

impl Default for HealthServiceConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthServiceConnection {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Ask for a connection.
    ///
    /// Terminal states (`Ended`, `Failed`) are cleared first. While connected
    /// the capability is revalidated: if it is gone the link drops to
    /// `Disconnected` and a fresh connect starts.
    pub fn request_connect(&mut self, probe: &dyn CapabilityProbe) -> ConnectDecision {
        match self.state {
            ConnectionState::Connecting => ConnectDecision::InProgress,
            ConnectionState::Connected if capability_present(probe) => {
                debug!("Health service already connected, capability revalidated");
                ConnectDecision::AlreadyConnected
            }
            ConnectionState::Connected => {
                warn!("Health service connected but capability lost, reconnecting");
                self.transition(ConnectionState::Disconnected);
                self.transition(ConnectionState::Connecting);
                ConnectDecision::StartConnect
            }
            ConnectionState::Ended | ConnectionState::Failed(_) => {
                self.transition(ConnectionState::Disconnected);
                self.transition(ConnectionState::Connecting);
                ConnectDecision::StartConnect
            }
            ConnectionState::Disconnected => {
                self.transition(ConnectionState::Connecting);
                ConnectDecision::StartConnect
            }
        }
    }

    /// The service reported a successful connection
    pub fn connection_succeeded(&mut self, probe: &dyn CapabilityProbe) -> Result<(), RelayError> {
        self.require("connection_succeeded", |s| matches!(s, ConnectionState::Connecting))?;

        if capability_present(probe) {
            self.transition(ConnectionState::Connected);
            Ok(())
        } else {
            self.transition(ConnectionState::Failed(CAPABILITY_MISSING.to_string()));
            Err(RelayError::SensorUnavailable(CAPABILITY_MISSING.to_string()))
        }
    }

    /// The service closed an established connection
    pub fn connection_ended(&mut self) -> Result<(), RelayError> {
        self.require("connection_ended", |s| matches!(s, ConnectionState::Connected))?;
        self.transition(ConnectionState::Ended);
        Ok(())
    }

    /// The service reported a connection failure
    pub fn connection_failed(&mut self, reason: impl Into<String>) -> Result<(), RelayError> {
        self.require("connection_failed", |s| {
            matches!(s, ConnectionState::Connecting | ConnectionState::Connected)
        })?;
        self.transition(ConnectionState::Failed(reason.into()));
        Ok(())
    }

    /// Clear a terminal state back to `Disconnected`
    pub fn acknowledge(&mut self) -> Result<(), RelayError> {
        self.require("acknowledge", |s| {
            matches!(s, ConnectionState::Ended | ConnectionState::Failed(_))
        })?;
        self.transition(ConnectionState::Disconnected);
        Ok(())
    }

    /// Tear down from any state
    pub fn disconnect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected);
        }
    }

    fn require<F>(&self, event: &str, allowed: F) -> Result<(), RelayError>
    where
        F: FnOnce(&ConnectionState) -> bool,
    {
        if allowed(&self.state) {
            Ok(())
        } else {
            Err(RelayError::InvalidTransition {
                from: self.state.to_string(),
                event: event.to_string(),
            })
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        info!(from = %self.state, to = %next, "Health service connection transition");
        self.state = next;
    }
}

fn capability_present(probe: &dyn CapabilityProbe) -> bool {
    match probe.supports_continuous_heart_rate() {
        Ok(supported) => supported,
        Err(e) => {
            warn!(error = %e, "Failed to read tracker capabilities");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    struct Probe(Cell<Result<bool, &'static str>>);

    impl Probe {
        fn supported() -> Self {
            Probe(Cell::new(Ok(true)))
        }
    }

    impl CapabilityProbe for Probe {
        fn supports_continuous_heart_rate(&self) -> Result<bool, String> {
            self.0.get().map_err(str::to_string)
        }
    }

    fn connected(probe: &Probe) -> HealthServiceConnection {
        let mut link = HealthServiceConnection::new();
        assert_eq!(link.request_connect(probe), ConnectDecision::StartConnect);
        link.connection_succeeded(probe).unwrap();
        link
    }

    #[test]
    fn test_happy_path() {
        let probe = Probe::supported();
        let mut link = connected(&probe);
        assert!(link.is_connected());

        link.connection_ended().unwrap();
        assert_eq!(link.state(), &ConnectionState::Ended);
        link.acknowledge().unwrap();
        assert_eq!(link.state(), &ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_while_connecting() {
        let probe = Probe::supported();
        let mut link = HealthServiceConnection::new();
        link.request_connect(&probe);
        assert_eq!(link.request_connect(&probe), ConnectDecision::InProgress);
    }

    #[test]
    fn test_revalidation_keeps_connection() {
        let probe = Probe::supported();
        let mut link = connected(&probe);
        assert_eq!(link.request_connect(&probe), ConnectDecision::AlreadyConnected);
        assert!(link.is_connected());
    }

    #[test]
    fn test_revalidation_failure_reconnects() {
        let probe = Probe::supported();
        let mut link = connected(&probe);

        probe.0.set(Err("service gone"));
        assert_eq!(link.request_connect(&probe), ConnectDecision::StartConnect);
        assert_eq!(link.state(), &ConnectionState::Connecting);
    }

    #[test]
    fn test_missing_capability_fails_connection() {
        let probe = Probe(Cell::new(Ok(false)));
        let mut link = HealthServiceConnection::new();
        link.request_connect(&probe);

        assert!(matches!(
            link.connection_succeeded(&probe),
            Err(RelayError::SensorUnavailable(_))
        ));
        assert_eq!(
            link.state(),
            &ConnectionState::Failed(CAPABILITY_MISSING.to_string())
        );
    }

    #[test]
    fn test_failed_state_allows_new_connect() {
        let probe = Probe::supported();
        let mut link = HealthServiceConnection::new();
        link.request_connect(&probe);
        link.connection_failed("binder died").unwrap();

        assert_eq!(link.request_connect(&probe), ConnectDecision::StartConnect);
        assert_eq!(link.state(), &ConnectionState::Connecting);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut link = HealthServiceConnection::new();
        assert!(matches!(
            link.connection_ended(),
            Err(RelayError::InvalidTransition { .. })
        ));
        assert!(link.acknowledge().is_err());
        assert!(link.connection_succeeded(&Probe::supported()).is_err());
        assert_eq!(link.state(), &ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_from_any_state() {
        let probe = Probe::supported();
        let mut link = connected(&probe);
        link.disconnect();
        assert_eq!(link.state(), &ConnectionState::Disconnected);
    }

    #[test]
    fn test_state_json() {
        assert_eq!(
            serde_json::to_value(ConnectionState::Failed("x".to_string())).unwrap(),
            serde_json::json!({ "state": "failed", "reason": "x" })
        );
    }
}
