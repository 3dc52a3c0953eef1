//! Error types for Synheart Relay

use thiserror::Error;

/// Errors surfaced by the relay core.
///
/// Nothing on the sensor-delivery path returns these to a producer; they are
/// logged and turned into observer events there. Control operations
/// (configuration, decoding, connection handling) return them directly.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Failed to decode payload: {0}")]
    Decode(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Motion sensor registration failed: {0}")]
    SensorRegistration(String),

    #[error("Invalid connection transition: {event} while {from}")]
    InvalidTransition { from: String, event: String },
}

/// Failures reported by a [`crate::transport::Transport`] implementation.
///
/// These never become a [`RelayError`]: `transport::deliver` folds them into a
/// failed `TransmissionOutcome`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("peer discovery failed: {0}")]
    Discovery(String),

    #[error("delivery rejected: {0}")]
    Rejected(String),

    #[error("delivery timed out")]
    Timeout,

    #[error("link disconnected")]
    Disconnected,
}
