//! Relay configuration
//!
//! Every tunable of the aggregation pipeline lives here. The defaults are the
//! values the companion app expects on the wire, so a session built from
//! `RelayConfig::default()` is the canonical configuration.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};

/// Number of accelerometer samples in one motion batch
pub const BUFFER_CAPACITY: usize = 32;

/// Minimum spacing between two batch formations (ms)
pub const MIN_TRANSMISSION_INTERVAL_MILLIS: i64 = 1000;

/// Number of validated heart-rate samples kept for bulk export
pub const MAX_RETAINED: usize = 40;

/// Nominal accelerometer rate reported in each batch (informational only)
pub const TARGET_SAMPLE_RATE_HZ: u32 = 32;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Samples per motion batch
    pub buffer_capacity: usize,
    /// Throttle between batch formations (ms)
    pub min_transmission_interval_ms: i64,
    /// Capacity of the retained heart-rate history
    pub max_retained: usize,
    /// Sample rate label written into each batch
    pub sample_rate_hz: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: BUFFER_CAPACITY,
            min_transmission_interval_ms: MIN_TRANSMISSION_INTERVAL_MILLIS,
            max_retained: MAX_RETAINED,
            sample_rate_hz: TARGET_SAMPLE_RATE_HZ,
        }
    }
}

impl RelayConfig {
    /// Check that the configuration can drive a session
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.buffer_capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "buffer_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_retained == 0 {
            return Err(RelayError::InvalidConfig(
                "max_retained must be greater than zero".to_string(),
            ));
        }
        if self.min_transmission_interval_ms < 0 {
            return Err(RelayError::InvalidConfig(format!(
                "min_transmission_interval_ms must not be negative (got {})",
                self.min_transmission_interval_ms
            )));
        }
        Ok(())
    }

    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, RelayError> {
        let config: RelayConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON
    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
