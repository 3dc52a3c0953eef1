//! Core types for the Synheart Relay pipeline
//!
//! This module defines the data that flows from the two sensor streams
//! through the aggregation core and out to the companion device: raw sensor
//! events, validated heart-rate samples, motion batches and transmission
//! outcomes.

use serde::{Deserialize, Serialize};

/// Heart-rate event as delivered by the vendor tracker, consumed once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHeartRateEvent {
    /// Heart rate (bpm), meaningful only when `status_code` is valid
    pub bpm: i32,
    /// Vendor status of the heart-rate reading
    pub status_code: i32,
    /// Inter-beat intervals (ms)
    #[serde(default)]
    pub ibi_values: Vec<i32>,
    /// Per-interval vendor status, index-aligned with `ibi_values`
    #[serde(default)]
    pub ibi_statuses: Vec<i32>,
}

/// Heart-rate sample that passed validation.
///
/// Serializes as `{ "hr": .., "ibi": [..] }`, the element format of the
/// history export payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedHeartRateSample {
    #[serde(rename = "hr")]
    pub bpm: i32,
    pub ibi: Vec<i32>,
}

/// Latest validated heart-rate reading with its arrival time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateReading {
    pub sample: ValidatedHeartRateSample,
    pub received_at_millis: i64,
}

/// One accelerometer sample (m/s²)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawAccelSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub captured_at_millis: i64,
}

impl RawAccelSample {
    pub fn new(x: f32, y: f32, z: f32, captured_at_millis: i64) -> Self {
        Self {
            x,
            y,
            z,
            captured_at_millis,
        }
    }

    pub fn axes(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Fixed-count group of accelerometer samples plus one heart-rate value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionBatch {
    /// Formation time (epoch ms)
    pub captured_at_millis: i64,
    /// Most recent validated heart rate at formation time (0 if none yet)
    pub bpm: i32,
    /// Nominal sample rate label
    pub sample_rate_hz: u32,
    /// Number of samples, always `samples.len()`
    pub count: usize,
    /// (x, y, z) triples in capture order
    pub samples: Vec<[f32; 3]>,
}

impl MotionBatch {
    /// Build a batch from drained buffer contents
    pub fn from_samples(
        samples: &[RawAccelSample],
        bpm: i32,
        sample_rate_hz: u32,
        captured_at_millis: i64,
    ) -> Self {
        let samples: Vec<[f32; 3]> = samples.iter().map(RawAccelSample::axes).collect();
        Self {
            captured_at_millis,
            bpm,
            sample_rate_hz,
            count: samples.len(),
            samples,
        }
    }
}

/// Why a transmission attempt did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No connected companion device at send time
    NoPeer,
    /// Listing connected peers failed
    Discovery,
    /// Peer was reachable but delivery failed
    SendFailed,
    /// Payload could not be built
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoPeer => "no_peer",
            ErrorKind::Discovery => "discovery",
            ErrorKind::SendFailed => "send_failed",
            ErrorKind::Serialization => "serialization",
        }
    }
}

/// Result of one send attempt. Failures are terminal; nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionOutcome {
    pub success: bool,
    pub peer_id: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl TransmissionOutcome {
    pub fn delivered(peer_id: impl Into<String>) -> Self {
        Self {
            success: true,
            peer_id: Some(peer_id.into()),
            error_kind: None,
        }
    }

    pub fn failed(error_kind: ErrorKind, peer_id: Option<String>) -> Self {
        Self {
            success: false,
            peer_id,
            error_kind: Some(error_kind),
        }
    }

    /// Nothing was sent and the transport was never contacted
    pub fn skipped() -> Self {
        Self {
            success: false,
            peer_id: None,
            error_kind: None,
        }
    }
}

/// Read-only link probe result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    pub connected: bool,
    pub peer_count: usize,
}

/// Which streams a session is tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    Stopped,
    /// Heart rate and motion
    Full,
    /// Motion sensor missing or rejected the listener
    HeartRateOnly,
}

/// Accuracy level reported by the motion driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorAccuracy {
    High,
    Medium,
    Low,
    Unreliable,
    Unknown(i32),
}

impl SensorAccuracy {
    /// Map the platform accuracy code (3 = high .. 0 = unreliable)
    pub fn from_code(code: i32) -> Self {
        match code {
            3 => SensorAccuracy::High,
            2 => SensorAccuracy::Medium,
            1 => SensorAccuracy::Low,
            0 => SensorAccuracy::Unreliable,
            other => SensorAccuracy::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validated_sample_wire_names() {
        let sample = ValidatedHeartRateSample {
            bpm: 72,
            ibi: vec![820, 830],
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json, serde_json::json!({ "hr": 72, "ibi": [820, 830] }));
    }

    #[test]
    fn test_batch_from_samples_preserves_order() {
        let samples = vec![
            RawAccelSample::new(0.1, 0.2, 9.8, 10),
            RawAccelSample::new(0.3, -0.1, 9.7, 40),
        ];
        let batch = MotionBatch::from_samples(&samples, 64, 32, 100);
        assert_eq!(batch.count, 2);
        assert_eq!(batch.samples, vec![[0.1, 0.2, 9.8], [0.3, -0.1, 9.7]]);
        assert_eq!(batch.bpm, 64);
        assert_eq!(batch.captured_at_millis, 100);
    }

    #[test]
    fn test_outcome_constructors() {
        assert_eq!(
            TransmissionOutcome::failed(ErrorKind::NoPeer, None),
            TransmissionOutcome {
                success: false,
                peer_id: None,
                error_kind: Some(ErrorKind::NoPeer),
            }
        );
        assert!(TransmissionOutcome::delivered("phone").success);
        assert_eq!(TransmissionOutcome::skipped().error_kind, None);
    }

    #[test]
    fn test_accuracy_codes() {
        assert_eq!(SensorAccuracy::from_code(3), SensorAccuracy::High);
        assert_eq!(SensorAccuracy::from_code(0), SensorAccuracy::Unreliable);
        assert_eq!(SensorAccuracy::from_code(7), SensorAccuracy::Unknown(7));
    }
}
