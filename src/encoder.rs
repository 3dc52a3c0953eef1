//! Wire encoding
//!
//! This module builds the JSON payloads sent to the companion device and
//! decodes them on the receiving side:
//!
//! - `/sensor_data`: one motion batch as a `sensor_batch` object
//! - `/heart_rate_batch`: the retained history as an array of `{hr, ibi}`
//! - `/heart_rate`: an opaque JSON object produced upstream

use crate::error::RelayError;
use crate::transport::{HEART_RATE_BATCH_CHANNEL, HEART_RATE_CHANNEL, SENSOR_DATA_CHANNEL};
use crate::types::{MotionBatch, ValidatedHeartRateSample};
use serde::{Deserialize, Serialize};

/// Value of the `type` field of a motion batch packet
pub const SENSOR_BATCH_TYPE: &str = "sensor_batch";

/// Motion batch as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorBatchPacket {
    #[serde(rename = "type")]
    pub packet_type: String,
    pub timestamp: i64,
    pub bpm: i32,
    pub sample_rate: u32,
    pub count: usize,
    pub accelerometer: Vec<[f64; 3]>,
}

impl From<&MotionBatch> for SensorBatchPacket {
    fn from(batch: &MotionBatch) -> Self {
        Self {
            packet_type: SENSOR_BATCH_TYPE.to_string(),
            timestamp: batch.captured_at_millis,
            bpm: batch.bpm,
            sample_rate: batch.sample_rate_hz,
            count: batch.count,
            accelerometer: batch
                .samples
                .iter()
                .map(|[x, y, z]| [f64::from(*x), f64::from(*y), f64::from(*z)])
                .collect(),
        }
    }
}

impl SensorBatchPacket {
    fn into_batch(self) -> Result<MotionBatch, RelayError> {
        if self.packet_type != SENSOR_BATCH_TYPE {
            return Err(RelayError::Decode(format!(
                "expected type {SENSOR_BATCH_TYPE}, got {}",
                self.packet_type
            )));
        }
        if self.count != self.accelerometer.len() {
            return Err(RelayError::Decode(format!(
                "count {} does not match {} accelerometer samples",
                self.count,
                self.accelerometer.len()
            )));
        }

        Ok(MotionBatch {
            captured_at_millis: self.timestamp,
            bpm: self.bpm,
            sample_rate_hz: self.sample_rate,
            count: self.count,
            samples: self
                .accelerometer
                .iter()
                .map(|[x, y, z]| [*x as f32, *y as f32, *z as f32])
                .collect(),
        })
    }
}

/// Payload encoder for the outbound channels
pub struct PayloadEncoder;

impl PayloadEncoder {
    /// Encode a motion batch for `/sensor_data`.
    ///
    /// Fails on internally inconsistent batches (count mismatch) and on
    /// non-finite axis values, which JSON cannot carry.
    pub fn encode_motion_batch(batch: &MotionBatch) -> Result<Vec<u8>, RelayError> {
        if batch.count != batch.samples.len() {
            return Err(RelayError::Encoding(format!(
                "batch count {} does not match {} samples",
                batch.count,
                batch.samples.len()
            )));
        }
        if let Some(index) = batch
            .samples
            .iter()
            .position(|axes| axes.iter().any(|v| !v.is_finite()))
        {
            return Err(RelayError::Encoding(format!(
                "non-finite accelerometer value at sample {index}"
            )));
        }

        Ok(serde_json::to_vec(&SensorBatchPacket::from(batch))?)
    }

    /// Encode the retained history for `/heart_rate_batch`, oldest first
    pub fn encode_history(samples: &[ValidatedHeartRateSample]) -> Result<Vec<u8>, RelayError> {
        Ok(serde_json::to_vec(samples)?)
    }
}

/// Decoded message received on one of the relay channels
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `/sensor_data`
    SensorBatch(MotionBatch),
    /// `/heart_rate_batch`
    HeartRateHistory(Vec<ValidatedHeartRateSample>),
    /// `/heart_rate`
    HeartRate(serde_json::Map<String, serde_json::Value>),
}

impl InboundMessage {
    /// Decode a payload according to the channel it arrived on
    pub fn decode(channel: &str, payload: &[u8]) -> Result<Self, RelayError> {
        match channel {
            SENSOR_DATA_CHANNEL => {
                let packet: SensorBatchPacket = serde_json::from_slice(payload)?;
                Ok(InboundMessage::SensorBatch(packet.into_batch()?))
            }
            HEART_RATE_BATCH_CHANNEL => Ok(InboundMessage::HeartRateHistory(
                serde_json::from_slice(payload)?,
            )),
            HEART_RATE_CHANNEL => match serde_json::from_slice(payload)? {
                serde_json::Value::Object(map) => Ok(InboundMessage::HeartRate(map)),
                other => Err(RelayError::Decode(format!(
                    "heart rate payload must be a JSON object, got {}",
                    json_kind(&other)
                ))),
            },
            other => Err(RelayError::UnknownChannel(other.to_string())),
        }
    }

    /// Channel this message belongs to
    pub fn channel(&self) -> &'static str {
        match self {
            InboundMessage::SensorBatch(_) => SENSOR_DATA_CHANNEL,
            InboundMessage::HeartRateHistory(_) => HEART_RATE_BATCH_CHANNEL,
            InboundMessage::HeartRate(_) => HEART_RATE_CHANNEL,
        }
    }

    /// JSON view of the decoded message
    pub fn to_json_value(&self) -> Result<serde_json::Value, RelayError> {
        let value = match self {
            InboundMessage::SensorBatch(batch) => {
                serde_json::to_value(SensorBatchPacket::from(batch))?
            }
            InboundMessage::HeartRateHistory(samples) => serde_json::to_value(samples)?,
            InboundMessage::HeartRate(map) => serde_json::Value::Object(map.clone()),
        };
        Ok(value)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
