//! Heart-rate sample validation
//!
//! Classifies vendor heart-rate events and extracts the usable inter-beat
//! intervals. Invalid input is never an error: the absence of a sample is
//! the signal.

use crate::types::{RawHeartRateEvent, ValidatedHeartRateSample};

/// Vendor status code of a valid heart-rate reading
pub const HR_STATUS_VALID: i32 = 1;

/// Vendor status code of a valid inter-beat interval
pub const IBI_STATUS_VALID: i32 = 0;

/// Stateless validator for raw heart-rate events
#[derive(Debug, Default, Clone, Copy)]
pub struct HeartRateSampleValidator;

impl HeartRateSampleValidator {
    /// Validate a raw event.
    ///
    /// Returns a sample iff the heart-rate status is valid. The sample's IBI
    /// list keeps, in order, every interval whose status is valid and whose
    /// value is non-zero. Intervals without a matching status entry are
    /// dropped.
    pub fn validate(event: &RawHeartRateEvent) -> Option<ValidatedHeartRateSample> {
        if event.status_code != HR_STATUS_VALID {
            return None;
        }

        Some(ValidatedHeartRateSample {
            bpm: event.bpm,
            ibi: Self::valid_ibi(event),
        })
    }

    fn valid_ibi(event: &RawHeartRateEvent) -> Vec<i32> {
        event
            .ibi_values
            .iter()
            .zip(event.ibi_statuses.iter())
            .filter(|(value, status)| **status == IBI_STATUS_VALID && **value != 0)
            .map(|(value, _)| *value)
            .collect()
    }
}
