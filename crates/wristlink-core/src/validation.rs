//! Sanity checks applied at the sensor and session boundaries.

use crate::error::ValidationError;
use crate::types::{Metric, SensorSample, SessionParameters};

/// Plausibility bounds for sensor values.
pub mod bounds {
    /// Readings at or below this are sensor noise (off-wrist, no contact).
    pub const MIN_HEART_RATE_BPM: f64 = 0.0;
    /// Highest heart rate accepted as physiological.
    pub const MAX_HEART_RATE_BPM: f64 = 250.0;
    /// Highest cumulative step count accepted for one session.
    pub const MAX_STEPS: f64 = 200_000.0;
}

/// Check that a sample is finite and within physiological bounds.
///
/// Heart rate must be strictly positive; step counts may be zero.
pub fn validate_sample(sample: &SensorSample) -> Result<(), ValidationError> {
    if !sample.value.is_finite() {
        return Err(ValidationError::NotFinite(sample.metric));
    }

    let (min, max, in_range) = match sample.metric {
        Metric::HeartRate => (
            bounds::MIN_HEART_RATE_BPM,
            bounds::MAX_HEART_RATE_BPM,
            sample.value > bounds::MIN_HEART_RATE_BPM && sample.value <= bounds::MAX_HEART_RATE_BPM,
        ),
        Metric::Steps => (
            0.0,
            bounds::MAX_STEPS,
            sample.value >= 0.0 && sample.value <= bounds::MAX_STEPS,
        ),
    };

    if !in_range {
        return Err(ValidationError::OutOfRange {
            metric: sample.metric,
            value: sample.value,
            min,
            max,
        });
    }

    Ok(())
}

/// Check session parameters before a session is created.
pub fn validate_parameters(parameters: &SessionParameters) -> Result<(), ValidationError> {
    if !parameters.load_weight_kg.is_finite() || parameters.load_weight_kg < 0.0 {
        return Err(ValidationError::InvalidParameters(format!(
            "load weight {} kg",
            parameters.load_weight_kg
        )));
    }

    if !parameters.body_weight_kg.is_finite() || parameters.body_weight_kg <= 0.0 {
        return Err(ValidationError::InvalidParameters(format!(
            "body weight {} kg",
            parameters.body_weight_kg
        )));
    }

    Ok(())
}
