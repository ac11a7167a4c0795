//! Strong type definitions for Wristlink.
//!
//! Identifiers are newtypes; measurements carry their metric so a step count
//! can never be mistaken for a heart rate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a durably created session, as issued by the backend.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Wrap a backend-issued session id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionHandle({})", self.0)
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which end of the link a command originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Phone,
    Wearable,
}

impl Side {
    /// The other end of the link.
    pub const fn peer(self) -> Self {
        match self {
            Side::Phone => Side::Wearable,
            Side::Wearable => Side::Phone,
        }
    }
}

/// Display unit system chosen by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

/// Snapshot of session parameters captured at start.
///
/// Replayed to the wearable whenever it (re)connects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParameters {
    /// Carried load in kilograms.
    pub load_weight_kg: f64,
    /// User body weight in kilograms.
    pub body_weight_kg: f64,
    /// Units the wearable should display.
    pub unit_system: UnitSystem,
}

impl SessionParameters {
    /// Parameters in the metric unit system.
    pub fn metric(load_weight_kg: f64, body_weight_kg: f64) -> Self {
        Self {
            load_weight_kg,
            body_weight_kg,
            unit_system: UnitSystem::Metric,
        }
    }
}

/// The kind of live sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    HeartRate,
    Steps,
}

/// One reading from a wearable sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSample {
    pub metric: Metric,
    pub value: f64,
    /// UTC Unix milliseconds.
    pub timestamp_ms: i64,
}

impl SensorSample {
    pub fn heart_rate(bpm: f64, timestamp_ms: i64) -> Self {
        Self {
            metric: Metric::HeartRate,
            value: bpm,
            timestamp_ms,
        }
    }

    pub fn steps(count: f64, timestamp_ms: i64) -> Self {
        Self {
            metric: Metric::Steps,
            value: count,
            timestamp_ms,
        }
    }
}

/// Live workout figures relayed to the wearable display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub distance_km: f64,
    pub duration_s: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace_min_per_km: Option<f64>,
    pub calories: f64,
    pub elevation_gain_m: f64,
    pub elevation_loss_m: f64,
    pub is_paused: bool,
    pub unit_system: UnitSystem,
}

/// Aggregate of the heart-rate samples recorded for one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateSummary {
    pub count: usize,
    pub avg_bpm: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl HeartRateSummary {
    /// Summarize heart-rate samples; other metrics are ignored.
    ///
    /// Returns `None` if there is no heart-rate sample.
    pub fn from_samples(samples: &[SensorSample]) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for sample in samples.iter().filter(|s| s.metric == Metric::HeartRate) {
            count += 1;
            sum += sample.value;
            min = min.min(sample.value);
            max = max.max(sample.value);
        }

        if count == 0 {
            return None;
        }

        Some(Self {
            count,
            avg_bpm: sum / count as f64,
            min_bpm: min,
            max_bpm: max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_handle_display() {
        let handle = SessionHandle::new("abc-123");
        assert_eq!(handle.to_string(), "abc-123");
        assert_eq!(format!("{:?}", handle), "SessionHandle(abc-123)");
    }

    #[test]
    fn test_side_peer() {
        assert_eq!(Side::Phone.peer(), Side::Wearable);
        assert_eq!(Side::Wearable.peer(), Side::Phone);
    }

    #[test]
    fn test_heart_rate_summary() {
        let samples = vec![
            SensorSample::heart_rate(70.0, 0),
            SensorSample::steps(1000.0, 500),
            SensorSample::heart_rate(90.0, 1000),
            SensorSample::heart_rate(110.0, 2000),
        ];

        let summary = HeartRateSummary::from_samples(&samples).unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.avg_bpm, 90.0);
        assert_eq!(summary.min_bpm, 70.0);
        assert_eq!(summary.max_bpm, 110.0);
    }

    #[test]
    fn test_heart_rate_summary_empty() {
        assert!(HeartRateSummary::from_samples(&[]).is_none());
        assert!(HeartRateSummary::from_samples(&[SensorSample::steps(10.0, 0)]).is_none());
    }
}
