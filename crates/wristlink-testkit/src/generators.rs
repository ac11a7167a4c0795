//! Proptest generators for property-based testing.

use proptest::prelude::*;

use wristlink_core::{validation::bounds, SensorSample, SessionParameters, Side, UnitSystem};

/// Generate a side.
pub fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Phone), Just(Side::Wearable)]
}

/// A pause or resume request, tagged with where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Pause(Side),
    Resume(Side),
}

impl LifecycleOp {
    pub fn origin(self) -> Side {
        match self {
            LifecycleOp::Pause(side) | LifecycleOp::Resume(side) => side,
        }
    }
}

/// Generate a single lifecycle operation.
pub fn lifecycle_op() -> impl Strategy<Value = LifecycleOp> {
    (any::<bool>(), side()).prop_map(|(pause, side)| {
        if pause {
            LifecycleOp::Pause(side)
        } else {
            LifecycleOp::Resume(side)
        }
    })
}

/// Generate a sequence of up to `max_len` lifecycle operations.
pub fn lifecycle_ops(max_len: usize) -> impl Strategy<Value = Vec<LifecycleOp>> {
    prop::collection::vec(lifecycle_op(), 0..=max_len)
}

/// Generate a plausible heart rate.
pub fn heart_rate_bpm() -> impl Strategy<Value = f64> {
    40.0f64..=bounds::MAX_HEART_RATE_BPM
}

/// Generate heart-rate samples with strictly increasing timestamps.
///
/// Gaps range from one second to two minutes.
pub fn heart_rate_stream(max_len: usize) -> impl Strategy<Value = Vec<SensorSample>> {
    prop::collection::vec((heart_rate_bpm(), 1_000i64..=120_000), 1..=max_len).prop_map(|steps| {
        let mut timestamp_ms = 1_700_000_000_000i64;
        steps
            .into_iter()
            .map(|(bpm, gap)| {
                timestamp_ms += gap;
                SensorSample::heart_rate(bpm, timestamp_ms)
            })
            .collect()
    })
}

/// Generate valid session parameters.
pub fn session_parameters() -> impl Strategy<Value = SessionParameters> {
    (
        0.0f64..=60.0,
        30.0f64..=200.0,
        prop_oneof![Just(UnitSystem::Metric), Just(UnitSystem::Imperial)],
    )
        .prop_map(|(load_weight_kg, body_weight_kg, unit_system)| SessionParameters {
            load_weight_kg,
            body_weight_kg,
            unit_system,
        })
}
