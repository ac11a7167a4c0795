//! Golden wire vectors.
//!
//! Each vector pairs the JSON a wearable build sends or expects with the
//! typed command it must decode to. Both directions are checked: decoding
//! the JSON yields the command, and encoding the command yields the same
//! JSON object (key order aside).

use serde_json::Value;

use wristlink_core::{
    Command, ErrorCode, Metric, SessionHandle, SessionMetrics, SessionParameters, SessionState,
    UnitSystem, WireMessage,
};

/// A golden wire vector.
#[derive(Debug, Clone)]
pub struct WireVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// The message as a JSON object.
    pub json: &'static str,
    /// Builds the expected command.
    pub command: fn() -> Command,
}

fn parameters() -> SessionParameters {
    SessionParameters::metric(20.0, 80.0)
}

/// Get all golden wire vectors.
pub fn all_vectors() -> Vec<WireVector> {
    vec![
        WireVector {
            name: "workoutStarted with metric parameters",
            json: r#"{"command":"workoutStarted","sessionId":"s-1","parameters":{"loadWeightKg":20.0,"bodyWeightKg":80.0,"unitSystem":"metric"}}"#,
            command: || Command::WorkoutStarted {
                session_id: SessionHandle::new("s-1"),
                parameters: parameters(),
            },
        },
        WireVector {
            name: "setSessionId",
            json: r#"{"command":"setSessionId","sessionId":"s-1"}"#,
            command: || Command::SetSessionId {
                session_id: SessionHandle::new("s-1"),
            },
        },
        WireVector {
            name: "pauseSession",
            json: r#"{"command":"pauseSession"}"#,
            command: || Command::PauseSession,
        },
        WireVector {
            name: "resumeConfirmed",
            json: r#"{"command":"resumeConfirmed"}"#,
            command: || Command::ResumeConfirmed,
        },
        WireVector {
            name: "workoutStopped",
            json: r#"{"command":"workoutStopped"}"#,
            command: || Command::WorkoutStopped,
        },
        WireVector {
            name: "heart rate with timestamp",
            json: r#"{"command":"watchHeartRateUpdate","bpm":72.0,"timestampMs":1700000000000}"#,
            command: || Command::WatchHeartRateUpdate {
                bpm: 72.0,
                timestamp_ms: Some(1_700_000_000_000),
            },
        },
        WireVector {
            name: "heart rate without timestamp",
            json: r#"{"command":"watchHeartRateUpdate","bpm":95.5}"#,
            command: || Command::WatchHeartRateUpdate {
                bpm: 95.5,
                timestamp_ms: None,
            },
        },
        WireVector {
            name: "step update",
            json: r#"{"command":"watchStepUpdate","steps":1204.0}"#,
            command: || Command::WatchStepUpdate {
                steps: 1204.0,
                timestamp_ms: None,
            },
        },
        WireVector {
            name: "updateMetrics in imperial",
            json: r#"{"command":"updateMetrics","metrics":{"distanceKm":3.25,"durationS":1260,"paceMinPerKm":6.5,"calories":410.0,"elevationGainM":42.0,"elevationLossM":38.5,"isPaused":false,"unitSystem":"imperial"}}"#,
            command: || Command::UpdateMetrics {
                metrics: SessionMetrics {
                    distance_km: 3.25,
                    duration_s: 1260,
                    pace_min_per_km: Some(6.5),
                    calories: 410.0,
                    elevation_gain_m: 42.0,
                    elevation_loss_m: 38.5,
                    is_paused: false,
                    unit_system: UnitSystem::Imperial,
                },
            },
        },
        WireVector {
            name: "syncSessionState while paused",
            json: r#"{"command":"syncSessionState","state":"paused","sessionId":"s-1","parameters":{"loadWeightKg":20.0,"bodyWeightKg":80.0,"unitSystem":"metric"}}"#,
            command: || Command::SyncSessionState {
                state: SessionState::Paused,
                session_id: Some(SessionHandle::new("s-1")),
                parameters: Some(parameters()),
            },
        },
        WireVector {
            name: "syncSessionState with no session",
            json: r#"{"command":"syncSessionState","state":"inactive"}"#,
            command: || Command::SyncSessionState {
                state: SessionState::Inactive,
                session_id: None,
                parameters: None,
            },
        },
        WireVector {
            name: "ping",
            json: r#"{"command":"ping"}"#,
            command: || Command::Ping,
        },
        WireVector {
            name: "startSessionFromWatch with start time",
            json: r#"{"command":"startSessionFromWatch","startedAtMs":1699999910000}"#,
            command: || Command::StartSessionFromWatch {
                started_at_ms: Some(1_699_999_910_000),
            },
        },
        WireVector {
            name: "startMonitoring heart rate",
            json: r#"{"command":"startMonitoring","metric":"heartRate"}"#,
            command: || Command::StartMonitoring {
                metric: Metric::HeartRate,
            },
        },
        WireVector {
            name: "sensorStatus denied",
            json: r#"{"command":"sensorStatus","metric":"steps","authorized":false,"message":"motion access denied"}"#,
            command: || Command::SensorStatus {
                metric: Metric::Steps,
                authorized: false,
                message: Some(String::from("motion access denied")),
            },
        },
        WireVector {
            name: "error start not permitted",
            json: r#"{"command":"error","code":"startNotPermitted","message":"sessions start on the phone"}"#,
            command: || Command::Error {
                code: ErrorCode::StartNotPermitted,
                message: String::from("sessions start on the phone"),
            },
        },
    ]
}

/// Check one vector in both directions.
///
/// Returns a description of the first mismatch.
pub fn verify_vector(vector: &WireVector) -> Result<(), String> {
    let expected = (vector.command)();

    let message = WireMessage::from_json(vector.json).map_err(|e| e.to_string())?;
    let decoded = message.decode().map_err(|e| e.to_string())?;
    if decoded != expected {
        return Err(format!("decoded {:?}, expected {:?}", decoded, expected));
    }

    let encoded = WireMessage::encode(&expected).map_err(|e| e.to_string())?;
    let parsed: Value = serde_json::from_str(vector.json).map_err(|e| e.to_string())?;
    let encoded = Value::Object(encoded.into_map());
    if encoded != parsed {
        return Err(format!("encoded {}, expected {}", encoded, parsed));
    }

    Ok(())
}

/// Verify every golden vector.
///
/// Returns `(name, passed, detail)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| match verify_vector(v) {
            Ok(()) => (v.name.to_string(), true, String::new()),
            Err(detail) => (v.name.to_string(), false, detail),
        })
        .collect()
}
