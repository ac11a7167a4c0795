//! Commands exchanged between phone and wearable.
//!
//! Each command is one variant of a closed enum carrying only its typed
//! fields. On the wire a command is a flat map whose `command` key holds the
//! camelCase variant name (see [`crate::wire`]).

use serde::{Deserialize, Serialize};

use crate::session::{SessionSnapshot, SessionState};
use crate::types::{Metric, SessionHandle, SessionMetrics, SessionParameters, Side};

/// Wire names of every command this crate understands.
pub const COMMAND_NAMES: &[&str] = &[
    "workoutStarted",
    "setSessionId",
    "pauseSession",
    "pauseConfirmed",
    "resumeSession",
    "resumeConfirmed",
    "sessionEnded",
    "workoutStopped",
    "endSession",
    "updateMetrics",
    "watchHeartRateUpdate",
    "watchStepUpdate",
    "syncSessionState",
    "updateSettings",
    "ping",
    "pingResponse",
    "startSessionFromWatch",
    "startMonitoring",
    "sensorStatus",
    "error",
];

/// Session protocol commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// Phone announces a durably created session.
    WorkoutStarted {
        session_id: SessionHandle,
        parameters: SessionParameters,
    },

    /// Phone tells the wearable which handle to tag its data with.
    SetSessionId { session_id: SessionHandle },

    PauseSession,
    PauseConfirmed,
    ResumeSession,
    ResumeConfirmed,

    /// Session terminators. Several names exist for the same intent because
    /// wearable builds differ in which one they listen for.
    SessionEnded,
    WorkoutStopped,
    EndSession,

    /// Phone pushes live figures for the wearable display.
    UpdateMetrics { metrics: SessionMetrics },

    /// Wearable reports a heart-rate reading.
    WatchHeartRateUpdate {
        bpm: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<i64>,
    },

    /// Wearable reports the cumulative step count.
    WatchStepUpdate {
        steps: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<i64>,
    },

    /// Full session view, pushed by the phone to correct drift.
    SyncSessionState {
        state: SessionState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionHandle>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters: Option<SessionParameters>,
    },

    /// Last known session parameters, pushed on connect.
    UpdateSettings { parameters: SessionParameters },

    Ping,
    PingResponse,

    /// Wearable asks to create a session. Always rejected.
    StartSessionFromWatch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at_ms: Option<i64>,
    },

    /// Phone asks the wearable to (re)start streaming a metric.
    StartMonitoring { metric: Metric },

    /// Wearable reports whether it may read a sensor.
    SensorStatus {
        metric: Metric,
        authorized: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Explicit rejection or failure notice.
    Error { code: ErrorCode, message: String },
}

impl Command {
    /// The wire name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::WorkoutStarted { .. } => "workoutStarted",
            Command::SetSessionId { .. } => "setSessionId",
            Command::PauseSession => "pauseSession",
            Command::PauseConfirmed => "pauseConfirmed",
            Command::ResumeSession => "resumeSession",
            Command::ResumeConfirmed => "resumeConfirmed",
            Command::SessionEnded => "sessionEnded",
            Command::WorkoutStopped => "workoutStopped",
            Command::EndSession => "endSession",
            Command::UpdateMetrics { .. } => "updateMetrics",
            Command::WatchHeartRateUpdate { .. } => "watchHeartRateUpdate",
            Command::WatchStepUpdate { .. } => "watchStepUpdate",
            Command::SyncSessionState { .. } => "syncSessionState",
            Command::UpdateSettings { .. } => "updateSettings",
            Command::Ping => "ping",
            Command::PingResponse => "pingResponse",
            Command::StartSessionFromWatch { .. } => "startSessionFromWatch",
            Command::StartMonitoring { .. } => "startMonitoring",
            Command::SensorStatus { .. } => "sensorStatus",
            Command::Error { .. } => "error",
        }
    }

    /// Whether this command ends the session.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Command::SessionEnded | Command::WorkoutStopped | Command::EndSession
        )
    }

    /// Build a full-resync command from a snapshot.
    pub fn sync_state(snapshot: &SessionSnapshot) -> Self {
        Command::SyncSessionState {
            state: snapshot.state,
            session_id: snapshot.session_id.clone(),
            parameters: snapshot.parameters,
        }
    }
}

/// The session terminator names a build may listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Terminator {
    SessionEnded,
    WorkoutStopped,
    EndSession,
}

impl Terminator {
    /// Every known terminator, in the order they are sent by default.
    pub const ALL: [Terminator; 3] = [
        Terminator::SessionEnded,
        Terminator::WorkoutStopped,
        Terminator::EndSession,
    ];

    pub fn command(self) -> Command {
        match self {
            Terminator::SessionEnded => Command::SessionEnded,
            Terminator::WorkoutStopped => Command::WorkoutStopped,
            Terminator::EndSession => Command::EndSession,
        }
    }
}

/// Error codes carried in [`Command::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// Unknown/unspecified error.
    Unknown,
    /// The wearable tried to create a session.
    StartNotPermitted,
    /// A lifecycle command arrived with no session to apply it to.
    NoActiveSession,
    /// The payload could not be decoded.
    InvalidMessage,
}

/// A command together with the side that sent it.
///
/// The origin is never on the wire; it is implied by channel direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub origin: Side,
    pub command: Command,
}

impl Envelope {
    pub fn from_phone(command: Command) -> Self {
        Self {
            origin: Side::Phone,
            command,
        }
    }

    pub fn from_wearable(command: Command) -> Self {
        Self {
            origin: Side::Wearable,
            command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_cover_vocabulary() {
        let samples = [
            Command::PauseSession,
            Command::Ping,
            Command::StartMonitoring { metric: Metric::Steps },
            Command::Error {
                code: ErrorCode::StartNotPermitted,
                message: String::new(),
            },
        ];
        for command in samples {
            assert!(COMMAND_NAMES.contains(&command.name()));
        }
    }

    #[test]
    fn test_terminators() {
        for terminator in Terminator::ALL {
            assert!(terminator.command().is_terminator());
        }
        assert!(!Command::PauseSession.is_terminator());
    }

    #[test]
    fn test_sync_state_from_snapshot() {
        let snapshot = SessionSnapshot {
            state: SessionState::Paused,
            session_id: Some(SessionHandle::new("s1")),
            parameters: Some(SessionParameters::metric(10.0, 70.0)),
        };
        match Command::sync_state(&snapshot) {
            Command::SyncSessionState {
                state,
                session_id,
                parameters,
            } => {
                assert_eq!(state, SessionState::Paused);
                assert_eq!(session_id, snapshot.session_id);
                assert_eq!(parameters, snapshot.parameters);
            }
            other => panic!("expected SyncSessionState, got {:?}", other),
        }
    }
}
