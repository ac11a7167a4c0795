//! Command router.
//!
//! Classifies each inbound envelope into what the session machine should do
//! with it. Routing is pure and total: anything unexpected is
//! [`Route::Ignored`], never an error. The phone is authoritative for session
//! existence and parameters, so wearable copies of those commands are only
//! ever used to detect drift.

use tracing::{debug, warn};

use wristlink_core::{
    Command, Envelope, Metric, SensorSample, SessionHandle, SessionParameters, SessionState, Side,
    WireMessage,
};

/// A lifecycle change requested by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRequest {
    Pause,
    Resume,
    End,
}

/// What the wearable believes about the session.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerView {
    /// `None` when the command does not carry a state.
    pub state: Option<SessionState>,
    pub session_id: Option<SessionHandle>,
    /// `None` when the command does not carry parameters.
    pub parameters: Option<SessionParameters>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Lifecycle(LifecycleRequest),
    Sample(SensorSample),
    SensorStatus {
        metric: Metric,
        authorized: bool,
        message: Option<String>,
    },
    Reconcile(PeerView),
    RejectStart {
        started_at_ms: Option<i64>,
    },
    Liveness,
    Acknowledged(&'static str),
    Ignored {
        command: &'static str,
        reason: &'static str,
    },
}

/// Decode an inbound message, logging and discarding anything undecodable.
pub fn decode_inbound(message: &WireMessage) -> Option<Envelope> {
    match message.decode() {
        Ok(command) => Some(Envelope::from_wearable(command)),
        Err(e) => {
            warn!(command = ?message.command_name(), error = %e, "ignoring undecodable message");
            None
        }
    }
}

/// Classify an envelope. Samples without a timestamp get `received_at_ms`.
pub fn route(envelope: &Envelope, received_at_ms: i64) -> Route {
    let command = &envelope.command;

    if envelope.origin == Side::Phone {
        return Route::Ignored {
            command: command.name(),
            reason: "originated locally",
        };
    }

    match command {
        Command::PauseSession => Route::Lifecycle(LifecycleRequest::Pause),
        Command::ResumeSession => Route::Lifecycle(LifecycleRequest::Resume),
        Command::SessionEnded | Command::WorkoutStopped | Command::EndSession => {
            Route::Lifecycle(LifecycleRequest::End)
        }

        Command::WatchHeartRateUpdate { bpm, timestamp_ms } => Route::Sample(
            SensorSample::heart_rate(*bpm, timestamp_ms.unwrap_or(received_at_ms)),
        ),
        Command::WatchStepUpdate { steps, timestamp_ms } => Route::Sample(SensorSample::steps(
            *steps,
            timestamp_ms.unwrap_or(received_at_ms),
        )),

        Command::SensorStatus {
            metric,
            authorized,
            message,
        } => Route::SensorStatus {
            metric: *metric,
            authorized: *authorized,
            message: message.clone(),
        },

        Command::SyncSessionState {
            state,
            session_id,
            parameters,
        } => Route::Reconcile(PeerView {
            state: Some(*state),
            session_id: session_id.clone(),
            parameters: *parameters,
        }),
        Command::SetSessionId { session_id } => Route::Reconcile(PeerView {
            state: None,
            session_id: Some(session_id.clone()),
            parameters: None,
        }),
        Command::WorkoutStarted {
            session_id,
            parameters,
        } => Route::Reconcile(PeerView {
            state: None,
            session_id: Some(session_id.clone()),
            parameters: Some(*parameters),
        }),

        Command::StartSessionFromWatch { started_at_ms } => Route::RejectStart {
            started_at_ms: *started_at_ms,
        },

        Command::Ping => Route::Liveness,

        Command::PauseConfirmed | Command::ResumeConfirmed | Command::PingResponse => {
            debug!(command = command.name(), "peer acknowledged");
            Route::Acknowledged(command.name())
        }
        Command::Error { code, message } => {
            warn!(?code, %message, "peer reported error");
            Route::Acknowledged(command.name())
        }

        Command::UpdateMetrics { .. }
        | Command::UpdateSettings { .. }
        | Command::StartMonitoring { .. } => Route::Ignored {
            command: command.name(),
            reason: "phone-authoritative",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wristlink_core::{ErrorCode, SessionParameters};

    fn from_wearable(command: Command) -> Route {
        route(&Envelope::from_wearable(command), 5_000)
    }

    #[test]
    fn test_all_terminators_end_the_session() {
        for command in [Command::SessionEnded, Command::WorkoutStopped, Command::EndSession] {
            assert_eq!(from_wearable(command), Route::Lifecycle(LifecycleRequest::End));
        }
    }

    #[test]
    fn test_sample_timestamp_defaults_to_receipt_time() {
        assert_eq!(
            from_wearable(Command::WatchHeartRateUpdate {
                bpm: 80.0,
                timestamp_ms: None
            }),
            Route::Sample(SensorSample::heart_rate(80.0, 5_000))
        );
        assert_eq!(
            from_wearable(Command::WatchStepUpdate {
                steps: 42.0,
                timestamp_ms: Some(1_234)
            }),
            Route::Sample(SensorSample::steps(42.0, 1_234))
        );
    }

    #[test]
    fn test_start_from_watch_rejected() {
        assert_eq!(
            from_wearable(Command::StartSessionFromWatch {
                started_at_ms: Some(10)
            }),
            Route::RejectStart {
                started_at_ms: Some(10)
            }
        );
    }

    #[test]
    fn test_phone_authoritative_commands_ignored() {
        let route = from_wearable(Command::UpdateSettings {
            parameters: SessionParameters::metric(1.0, 60.0),
        });
        assert!(matches!(route, Route::Ignored { reason: "phone-authoritative", .. }));
    }

    #[test]
    fn test_echoes_reconcile() {
        let route = from_wearable(Command::SetSessionId {
            session_id: SessionHandle::new("s9"),
        });
        assert_eq!(
            route,
            Route::Reconcile(PeerView {
                state: None,
                session_id: Some(SessionHandle::new("s9")),
                parameters: None,
            })
        );
    }

    #[test]
    fn test_echoes_carry_parameters() {
        let parameters = SessionParameters::metric(15.0, 72.0);
        let started = from_wearable(Command::WorkoutStarted {
            session_id: SessionHandle::new("s9"),
            parameters,
        });
        let Route::Reconcile(view) = started else {
            panic!("expected reconcile, got {:?}", started);
        };
        assert_eq!(view.parameters, Some(parameters));

        let synced = from_wearable(Command::SyncSessionState {
            state: SessionState::Active,
            session_id: Some(SessionHandle::new("s9")),
            parameters: Some(parameters),
        });
        assert_eq!(
            synced,
            Route::Reconcile(PeerView {
                state: Some(SessionState::Active),
                session_id: Some(SessionHandle::new("s9")),
                parameters: Some(parameters),
            })
        );
    }

    #[test]
    fn test_acknowledgements() {
        assert_eq!(from_wearable(Command::PingResponse), Route::Acknowledged("pingResponse"));
        assert_eq!(
            from_wearable(Command::Error {
                code: ErrorCode::Unknown,
                message: "sensor busy".into()
            }),
            Route::Acknowledged("error")
        );
    }

    #[test]
    fn test_local_origin_ignored() {
        assert!(matches!(
            route(&Envelope::from_phone(Command::PauseSession), 0),
            Route::Ignored { reason: "originated locally", .. }
        ));
    }

    #[test]
    fn test_decode_inbound_discards_garbage() {
        let unknown = match json!({"command": "selfDestruct"}) {
            serde_json::Value::Object(map) => WireMessage::from_map(map),
            _ => unreachable!(),
        };
        assert!(decode_inbound(&unknown).is_none());

        let ping = WireMessage::encode(&Command::Ping).unwrap();
        assert_eq!(
            decode_inbound(&ping),
            Some(Envelope::from_wearable(Command::Ping))
        );
    }
}
