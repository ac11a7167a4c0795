//! Error types for the Wristlink core.

use thiserror::Error;

use crate::types::{Metric, SessionHandle};

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("wire message has no command field")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("malformed {command} payload: {reason}")]
    Malformed { command: String, reason: String },

    #[error("encoding error: {0}")]
    EncodingError(String),
}

/// Errors raised by session lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no active session")]
    NoActiveSession,

    #[error("session {0} is already active")]
    AlreadyActive(SessionHandle),

    #[error("only the phone may start a session")]
    StartNotPermitted,
}

/// Validation errors for sensor samples and session parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0:?} sample is not a finite number")]
    NotFinite(Metric),

    #[error("{metric:?} sample {value} outside [{min}, {max}]")]
    OutOfRange {
        metric: Metric,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid session parameters: {0}")]
    InvalidParameters(String),
}
