//! Error types for the sync module.

use thiserror::Error;

use wristlink_core::{CoreError, SessionError, ValidationError};
use wristlink_store::StoreError;

/// Errors that can occur while synchronizing a session.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),

    /// The requested lifecycle change is not valid in the current state.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Parameters or samples failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The session backend or health store failed.
    #[error("backend error: {0}")]
    Backend(#[source] anyhow::Error),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// The outbox task has stopped.
    #[error("outbox closed")]
    OutboxClosed,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
