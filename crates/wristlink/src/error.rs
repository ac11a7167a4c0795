//! Error types for the controller.

use thiserror::Error;

use wristlink_core::SessionError;
use wristlink_sync::SyncError;

/// Errors returned by [`ControllerHandle`](crate::ControllerHandle) calls.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The request was processed and failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The controller task has stopped.
    #[error("controller stopped")]
    Stopped,
}

impl From<SessionError> for ControllerError {
    fn from(e: SessionError) -> Self {
        ControllerError::Sync(e.into())
    }
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
