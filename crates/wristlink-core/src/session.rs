//! Session: the authoritative lifecycle state of one workout.
//!
//! [`SessionCore`] holds the pure state and its transitions. It performs no
//! I/O; callers turn the returned [`Transition`]s into envelopes and events.
//!
//! ```text
//! Inactive --begin--> Active --pause--> Paused --resume--> Active --complete--> Inactive
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::types::{SessionHandle, SessionParameters};

/// Lifecycle state of the tracked session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Inactive,
    Active,
    Paused,
}

/// A state change that callers must publish downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Started {
        handle: SessionHandle,
        parameters: SessionParameters,
    },
    Paused {
        handle: SessionHandle,
    },
    Resumed {
        handle: SessionHandle,
    },
    Completed {
        handle: SessionHandle,
        parameters: SessionParameters,
    },
}

/// A point-in-time view of the session, as pushed in a full resync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<SessionHandle>,
    pub parameters: Option<SessionParameters>,
}

/// Pure session state.
///
/// Invariant: `handle` and `parameters` are `Some` exactly when `state` is
/// not [`SessionState::Inactive`].
#[derive(Debug, Clone, Default)]
pub struct SessionCore {
    state: SessionState,
    handle: Option<SessionHandle>,
    parameters: Option<SessionParameters>,
    started_at_ms: Option<i64>,
}

impl SessionCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    pub fn parameters(&self) -> Option<&SessionParameters> {
        self.parameters.as_ref()
    }

    /// Unix millis at which the handle was confirmed.
    pub fn started_at_ms(&self) -> Option<i64> {
        self.started_at_ms
    }

    /// Whether a session exists (active or paused).
    pub fn is_tracking(&self) -> bool {
        self.state != SessionState::Inactive
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            session_id: self.handle.clone(),
            parameters: self.parameters,
        }
    }

    /// Enter `Active` with a confirmed handle.
    pub fn begin(
        &mut self,
        handle: SessionHandle,
        parameters: SessionParameters,
        now_ms: i64,
    ) -> Result<Transition, SessionError> {
        if let Some(existing) = &self.handle {
            return Err(SessionError::AlreadyActive(existing.clone()));
        }

        self.state = SessionState::Active;
        self.handle = Some(handle.clone());
        self.parameters = Some(parameters);
        self.started_at_ms = Some(now_ms);

        Ok(Transition::Started { handle, parameters })
    }

    /// Pause the session.
    ///
    /// Returns `Ok(None)` if already paused.
    pub fn pause(&mut self) -> Result<Option<Transition>, SessionError> {
        let handle = self.handle.clone().ok_or(SessionError::NoActiveSession)?;
        match self.state {
            SessionState::Paused => Ok(None),
            _ => {
                self.state = SessionState::Paused;
                Ok(Some(Transition::Paused { handle }))
            }
        }
    }

    /// Resume the session.
    ///
    /// Returns `Ok(None)` if already active.
    pub fn resume(&mut self) -> Result<Option<Transition>, SessionError> {
        let handle = self.handle.clone().ok_or(SessionError::NoActiveSession)?;
        match self.state {
            SessionState::Active => Ok(None),
            _ => {
                self.state = SessionState::Active;
                Ok(Some(Transition::Resumed { handle }))
            }
        }
    }

    /// Return to `Inactive`, clearing the handle.
    ///
    /// Returns `None` if there was nothing to complete.
    pub fn complete(&mut self) -> Option<Transition> {
        let handle = self.handle.take()?;
        let parameters = self.parameters.take()?;
        self.state = SessionState::Inactive;
        self.started_at_ms = None;
        Some(Transition::Completed { handle, parameters })
    }
}
