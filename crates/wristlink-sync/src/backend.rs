//! External collaborators: the session backend and the platform health store.
//!
//! Both are opaque; their failures travel as [`anyhow::Error`].

use async_trait::async_trait;

use wristlink_core::{SessionHandle, SessionParameters};

/// Fields merged into a session after the fact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    /// Distance the wearable recorded before the session existed.
    pub backfilled_distance_km: Option<f64>,
}

/// Durable session records.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Create a session and return its handle.
    async fn create_session(&self, parameters: &SessionParameters) -> anyhow::Result<SessionHandle>;

    /// Mark the session as started at `started_at_ms` (Unix millis).
    async fn start_session(&self, handle: &SessionHandle, started_at_ms: i64) -> anyhow::Result<()>;

    async fn patch_session(&self, handle: &SessionHandle, patch: &SessionPatch) -> anyhow::Result<()>;
}

/// Read access to the platform health store.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Walking/running distance recorded in `[from_ms, to_ms)`, in kilometres.
    async fn distance_km_between(&self, from_ms: i64, to_ms: i64) -> anyhow::Result<f64>;
}
