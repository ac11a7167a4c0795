//! Store trait: the abstract interface for Wristlink persistence.
//!
//! Two things outlive a session: the last parameters the user chose (pushed
//! to the wearable on connect) and the retained heart-rate samples of each
//! session. Implementations include SQLite (primary) and in-memory (tests).

use async_trait::async_trait;
use wristlink_core::{HeartRateSummary, SensorSample, SessionHandle, SessionParameters};

use crate::error::{Result, StoreError};

/// Well-known keys in the key/value table.
pub mod keys {
    /// CBOR-encoded [`SessionParameters`](wristlink_core::SessionParameters).
    pub const LAST_PARAMETERS: &str = "settings.last_parameters";
}

/// The Store trait: async interface for persistence.
///
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the runtime.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Key/Value
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a raw value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a raw value, replacing any previous one.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Heart-rate samples
    // ─────────────────────────────────────────────────────────────────────────

    /// Append heart-rate samples to a session.
    ///
    /// Idempotent per `(session, timestamp)`: a sample already stored at the
    /// same timestamp is skipped. Returns how many samples were new.
    async fn append_heart_rate(
        &self,
        session: &SessionHandle,
        samples: &[SensorSample],
    ) -> Result<usize>;

    /// All heart-rate samples of a session, ordered by timestamp.
    async fn heart_rate_samples(&self, session: &SessionHandle) -> Result<Vec<SensorSample>>;
}

/// Extension trait for typed access on top of [`Store`].
pub trait StoreExt: Store {
    /// Load the last-used session parameters.
    fn load_parameters(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<SessionParameters>>> + Send;

    /// Persist the last-used session parameters.
    fn save_parameters(
        &self,
        parameters: &SessionParameters,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Summary of the stored heart-rate samples of a session.
    fn heart_rate_summary(
        &self,
        session: &SessionHandle,
    ) -> impl std::future::Future<Output = Result<Option<HeartRateSummary>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn load_parameters(&self) -> Result<Option<SessionParameters>> {
        match self.get(keys::LAST_PARAMETERS).await? {
            Some(bytes) => ciborium::from_reader(bytes.as_slice())
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn save_parameters(&self, parameters: &SessionParameters) -> Result<()> {
        let mut buf = Vec::new();
        ciborium::into_writer(parameters, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put(keys::LAST_PARAMETERS, &buf).await
    }

    async fn heart_rate_summary(&self, session: &SessionHandle) -> Result<Option<HeartRateSummary>> {
        let samples = self.heart_rate_samples(session).await?;
        Ok(HeartRateSummary::from_samples(&samples))
    }
}
