//! Settings syncer.
//!
//! Keeps the last-known session parameters (memory first, then the durable
//! store) and replays them to the wearable whenever it (re)connects, followed
//! by a full session resync.

use std::sync::Arc;

use tracing::{debug, warn};

use wristlink_core::{Command, SessionParameters, SessionSnapshot};
use wristlink_store::{Store, StoreExt};

use crate::error::Result;
use crate::outbox::Outbox;

pub struct SettingsSyncer {
    store: Arc<dyn Store>,
    cached: Option<SessionParameters>,
}

impl SettingsSyncer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cached: None,
        }
    }

    /// Record parameters as last-known and persist them.
    ///
    /// The in-memory copy is updated even if persisting fails.
    pub async fn remember(&mut self, parameters: SessionParameters) -> Result<()> {
        self.cached = Some(parameters);
        self.store.save_parameters(&parameters).await?;
        Ok(())
    }

    /// Last-known parameters, loading from the store on first use.
    pub async fn last_known(&mut self) -> Option<SessionParameters> {
        if self.cached.is_none() {
            match self.store.load_parameters().await {
                Ok(loaded) => self.cached = loaded,
                Err(e) => warn!(error = %e, "failed to load last parameters"),
            }
        }
        self.cached
    }

    /// Push `updateSettings` (if anything is known) and `syncSessionState`.
    ///
    /// Returns true if settings were sent.
    pub async fn push(&mut self, outbox: &Outbox, snapshot: &SessionSnapshot) -> bool {
        let sent = match self.last_known().await {
            Some(parameters) => {
                outbox.send(Command::UpdateSettings { parameters });
                true
            }
            None => {
                debug!("no parameters known yet, skipping updateSettings");
                false
            }
        };
        outbox.send(Command::sync_state(snapshot));
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryLink;
    use wristlink_store::MemoryStore;

    fn names(messages: &[wristlink_core::WireMessage]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|m| m.command_name().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_push_without_parameters_sends_only_state() {
        let (phone, _wearable) = MemoryLink::pair();
        let (outbox, _task) = Outbox::spawn(phone.clone());
        let mut syncer = SettingsSyncer::new(Arc::new(MemoryStore::new()));

        assert!(!syncer.push(&outbox, &SessionSnapshot::default()).await);
        outbox.flush().await.unwrap();
        assert_eq!(names(&phone.sent()), ["syncSessionState"]);
    }

    #[tokio::test]
    async fn test_push_loads_from_store() {
        let store = Arc::new(MemoryStore::new());
        let params = SessionParameters::metric(12.0, 70.0);
        store.save_parameters(&params).await.unwrap();

        let (phone, _wearable) = MemoryLink::pair();
        let (outbox, _task) = Outbox::spawn(phone.clone());
        let mut syncer = SettingsSyncer::new(store);

        assert!(syncer.push(&outbox, &SessionSnapshot::default()).await);
        outbox.flush().await.unwrap();

        let sent = phone.sent();
        assert_eq!(names(&sent), ["updateSettings", "syncSessionState"]);
        assert_eq!(
            sent[0].decode().unwrap(),
            Command::UpdateSettings { parameters: params }
        );
    }

    #[tokio::test]
    async fn test_remember_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut syncer = SettingsSyncer::new(store.clone());
        let params = SessionParameters::metric(5.0, 90.0);

        syncer.remember(params).await.unwrap();
        assert_eq!(store.load_parameters().await.unwrap(), Some(params));
    }
}
