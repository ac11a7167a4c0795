//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use wristlink_core::{SensorSample, SessionHandle};

use crate::error::{Result, StoreError};
use crate::traits::Store;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    values: HashMap<String, Vec<u8>>,

    /// Session -> timestamp -> bpm.
    heart_rate: HashMap<SessionHandle, BTreeMap<i64, f64>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Poisoned(e.to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn append_heart_rate(
        &self,
        session: &SessionHandle,
        samples: &[SensorSample],
    ) -> Result<usize> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let series = inner.heart_rate.entry(session.clone()).or_default();

        let mut inserted = 0;
        for sample in samples {
            if !series.contains_key(&sample.timestamp_ms) {
                series.insert(sample.timestamp_ms, sample.value);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn heart_rate_samples(&self, session: &SessionHandle) -> Result<Vec<SensorSample>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .heart_rate
            .get(session)
            .map(|series| {
                series
                    .iter()
                    .map(|(ts, bpm)| SensorSample::heart_rate(*bpm, *ts))
                    .collect()
            })
            .unwrap_or_default())
    }
}
