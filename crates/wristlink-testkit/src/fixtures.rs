//! Test fixtures and helpers.
//!
//! Fake collaborators plus a [`TestRig`] wiring them to a memory transport
//! pair, for driving a controller from the wearable side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rand::Rng;

use wristlink::{spawn, ControllerConfig, ControllerHandle, Dependencies};
use wristlink_core::{Command, CoreError, SessionHandle, SessionParameters, WireMessage};
use wristlink_store::{MemoryStore, Store};
use wristlink_sync::{HealthStore, MemoryLink, MemoryTransport, SessionBackend, SessionPatch, Transport};

/// A call made to [`FakeBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Create(SessionParameters),
    Start(SessionHandle),
    Patch(SessionHandle, SessionPatch),
}

/// Session backend that records calls and issues random handles.
#[derive(Default)]
pub struct FakeBackend {
    fail_create: AtomicBool,
    calls: Mutex<Vec<BackendCall>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make session creation fail until reset.
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of successful creations.
    pub fn created_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::Start(_)))
            .count()
    }

    pub fn patches(&self) -> Vec<SessionPatch> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Patch(_, patch) => Some(patch),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl SessionBackend for FakeBackend {
    async fn create_session(&self, parameters: &SessionParameters) -> anyhow::Result<SessionHandle> {
        self.record(BackendCall::Create(*parameters));
        if self.fail_create.load(Ordering::SeqCst) {
            anyhow::bail!("backend unavailable");
        }
        let id: u64 = rand::thread_rng().gen();
        Ok(SessionHandle::new(format!("session-{:016x}", id)))
    }

    async fn start_session(&self, handle: &SessionHandle, _started_at_ms: i64) -> anyhow::Result<()> {
        self.record(BackendCall::Start(handle.clone()));
        Ok(())
    }

    async fn patch_session(&self, handle: &SessionHandle, patch: &SessionPatch) -> anyhow::Result<()> {
        self.record(BackendCall::Patch(handle.clone(), patch.clone()));
        Ok(())
    }
}

/// Health store returning a fixed distance for any interval.
pub struct FakeHealthStore {
    distance_km: f64,
    queries: Mutex<Vec<(i64, i64)>>,
}

impl FakeHealthStore {
    pub fn new(distance_km: f64) -> Self {
        Self {
            distance_km,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Every `(from_ms, to_ms)` queried so far.
    pub fn queries(&self) -> Vec<(i64, i64)> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HealthStore for FakeHealthStore {
    async fn distance_km_between(&self, from_ms: i64, to_ms: i64) -> anyhow::Result<f64> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((from_ms, to_ms));
        Ok(self.distance_km)
    }
}

/// A phone/wearable link with fake collaborators.
pub struct TestRig {
    pub phone: Arc<MemoryTransport>,
    pub wearable: Arc<MemoryTransport>,
    pub backend: Arc<FakeBackend>,
    pub health: Arc<FakeHealthStore>,
    pub store: Arc<dyn Store>,
}

impl TestRig {
    /// A rig with an in-memory store and no recorded distance.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        let (phone, wearable) = MemoryLink::pair();
        Self {
            phone,
            wearable,
            backend: Arc::new(FakeBackend::new()),
            health: Arc::new(FakeHealthStore::new(0.0)),
            store,
        }
    }

    /// Replace the health store with one reporting `distance_km`.
    pub fn with_distance(mut self, distance_km: f64) -> Self {
        self.health = Arc::new(FakeHealthStore::new(distance_km));
        self
    }

    pub fn dependencies(&self) -> Dependencies {
        Dependencies {
            backend: self.backend.clone(),
            health: self.health.clone(),
            store: Arc::clone(&self.store),
        }
    }

    /// Spawn a controller on the phone side of the link.
    pub fn spawn(&self, config: ControllerConfig) -> wristlink::Result<ControllerHandle> {
        spawn(Arc::clone(&self.phone), self.dependencies(), config)
    }

    /// Send a command from the wearable to the phone.
    pub async fn wearable_says(&self, command: Command) -> wristlink_sync::Result<()> {
        self.wearable.send(wire(&command)?).await
    }

    /// Every command the phone has sent, decoded.
    pub fn sent_commands(&self) -> Vec<Command> {
        self.phone
            .sent()
            .iter()
            .filter_map(|message| message.decode().ok())
            .collect()
    }

    /// Names of every command the phone has sent.
    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent_commands().iter().map(Command::name).collect()
    }

    /// How many times the phone sent a command with this name.
    pub fn sent_count(&self, name: &str) -> usize {
        self.sent_names().iter().filter(|sent| **sent == name).count()
    }
}

impl Default for TestRig {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a command for the wire.
pub fn wire(command: &Command) -> Result<WireMessage, CoreError> {
    WireMessage::encode(command)
}

/// Route `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
