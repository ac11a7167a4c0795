//! Session machine: applies lifecycle changes and inbound commands.
//!
//! [`SessionMachine`] owns the pure [`SessionCore`] plus every effect around
//! it: backend calls, persistence, outgoing commands, sensor feeds and
//! lifecycle events. It is meant to be owned by a single task; nothing in it
//! is shared or locked.
//!
//! ## Completion order
//!
//! 1. State goes to `Inactive` and the handle is cleared.
//! 2. Retained heart-rate samples are flushed to the store (retried on later
//!    ticks if that fails).
//! 3. Watchdogs stop.
//! 4. The terminator is sent under every configured name.
//! 5. Backfilled distance, if any, is patched into the session.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use wristlink_core::{
    validate_parameters, Command, ErrorCode, HeartRateSummary, Metric, SensorSample, SessionCore,
    SessionError, SessionHandle, SessionMetrics, SessionParameters, SessionSnapshot, Side,
    Terminator, Transition, WireMessage,
};
use wristlink_store::{Store, StoreExt};

use crate::backend::{HealthStore, SessionBackend, SessionPatch};
use crate::error::{Result, SyncError};
use crate::feed::{WatchdogConfig, WatchedFeed};
use crate::heart_rate::{HeartRateManager, RetentionPolicy};
use crate::outbox::Outbox;
use crate::router::{self, LifecycleRequest, PeerView, Route};
use crate::settings::SettingsSyncer;
use crate::steps::StepsManager;

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Names the terminator is sent under. Wearable builds differ in which
    /// one they listen for.
    pub terminators: Vec<Terminator>,
    /// Longest wearable head start that is still backfilled.
    pub backfill_max_lead: Duration,
    pub heart_rate_watchdog: WatchdogConfig,
    pub steps_watchdog: WatchdogConfig,
    pub retention: RetentionPolicy,
    /// Buffer size of the live sample and event broadcasts.
    pub channel_capacity: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            terminators: Terminator::ALL.to_vec(),
            backfill_max_lead: Duration::from_secs(5 * 60),
            heart_rate_watchdog: WatchdogConfig::default(),
            steps_watchdog: WatchdogConfig::default(),
            retention: RetentionPolicy::default(),
            channel_capacity: 256,
        }
    }
}

impl MachineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.terminators.is_empty() {
            return Err(SyncError::Config("at least one terminator is required".into()));
        }
        Ok(())
    }
}

/// Lifecycle events published to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started {
        handle: SessionHandle,
        parameters: SessionParameters,
    },
    Paused {
        handle: SessionHandle,
        origin: Side,
    },
    Resumed {
        handle: SessionHandle,
        origin: Side,
    },
    Completed {
        handle: SessionHandle,
        origin: Side,
        heart_rate: Option<HeartRateSummary>,
    },
    /// The wearable tried to start a session.
    StartRejected { started_at_ms: Option<i64> },
    /// The wearable may not read this sensor; its feed is off for the session.
    SensorUnavailable {
        metric: Metric,
        reason: Option<String>,
    },
    FeedReconnecting { metric: Metric, attempt: u32 },
    /// Samples whose flush failed at completion reached the store on a
    /// later tick. `heart_rate` summarizes everything stored for the session.
    DeferredFlushCompleted {
        handle: SessionHandle,
        heart_rate: Option<HeartRateSummary>,
    },
}

/// Result of completing a session.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub handle: SessionHandle,
    /// Samples written to the store now; zero if the flush was deferred.
    pub flushed_samples: usize,
    pub heart_rate: Option<HeartRateSummary>,
    pub backfilled_distance_km: Option<f64>,
}

/// Sent back to the owning task once a feed reconnect request was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSignal {
    ReconnectSettled { metric: Metric, delivered: bool },
}

/// The interval the wearable tracked before the session existed.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillWindow {
    pub handle: SessionHandle,
    pub from_ms: i64,
    pub to_ms: i64,
}

/// External services the machine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn SessionBackend>,
    pub health: Arc<dyn HealthStore>,
    pub store: Arc<dyn Store>,
}

pub struct SessionMachine {
    core: SessionCore,
    config: MachineConfig,
    backend: Arc<dyn SessionBackend>,
    health: Arc<dyn HealthStore>,
    store: Arc<dyn Store>,
    outbox: Outbox,
    signals: mpsc::UnboundedSender<FeedSignal>,
    events: broadcast::Sender<SessionEvent>,
    heart_rate: HeartRateManager,
    steps: StepsManager,
    settings: SettingsSyncer,
    /// Local start time of the last rejected wearable start.
    pending_watch_start: Option<i64>,
    backfill: Option<BackfillWindow>,
    /// Samples whose flush failed, retried on tick.
    pending_flush: Vec<(SessionHandle, Vec<SensorSample>)>,
}

impl SessionMachine {
    pub fn new(
        config: MachineConfig,
        collaborators: Collaborators,
        outbox: Outbox,
        signals: mpsc::UnboundedSender<FeedSignal>,
    ) -> Result<Self> {
        config.validate()?;

        let capacity = config.channel_capacity;
        let (events, _) = broadcast::channel(capacity.max(1));

        Ok(Self {
            core: SessionCore::new(),
            heart_rate: HeartRateManager::new(
                config.heart_rate_watchdog.clone(),
                config.retention.clone(),
                capacity,
            ),
            steps: StepsManager::new(config.steps_watchdog.clone(), capacity),
            settings: SettingsSyncer::new(Arc::clone(&collaborators.store)),
            config,
            backend: collaborators.backend,
            health: collaborators.health,
            store: collaborators.store,
            outbox,
            signals,
            events,
            pending_watch_start: None,
            backfill: None,
            pending_flush: Vec::new(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        self.core.snapshot()
    }

    pub fn core(&self) -> &SessionCore {
        &self.core
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn events(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    pub fn heart_rate_feed(&self) -> broadcast::Sender<SensorSample> {
        self.heart_rate.sender()
    }

    pub fn steps_feed(&self) -> broadcast::Sender<SensorSample> {
        self.steps.sender()
    }

    pub fn retained_heart_rate(&self) -> &[SensorSample] {
        self.heart_rate.retained()
    }

    pub fn latest_steps(&self) -> Option<SensorSample> {
        self.steps.latest()
    }

    pub fn backfill_window(&self) -> Option<&BackfillWindow> {
        self.backfill.as_ref()
    }

    pub fn pending_flush_len(&self) -> usize {
        self.pending_flush.iter().map(|(_, samples)| samples.len()).sum()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a session from the phone.
    ///
    /// `wearable_started_at_ms` is the wearable's local start time if it began
    /// tracking before the handle existed. On a backend failure the machine
    /// stays inactive and the error is returned.
    pub async fn start(
        &mut self,
        parameters: SessionParameters,
        wearable_started_at_ms: Option<i64>,
    ) -> Result<SessionHandle> {
        if let Some(existing) = self.core.handle() {
            return Err(SessionError::AlreadyActive(existing.clone()).into());
        }
        validate_parameters(&parameters)?;

        let handle = self
            .backend
            .create_session(&parameters)
            .await
            .map_err(SyncError::Backend)?;
        let now_ms = now_millis();
        self.backend
            .start_session(&handle, now_ms)
            .await
            .map_err(SyncError::Backend)?;

        self.core.begin(handle.clone(), parameters, now_ms)?;
        info!(%handle, "session started");

        if let Err(e) = self.settings.remember(parameters).await {
            warn!(error = %e, "failed to persist session parameters");
        }

        self.outbox.send(Command::WorkoutStarted {
            session_id: handle.clone(),
            parameters,
        });
        self.outbox.send(Command::SetSessionId {
            session_id: handle.clone(),
        });

        let now = Instant::now();
        self.heart_rate.start(now);
        self.steps.start(now);

        let lead_start = wearable_started_at_ms.or(self.pending_watch_start);
        self.pending_watch_start = None;
        self.backfill = lead_start.and_then(|from_ms| {
            let lead_ms = now_ms - from_ms;
            if lead_ms > 0 && lead_ms <= self.config.backfill_max_lead.as_millis() as i64 {
                Some(BackfillWindow {
                    handle: handle.clone(),
                    from_ms,
                    to_ms: now_ms,
                })
            } else {
                debug!(lead_ms, "wearable head start outside backfill window");
                None
            }
        });

        self.emit(SessionEvent::Started {
            handle: handle.clone(),
            parameters,
        });
        Ok(handle)
    }

    /// Pause. Duplicates are accepted and produce no event.
    pub async fn pause(&mut self, origin: Side) -> Result<()> {
        match self.core.pause() {
            Ok(Some(Transition::Paused { handle })) => {
                info!(%handle, ?origin, "session paused");
                self.outbox.send(match origin {
                    Side::Phone => Command::PauseSession,
                    Side::Wearable => Command::PauseConfirmed,
                });
                self.emit(SessionEvent::Paused { handle, origin });
                Ok(())
            }
            Ok(_) => {
                debug!(?origin, "duplicate pause");
                if origin == Side::Wearable {
                    self.outbox.send(Command::PauseConfirmed);
                }
                Ok(())
            }
            Err(e) => self.lifecycle_without_session(origin, "pause", e),
        }
    }

    /// Resume. Duplicates are accepted and produce no event.
    pub async fn resume(&mut self, origin: Side) -> Result<()> {
        match self.core.resume() {
            Ok(Some(Transition::Resumed { handle })) => {
                info!(%handle, ?origin, "session resumed");
                self.outbox.send(match origin {
                    Side::Phone => Command::ResumeSession,
                    Side::Wearable => Command::ResumeConfirmed,
                });
                self.emit(SessionEvent::Resumed { handle, origin });
                Ok(())
            }
            Ok(_) => {
                debug!(?origin, "duplicate resume");
                if origin == Side::Wearable {
                    self.outbox.send(Command::ResumeConfirmed);
                }
                Ok(())
            }
            Err(e) => self.lifecycle_without_session(origin, "resume", e),
        }
    }

    /// Complete the session.
    pub async fn complete(&mut self, origin: Side) -> Result<CompletionReport> {
        let Some(Transition::Completed { handle, .. }) = self.core.complete() else {
            return Err(SessionError::NoActiveSession.into());
        };
        info!(%handle, ?origin, "session completed");

        let samples = self.heart_rate.take_retained();
        let heart_rate = HeartRateSummary::from_samples(&samples);
        let flushed_samples = self.flush_samples(&handle, samples).await;

        self.heart_rate.stop();
        self.steps.stop();

        for terminator in &self.config.terminators {
            self.outbox.send(terminator.command());
        }

        let backfilled_distance_km = self.apply_backfill(&handle).await;

        self.emit(SessionEvent::Completed {
            handle: handle.clone(),
            origin,
            heart_rate,
        });

        Ok(CompletionReport {
            handle,
            flushed_samples,
            heart_rate,
            backfilled_distance_km,
        })
    }

    /// Push live figures to the wearable display.
    pub fn push_metrics(&mut self, metrics: SessionMetrics) -> Result<()> {
        if !self.core.is_tracking() {
            return Err(SessionError::NoActiveSession.into());
        }
        self.outbox.send(Command::UpdateMetrics { metrics });
        Ok(())
    }

    /// Push the full session view.
    pub fn resync(&mut self) {
        self.outbox.send(Command::sync_state(&self.core.snapshot()));
    }

    /// The wearable (re)connected: replay settings and state.
    pub async fn wearable_connected(&mut self) {
        let snapshot = self.core.snapshot();
        self.settings.push(&self.outbox, &snapshot).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Handle one message received from the wearable.
    pub async fn handle_inbound(&mut self, message: WireMessage) -> Result<()> {
        let Some(envelope) = router::decode_inbound(&message) else {
            return Ok(());
        };

        match router::route(&envelope, now_millis()) {
            Route::Lifecycle(LifecycleRequest::Pause) => self.pause(Side::Wearable).await,
            Route::Lifecycle(LifecycleRequest::Resume) => self.resume(Side::Wearable).await,
            Route::Lifecycle(LifecycleRequest::End) => {
                if self.core.is_tracking() {
                    self.complete(Side::Wearable).await.map(|_| ())
                } else {
                    debug!("end requested with no session, resyncing");
                    self.resync();
                    Ok(())
                }
            }
            Route::Sample(sample) => {
                self.ingest(sample);
                Ok(())
            }
            Route::SensorStatus {
                metric,
                authorized,
                message,
            } => {
                self.sensor_status(metric, authorized, message);
                Ok(())
            }
            Route::Reconcile(view) => {
                self.reconcile(view);
                Ok(())
            }
            Route::RejectStart { started_at_ms } => {
                self.reject_start(started_at_ms);
                Ok(())
            }
            Route::Liveness => {
                self.outbox.send(Command::PingResponse);
                self.wearable_connected().await;
                Ok(())
            }
            Route::Acknowledged(_) => Ok(()),
            Route::Ignored { command, reason } => {
                debug!(command, reason, "ignored inbound command");
                Ok(())
            }
        }
    }

    /// Feed a sample to its stream manager.
    pub fn ingest(&mut self, sample: SensorSample) {
        let now = Instant::now();
        let state = self.core.state();
        match sample.metric {
            Metric::HeartRate => {
                self.heart_rate.ingest(sample, state, now);
            }
            Metric::Steps => {
                self.steps.ingest(sample, state, now);
            }
        }
    }

    fn sensor_status(&mut self, metric: Metric, authorized: bool, message: Option<String>) {
        if authorized {
            debug!(?metric, "sensor authorized");
            return;
        }
        warn!(?metric, reason = ?message, "sensor access denied on wearable");
        self.feed_mut(metric).deny();
        self.emit(SessionEvent::SensorUnavailable {
            metric,
            reason: message,
        });
    }

    /// The phone's view wins: on any disagreement, push it.
    fn reconcile(&mut self, view: PeerView) {
        let local = self.core.snapshot();
        let state_differs = view.state.is_some_and(|state| state != local.state);
        let handle_differs = view.session_id != local.session_id;
        let parameters_differ = view
            .parameters
            .is_some_and(|parameters| Some(parameters) != local.parameters);

        if state_differs || handle_differs || parameters_differ {
            info!(
                peer_state = ?view.state,
                peer_session = ?view.session_id,
                peer_parameters = ?view.parameters,
                local_state = ?local.state,
                "wearable out of sync, pushing session state"
            );
            self.outbox.send(Command::sync_state(&local));
        }
    }

    fn reject_start(&mut self, started_at_ms: Option<i64>) {
        warn!(?started_at_ms, "rejecting session start from wearable");
        self.outbox.send(Command::Error {
            code: ErrorCode::StartNotPermitted,
            message: "sessions can only be started from the phone".into(),
        });
        if !self.core.is_tracking() {
            self.pending_watch_start = started_at_ms;
        }
        self.emit(SessionEvent::StartRejected { started_at_ms });
    }

    fn lifecycle_without_session(
        &mut self,
        origin: Side,
        action: &'static str,
        error: SessionError,
    ) -> Result<()> {
        match origin {
            Side::Phone => Err(error.into()),
            Side::Wearable => {
                warn!(action, "wearable lifecycle request without a session");
                self.outbox.send(Command::Error {
                    code: ErrorCode::NoActiveSession,
                    message: format!("no session to {}", action),
                });
                Ok(())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Feeds
    // ─────────────────────────────────────────────────────────────────────────

    fn feed_mut(&mut self, metric: Metric) -> &mut WatchedFeed {
        match metric {
            Metric::HeartRate => self.heart_rate.feed_mut(),
            Metric::Steps => self.steps.feed_mut(),
        }
    }

    /// Ask the wearable to restart a feed.
    ///
    /// Returns false if the feed is not watched or a restart is in flight.
    pub fn restart_feed(&mut self, metric: Metric) -> bool {
        let feed = self.feed_mut(metric);
        if !feed.watchdog_mut().try_begin_reconnect() {
            debug!(?metric, "restart skipped");
            return false;
        }
        let attempt = feed.watchdog().attempt();

        info!(?metric, attempt, "requesting sensor stream restart");
        let signals = self.signals.clone();
        self.outbox.send_then(
            Command::StartMonitoring { metric },
            Box::new(move |delivered| {
                let _ = signals.send(FeedSignal::ReconnectSettled { metric, delivered });
            }),
        );
        self.emit(SessionEvent::FeedReconnecting { metric, attempt });
        true
    }

    pub fn on_feed_signal(&mut self, signal: FeedSignal, now: Instant) {
        let FeedSignal::ReconnectSettled { metric, delivered } = signal;
        if !delivered {
            warn!(?metric, "restart request not delivered");
        }
        self.feed_mut(metric).watchdog_mut().finish_reconnect(now);
    }

    /// Periodic tick: watchdogs and deferred flushes.
    pub async fn on_tick(&mut self, now: Instant) {
        self.retry_pending_flush().await;

        for metric in [Metric::HeartRate, Metric::Steps] {
            if self.feed_mut(metric).watchdog().on_tick(now) {
                warn!(?metric, "sensor stream silent");
                self.restart_feed(metric);
            }
        }
    }

    /// A scheduled backoff retry is due.
    pub fn on_retry_due(&mut self, now: Instant) {
        for metric in [Metric::HeartRate, Metric::Steps] {
            if self.feed_mut(metric).watchdog_mut().on_retry_due(now) {
                self.restart_feed(metric);
            }
        }
    }

    /// Earliest scheduled backoff retry.
    pub fn next_retry_at(&self) -> Option<Instant> {
        [
            self.heart_rate.feed().watchdog().retry_at(),
            self.steps.feed().watchdog().retry_at(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    async fn flush_samples(&mut self, handle: &SessionHandle, samples: Vec<SensorSample>) -> usize {
        if samples.is_empty() {
            return 0;
        }
        match self.store.append_heart_rate(handle, &samples).await {
            Ok(inserted) => {
                debug!(%handle, inserted, "heart-rate samples flushed");
                inserted
            }
            Err(e) => {
                warn!(%handle, count = samples.len(), error = %e, "flush failed, will retry");
                self.pending_flush.push((handle.clone(), samples));
                0
            }
        }
    }

    async fn retry_pending_flush(&mut self) {
        for (handle, samples) in std::mem::take(&mut self.pending_flush) {
            let before = self.pending_flush.len();
            self.flush_samples(&handle, samples).await;
            if self.pending_flush.len() > before {
                continue;
            }

            let heart_rate = match self.store.heart_rate_summary(&handle).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(%handle, error = %e, "failed to summarize stored samples");
                    None
                }
            };
            info!(%handle, ?heart_rate, "deferred flush completed");
            self.emit(SessionEvent::DeferredFlushCompleted { handle, heart_rate });
        }
    }

    async fn apply_backfill(&mut self, handle: &SessionHandle) -> Option<f64> {
        let window = self.backfill.take().filter(|w| &w.handle == handle)?;

        let distance_km = match self
            .health
            .distance_km_between(window.from_ms, window.to_ms)
            .await
        {
            Ok(km) if km > 0.0 => km,
            Ok(_) => {
                debug!(%handle, "no distance recorded before session start");
                return None;
            }
            Err(e) => {
                warn!(%handle, error = %e, "health store query failed");
                return None;
            }
        };

        let patch = SessionPatch {
            backfilled_distance_km: Some(distance_km),
        };
        match self.backend.patch_session(handle, &patch).await {
            Ok(()) => {
                info!(%handle, distance_km, "backfilled distance");
                Some(distance_km)
            }
            Err(e) => {
                warn!(%handle, error = %e, "backfill patch failed");
                None
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryLink, MemoryTransport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wristlink_store::{MemoryStore, StoreError, StoreExt};

    #[derive(Default)]
    struct Backend {
        fail_create: AtomicBool,
        created: AtomicUsize,
        patches: Mutex<Vec<SessionPatch>>,
    }

    #[async_trait]
    impl SessionBackend for Backend {
        async fn create_session(&self, _: &SessionParameters) -> anyhow::Result<SessionHandle> {
            if self.fail_create.load(Ordering::SeqCst) {
                anyhow::bail!("backend unavailable");
            }
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(SessionHandle::new(format!("session-{}", n + 1)))
        }

        async fn start_session(&self, _: &SessionHandle, _: i64) -> anyhow::Result<()> {
            Ok(())
        }

        async fn patch_session(&self, _: &SessionHandle, patch: &SessionPatch) -> anyhow::Result<()> {
            self.patches.lock().unwrap().push(patch.clone());
            Ok(())
        }
    }

    struct Health(f64);

    #[async_trait]
    impl HealthStore for Health {
        async fn distance_km_between(&self, _: i64, _: i64) -> anyhow::Result<f64> {
            Ok(self.0)
        }
    }

    /// A store whose sample writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_appends: AtomicBool,
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn get(&self, key: &str) -> wristlink_store::Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &[u8]) -> wristlink_store::Result<()> {
            self.inner.put(key, value).await
        }

        async fn append_heart_rate(
            &self,
            session: &SessionHandle,
            samples: &[SensorSample],
        ) -> wristlink_store::Result<usize> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(StoreError::Poisoned("disk full".into()));
            }
            self.inner.append_heart_rate(session, samples).await
        }

        async fn heart_rate_samples(
            &self,
            session: &SessionHandle,
        ) -> wristlink_store::Result<Vec<SensorSample>> {
            self.inner.heart_rate_samples(session).await
        }
    }

    struct Harness {
        machine: SessionMachine,
        phone: Arc<MemoryTransport>,
        backend: Arc<Backend>,
        store: Arc<FlakyStore>,
        events: broadcast::Receiver<SessionEvent>,
        _signals: mpsc::UnboundedReceiver<FeedSignal>,
    }

    impl Harness {
        fn new(config: MachineConfig, distance_km: f64) -> Self {
            let (phone, _wearable) = MemoryLink::pair();
            let (outbox, _task) = Outbox::spawn(phone.clone());
            let (signal_tx, signals) = mpsc::unbounded_channel();
            let backend = Arc::new(Backend::default());
            let store = Arc::new(FlakyStore::default());
            let machine = SessionMachine::new(
                config,
                Collaborators {
                    backend: backend.clone(),
                    health: Arc::new(Health(distance_km)),
                    store: store.clone(),
                },
                outbox,
                signal_tx,
            )
            .unwrap();
            let events = machine.events().subscribe();
            Self {
                machine,
                phone,
                backend,
                store,
                events,
                _signals: signals,
            }
        }

        async fn sent(&self) -> Vec<Command> {
            self.machine.outbox().flush().await.unwrap();
            self.phone.sent().iter().map(|m| m.decode().unwrap()).collect()
        }

        fn drain_events(&mut self) -> Vec<SessionEvent> {
            std::iter::from_fn(|| self.events.try_recv().ok()).collect()
        }

        async fn inbound(&mut self, command: Command) {
            self.machine
                .handle_inbound(WireMessage::encode(&command).unwrap())
                .await
                .unwrap();
        }
    }

    fn params() -> SessionParameters {
        SessionParameters::metric(20.0, 80.0)
    }

    #[tokio::test]
    async fn test_start_sends_handle_and_persists() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        let handle = h.machine.start(params(), None).await.unwrap();

        assert_eq!(handle.as_str(), "session-1");
        assert_eq!(
            h.sent().await,
            vec![
                Command::WorkoutStarted {
                    session_id: handle.clone(),
                    parameters: params()
                },
                Command::SetSessionId {
                    session_id: handle.clone()
                },
            ]
        );
        assert_eq!(h.store.load_parameters().await.unwrap(), Some(params()));
        assert!(matches!(
            h.drain_events().as_slice(),
            [SessionEvent::Started { .. }]
        ));
    }

    #[tokio::test]
    async fn test_failed_creation_stays_inactive() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        h.backend.fail_create.store(true, Ordering::SeqCst);

        assert!(matches!(
            h.machine.start(params(), None).await,
            Err(SyncError::Backend(_))
        ));
        assert_eq!(h.machine.snapshot(), SessionSnapshot::default());
        assert!(h.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_parameters_rejected_before_backend() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        let result = h.machine.start(SessionParameters::metric(10.0, -1.0), None).await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert_eq!(h.backend.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wearable_pause_is_confirmed_and_idempotent() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        h.machine.start(params(), None).await.unwrap();
        h.drain_events();

        h.inbound(Command::PauseSession).await;
        h.inbound(Command::PauseSession).await;
        h.inbound(Command::ResumeSession).await;
        h.inbound(Command::ResumeSession).await;

        let events = h.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SessionEvent::Paused { origin: Side::Wearable, .. }));
        assert!(matches!(events[1], SessionEvent::Resumed { origin: Side::Wearable, .. }));

        let acks: Vec<_> = h.sent().await.into_iter().skip(2).collect();
        assert_eq!(
            acks,
            vec![
                Command::PauseConfirmed,
                Command::PauseConfirmed,
                Command::ResumeConfirmed,
                Command::ResumeConfirmed
            ]
        );
    }

    #[tokio::test]
    async fn test_phone_pause_without_session_errors() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        assert!(matches!(
            h.machine.pause(Side::Phone).await,
            Err(SyncError::Session(SessionError::NoActiveSession))
        ));

        h.inbound(Command::PauseSession).await;
        assert!(matches!(
            h.sent().await.as_slice(),
            [Command::Error {
                code: ErrorCode::NoActiveSession,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_start_from_watch_rejected() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        h.inbound(Command::StartSessionFromWatch {
            started_at_ms: Some(1),
        })
        .await;

        assert!(!h.machine.core().is_tracking());
        assert_eq!(h.backend.created.load(Ordering::SeqCst), 0);
        assert!(matches!(
            h.sent().await.as_slice(),
            [Command::Error {
                code: ErrorCode::StartNotPermitted,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_completion_sends_every_terminator_after_flush() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        let handle = h.machine.start(params(), None).await.unwrap();
        h.machine.ingest(SensorSample::heart_rate(72.0, 0));
        h.machine.ingest(SensorSample::heart_rate(74.0, 2_000));
        h.machine.ingest(SensorSample::heart_rate(95.0, 4_000));

        let report = h.machine.complete(Side::Phone).await.unwrap();
        assert_eq!(report.flushed_samples, 2);
        assert_eq!(report.heart_rate.map(|s| s.max_bpm), Some(95.0));

        let stored = h.store.heart_rate_samples(&handle).await.unwrap();
        assert_eq!(stored.len(), 2);

        let tail: Vec<_> = h.sent().await.into_iter().skip(2).collect();
        assert_eq!(
            tail,
            vec![Command::SessionEnded, Command::WorkoutStopped, Command::EndSession]
        );
        assert_eq!(h.machine.snapshot(), SessionSnapshot::default());
    }

    #[tokio::test]
    async fn test_custom_terminator_list() {
        let config = MachineConfig {
            terminators: vec![Terminator::EndSession],
            ..MachineConfig::default()
        };
        let mut h = Harness::new(config, 0.0);
        h.machine.start(params(), None).await.unwrap();
        h.inbound(Command::WorkoutStopped).await;

        let tail: Vec<_> = h.sent().await.into_iter().skip(2).collect();
        assert_eq!(tail, vec![Command::EndSession]);
    }

    #[test]
    fn test_empty_terminator_list_rejected() {
        let config = MachineConfig {
            terminators: Vec::new(),
            ..MachineConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[tokio::test]
    async fn test_failed_flush_retried_on_tick() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        let handle = h.machine.start(params(), None).await.unwrap();
        h.machine.ingest(SensorSample::heart_rate(88.0, 0));

        h.store.fail_appends.store(true, Ordering::SeqCst);
        let report = h.machine.complete(Side::Phone).await.unwrap();
        assert_eq!(report.flushed_samples, 0);
        assert_eq!(h.machine.pending_flush_len(), 1);

        h.machine.on_tick(Instant::now()).await;
        assert_eq!(h.machine.pending_flush_len(), 1);

        h.store.fail_appends.store(false, Ordering::SeqCst);
        h.drain_events();
        h.machine.on_tick(Instant::now()).await;
        assert_eq!(h.machine.pending_flush_len(), 0);
        assert_eq!(h.store.heart_rate_samples(&handle).await.unwrap().len(), 1);

        let events = h.drain_events();
        let Some(SessionEvent::DeferredFlushCompleted {
            handle: flushed,
            heart_rate: Some(summary),
        }) = events.last()
        else {
            panic!("expected deferred flush event, got {:?}", events);
        };
        assert_eq!(flushed, &handle);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.avg_bpm, 88.0);
    }

    #[tokio::test]
    async fn test_backfill_patches_distance() {
        let mut h = Harness::new(MachineConfig::default(), 0.42);
        let started = now_millis() - 90_000;
        h.machine.start(params(), Some(started)).await.unwrap();
        assert!(h.machine.backfill_window().is_some());

        let report = h.machine.complete(Side::Phone).await.unwrap();
        assert_eq!(report.backfilled_distance_km, Some(0.42));
        assert_eq!(
            h.backend.patches.lock().unwrap().as_slice(),
            &[SessionPatch {
                backfilled_distance_km: Some(0.42)
            }]
        );
    }

    #[tokio::test]
    async fn test_backfill_ignores_stale_lead() {
        let mut h = Harness::new(MachineConfig::default(), 1.0);
        let started = now_millis() - 10 * 60_000;
        h.machine.start(params(), Some(started)).await.unwrap();
        assert!(h.machine.backfill_window().is_none());
    }

    #[tokio::test]
    async fn test_rejected_watch_start_feeds_backfill() {
        let mut h = Harness::new(MachineConfig::default(), 0.3);
        h.inbound(Command::StartSessionFromWatch {
            started_at_ms: Some(now_millis() - 30_000),
        })
        .await;
        h.machine.start(params(), None).await.unwrap();
        assert!(h.machine.backfill_window().is_some());
    }

    #[tokio::test]
    async fn test_reconcile_pushes_phone_view() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        let handle = h.machine.start(params(), None).await.unwrap();

        h.inbound(Command::SetSessionId {
            session_id: handle.clone(),
        })
        .await;
        h.inbound(Command::SyncSessionState {
            state: wristlink_core::SessionState::Paused,
            session_id: Some(handle.clone()),
            parameters: None,
        })
        .await;

        let tail: Vec<_> = h.sent().await.into_iter().skip(2).collect();
        assert_eq!(tail, vec![Command::sync_state(&h.machine.snapshot())]);
    }

    #[tokio::test]
    async fn test_reconcile_corrects_stale_parameters() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        let handle = h.machine.start(params(), None).await.unwrap();
        let stale = SessionParameters::metric(99.0, 50.0);

        // Matching views push nothing.
        h.inbound(Command::SyncSessionState {
            state: wristlink_core::SessionState::Active,
            session_id: Some(handle.clone()),
            parameters: Some(params()),
        })
        .await;
        assert_eq!(h.sent().await.len(), 2);

        h.inbound(Command::SyncSessionState {
            state: wristlink_core::SessionState::Active,
            session_id: Some(handle.clone()),
            parameters: Some(stale),
        })
        .await;
        h.inbound(Command::WorkoutStarted {
            session_id: handle.clone(),
            parameters: stale,
        })
        .await;

        let expected = Command::sync_state(&h.machine.snapshot());
        let tail: Vec<_> = h.sent().await.into_iter().skip(2).collect();
        assert_eq!(tail, vec![expected.clone(), expected]);
        assert_eq!(h.machine.snapshot().parameters, Some(params()));
    }

    #[tokio::test]
    async fn test_sensor_denied_stops_watchdog() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        h.machine.start(params(), None).await.unwrap();
        h.drain_events();

        h.inbound(Command::SensorStatus {
            metric: Metric::HeartRate,
            authorized: false,
            message: Some("permission denied".into()),
        })
        .await;

        assert!(!h.machine.restart_feed(Metric::HeartRate));
        assert!(h.machine.restart_feed(Metric::Steps));
        assert!(matches!(
            h.drain_events().as_slice(),
            [
                SessionEvent::SensorUnavailable {
                    metric: Metric::HeartRate,
                    ..
                },
                SessionEvent::FeedReconnecting {
                    metric: Metric::Steps,
                    attempt: 0
                }
            ]
        ));
    }

    #[tokio::test]
    async fn test_ping_replays_settings() {
        let mut h = Harness::new(MachineConfig::default(), 0.0);
        h.machine.start(params(), None).await.unwrap();
        h.machine.complete(Side::Phone).await.unwrap();

        h.inbound(Command::Ping).await;
        let sent = h.sent().await;
        let tail = &sent[sent.len() - 3..];
        assert_eq!(tail[0], Command::PingResponse);
        assert_eq!(tail[1], Command::UpdateSettings { parameters: params() });
        assert!(matches!(tail[2], Command::SyncSessionState { .. }));
    }
}
