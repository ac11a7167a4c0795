//! The controller: one task owning the session machine.
//!
//! Public API calls and inbound transport messages share one FIFO channel, so
//! they are applied in arrival order without any locking. Watchdog ticks,
//! periodic resyncs and backoff deadlines are multiplexed on the same loop.
//! The task exits when every [`ControllerHandle`] is dropped or on
//! [`ControllerHandle::shutdown`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use wristlink_core::{
    Metric, SensorSample, SessionHandle, SessionMetrics, SessionParameters, SessionSnapshot, Side,
    WireMessage,
};
use wristlink_store::Store;
use wristlink_sync::{
    Collaborators, CompletionReport, FeedSignal, HealthStore, MachineConfig, Outbox,
    SessionBackend, SessionEvent, SessionMachine, Transport,
};

use crate::error::{ControllerError, Result};

/// Configuration for the controller loop.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Watchdog and deferred-flush period.
    pub tick_interval: Duration,
    /// Period of the full `syncSessionState` push.
    pub resync_interval: Duration,
    pub machine: MachineConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            resync_interval: Duration::from_secs(60),
            machine: MachineConfig::default(),
        }
    }
}

/// External services used by the controller.
#[derive(Clone)]
pub struct Dependencies {
    pub backend: Arc<dyn SessionBackend>,
    pub health: Arc<dyn HealthStore>,
    pub store: Arc<dyn Store>,
}

type Reply<T> = oneshot::Sender<T>;
type SyncReply<T> = Reply<wristlink_sync::Result<T>>;

enum Request {
    Start {
        parameters: SessionParameters,
        wearable_started_at_ms: Option<i64>,
        reply: SyncReply<SessionHandle>,
    },
    Pause {
        reply: SyncReply<()>,
    },
    Resume {
        reply: SyncReply<()>,
    },
    Complete {
        reply: SyncReply<CompletionReport>,
    },
    PushMetrics {
        metrics: SessionMetrics,
        reply: SyncReply<()>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    RestartFeed {
        metric: Metric,
        reply: Reply<bool>,
    },
    WearableConnected,
    Reattach {
        reply: Reply<usize>,
    },
    Flush {
        reply: Reply<()>,
    },
}

enum Event {
    Request(Request),
    Inbound(WireMessage),
    /// Flush pending sends, reply, then leave the loop.
    Shutdown(Reply<()>),
}

/// Spawn the controller task on the current runtime.
///
/// The receive dispatcher is installed on `transport` and anything it buffered
/// is replayed before the first request is served.
pub fn spawn<T>(
    transport: Arc<T>,
    dependencies: Dependencies,
    config: ControllerConfig,
) -> Result<ControllerHandle>
where
    T: Transport + 'static,
{
    let transport: Arc<dyn Transport> = transport;
    let (outbox, _outbox_task) = Outbox::spawn(Arc::clone(&transport));
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();

    let machine = SessionMachine::new(
        config.machine.clone(),
        Collaborators {
            backend: dependencies.backend,
            health: dependencies.health,
            store: dependencies.store,
        },
        outbox,
        signal_tx,
    )?;

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ControllerHandle {
        tx: tx.clone(),
        heart_rate: machine.heart_rate_feed(),
        steps: machine.steps_feed(),
        events: machine.events(),
    };

    let controller = Controller {
        machine,
        transport,
        inbound: tx.downgrade(),
        rx,
        signals: signal_rx,
        config,
    };
    tokio::spawn(controller.run());

    Ok(handle)
}

struct Controller {
    machine: SessionMachine,
    transport: Arc<dyn Transport>,
    /// Weak, so a registered dispatcher does not keep the loop alive.
    inbound: mpsc::WeakUnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    signals: mpsc::UnboundedReceiver<FeedSignal>,
    config: ControllerConfig,
}

impl Controller {
    async fn run(mut self) {
        let replayed = self.attach().await;
        debug!(replayed, "controller started");

        let start = Instant::now();
        let mut tick = time::interval_at(start + self.config.tick_interval, self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut resync =
            time::interval_at(start + self.config.resync_interval, self.config.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let retry_at = self.machine.next_retry_at();

            tokio::select! {
                biased;

                event = self.rx.recv() => match event {
                    Some(Event::Inbound(message)) => self.on_inbound(message).await,
                    Some(Event::Shutdown(reply)) => {
                        self.drain_outbox().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(Event::Request(request)) => self.handle_request(request).await,
                    None => {
                        debug!("all controller handles dropped");
                        self.drain_outbox().await;
                        break;
                    }
                },

                Some(signal) = self.signals.recv() => {
                    self.machine.on_feed_signal(signal, Instant::now());
                }

                _ = tick.tick() => self.machine.on_tick(Instant::now()).await,

                _ = resync.tick() => self.machine.resync(),

                _ = sleep_until(retry_at) => self.machine.on_retry_due(Instant::now()),
            }
        }

        info!("controller stopped");
    }

    /// Install the dispatcher, replay buffered messages, greet the wearable.
    async fn attach(&mut self) -> usize {
        let inbound = self.inbound.clone();
        self.transport.on_receive(Arc::new(move |message| {
            let delivered = inbound
                .upgrade()
                .is_some_and(|tx| tx.send(Event::Inbound(message)).is_ok());
            if !delivered {
                debug!("controller gone, dropping inbound message");
            }
        }));

        let queued = match self.transport.drain_queued().await {
            Ok(queued) => queued,
            Err(e) => {
                warn!(error = %e, "failed to drain queued messages");
                Vec::new()
            }
        };

        let replayed = queued.len();
        for message in queued {
            self.on_inbound(message).await;
        }
        self.machine.wearable_connected().await;
        replayed
    }

    async fn on_inbound(&mut self, message: WireMessage) {
        if let Err(e) = self.machine.handle_inbound(message).await {
            warn!(error = %e, "inbound command failed");
        }
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Start {
                parameters,
                wearable_started_at_ms,
                reply,
            } => {
                let result = self.machine.start(parameters, wearable_started_at_ms).await;
                let _ = reply.send(result);
            }
            Request::Pause { reply } => {
                let _ = reply.send(self.machine.pause(Side::Phone).await);
            }
            Request::Resume { reply } => {
                let _ = reply.send(self.machine.resume(Side::Phone).await);
            }
            Request::Complete { reply } => {
                let _ = reply.send(self.machine.complete(Side::Phone).await);
            }
            Request::PushMetrics { metrics, reply } => {
                let _ = reply.send(self.machine.push_metrics(metrics));
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.machine.snapshot());
            }
            Request::RestartFeed { metric, reply } => {
                let _ = reply.send(self.machine.restart_feed(metric));
            }
            Request::WearableConnected => self.machine.wearable_connected().await,
            Request::Reattach { reply } => {
                let replayed = self.attach().await;
                let _ = reply.send(replayed);
            }
            Request::Flush { reply } => {
                self.drain_outbox().await;
                let _ = reply.send(());
            }
        }
    }

    async fn drain_outbox(&self) {
        if let Err(e) = self.machine.outbox().flush().await {
            warn!(error = %e, "outbox flush failed");
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Event>,
    heart_rate: broadcast::Sender<SensorSample>,
    steps: broadcast::Sender<SensorSample>,
    events: broadcast::Sender<SessionEvent>,
}

impl ControllerHandle {
    async fn request<R>(&self, build: impl FnOnce(Reply<R>) -> Request) -> Result<R> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Event::Request(build(reply)))
            .map_err(|_| ControllerError::Stopped)?;
        response.await.map_err(|_| ControllerError::Stopped)
    }

    /// Start a session. `wearable_started_at_ms` is the wearable's local
    /// start time if it began tracking first.
    pub async fn start(
        &self,
        parameters: SessionParameters,
        wearable_started_at_ms: Option<i64>,
    ) -> Result<SessionHandle> {
        Ok(self
            .request(|reply| Request::Start {
                parameters,
                wearable_started_at_ms,
                reply,
            })
            .await??)
    }

    pub async fn pause(&self) -> Result<()> {
        Ok(self.request(|reply| Request::Pause { reply }).await??)
    }

    pub async fn resume(&self) -> Result<()> {
        Ok(self.request(|reply| Request::Resume { reply }).await??)
    }

    pub async fn complete(&self) -> Result<CompletionReport> {
        Ok(self.request(|reply| Request::Complete { reply }).await??)
    }

    /// Relay live figures to the wearable display.
    pub async fn push_metrics(&self, metrics: SessionMetrics) -> Result<()> {
        Ok(self
            .request(|reply| Request::PushMetrics { metrics, reply })
            .await??)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Request::Snapshot { reply }).await
    }

    /// Ask the wearable to restart a sensor feed.
    ///
    /// Returns false if the feed is not being watched or a restart is already
    /// in flight.
    pub async fn restart_feed(&self, metric: Metric) -> Result<bool> {
        self.request(|reply| Request::RestartFeed { metric, reply })
            .await
    }

    /// The wearable reported in: replay settings and session state.
    pub fn wearable_connected(&self) -> Result<()> {
        self.tx
            .send(Event::Request(Request::WearableConnected))
            .map_err(|_| ControllerError::Stopped)
    }

    /// Reinstall the receive dispatcher and replay buffered messages.
    ///
    /// Returns how many buffered messages were replayed.
    pub async fn reattach(&self) -> Result<usize> {
        self.request(|reply| Request::Reattach { reply }).await
    }

    /// Wait until everything requested so far has been sent (or failed).
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| Request::Flush { reply }).await
    }

    /// Flush pending sends and stop the controller.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Event::Shutdown(reply))
            .map_err(|_| ControllerError::Stopped)?;
        response.await.map_err(|_| ControllerError::Stopped)
    }

    /// Live heart rate, every valid sample.
    pub fn heart_rate(&self) -> broadcast::Receiver<SensorSample> {
        self.heart_rate.subscribe()
    }

    /// Live step count, only while the session is active.
    pub fn steps(&self) -> broadcast::Receiver<SensorSample> {
        self.steps.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
