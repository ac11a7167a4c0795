//! Watched sensor feeds.
//!
//! A [`WatchedFeed`] bundles what every sensor stream needs: sample
//! validation, a silence [`Watchdog`] with exponential [`BackoffPolicy`], and a
//! [`LiveFeed`] broadcast for consumers. The heart-rate and steps managers
//! build on it.
//!
//! Time is `tokio::time::Instant`, so tests can drive it with a paused clock.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use wristlink_core::{validate_sample, Metric, SensorSample};

/// Exponential backoff for reconnect attempts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
    /// From this attempt on, the delay is always `max`.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            max: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay after the given (zero-based) attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt >= self.max_attempts {
            return self.max;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Configuration for one feed's watchdog.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// A feed silent for longer than this is considered stalled.
    pub silence_threshold: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            silence_threshold: Duration::from_secs(60),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Detects silence on a feed and paces reconnect attempts.
///
/// The watchdog decides *when* to reconnect; the caller performs the request
/// and reports back through [`Watchdog::finish_reconnect`].
#[derive(Debug)]
pub struct Watchdog {
    config: WatchdogConfig,
    running: bool,
    last_update: Instant,
    reconnecting: bool,
    attempt: u32,
    retry_at: Option<Instant>,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            running: false,
            last_update: Instant::now(),
            reconnecting: false,
            attempt: 0,
            retry_at: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.running = true;
        self.last_update = now;
        self.reconnecting = false;
        self.attempt = 0;
        self.retry_at = None;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.reconnecting = false;
        self.retry_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// A sample arrived: the feed is healthy again.
    pub fn record_activity(&mut self, now: Instant) {
        self.last_update = now;
        self.attempt = 0;
        self.retry_at = None;
    }

    pub fn is_silent(&self, now: Instant) -> bool {
        self.running && now.saturating_duration_since(self.last_update) > self.config.silence_threshold
    }

    /// Periodic check. Returns true if a reconnect should be issued now.
    ///
    /// While a backoff retry is scheduled, the tick defers to it.
    pub fn on_tick(&self, now: Instant) -> bool {
        self.is_silent(now) && !self.reconnecting && self.retry_at.is_none()
    }

    /// Scheduled retry check. Returns true if a reconnect should be issued now.
    pub fn on_retry_due(&mut self, now: Instant) -> bool {
        match self.retry_at {
            Some(at) if now >= at => {
                self.retry_at = None;
                self.is_silent(now) && !self.reconnecting
            }
            _ => false,
        }
    }

    /// Claim the in-progress flag. Returns false if a reconnect is already in flight.
    pub fn try_begin_reconnect(&mut self) -> bool {
        if self.reconnecting || !self.running {
            return false;
        }
        self.reconnecting = true;
        true
    }

    /// The reconnect request has been attempted.
    ///
    /// If the feed is still silent, the next retry is scheduled with backoff.
    pub fn finish_reconnect(&mut self, now: Instant) {
        self.reconnecting = false;
        if self.is_silent(now) {
            let delay = self.config.backoff.delay(self.attempt);
            self.attempt = self.attempt.saturating_add(1);
            self.retry_at = Some(now + delay);
        }
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    /// Attempts made since the feed was last healthy.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }
}

/// A live, non-replaying broadcast of values.
///
/// Subscribers see values published after they subscribe. Publishing with no
/// subscriber is a no-op.
#[derive(Debug, Clone)]
pub struct LiveFeed<T: Clone> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> LiveFeed<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, value: T) {
        let _ = self.tx.send(value);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    /// The underlying sender, for handing out subscriptions elsewhere.
    pub fn sender(&self) -> broadcast::Sender<T> {
        self.tx.clone()
    }
}

/// Validation + watchdog + live broadcast for one metric.
#[derive(Debug)]
pub struct WatchedFeed {
    metric: Metric,
    watchdog: Watchdog,
    live: LiveFeed<SensorSample>,
    authorized: bool,
}

impl WatchedFeed {
    pub fn new(metric: Metric, config: WatchdogConfig, capacity: usize) -> Self {
        Self {
            metric,
            watchdog: Watchdog::new(config),
            live: LiveFeed::new(capacity),
            authorized: true,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Start watching for a new session. Clears an earlier permission denial.
    pub fn start(&mut self, now: Instant) {
        self.authorized = true;
        self.watchdog.start(now);
    }

    pub fn stop(&mut self) {
        self.watchdog.stop();
    }

    /// The wearable may not read this sensor: stop watching until the next start.
    pub fn deny(&mut self) {
        self.authorized = false;
        self.watchdog.stop();
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    /// Validate a raw sample and record activity.
    ///
    /// Returns the sample if it may be used; invalid samples are dropped.
    pub fn accept(&mut self, sample: SensorSample, now: Instant) -> Option<SensorSample> {
        if sample.metric != self.metric {
            debug!(expected = ?self.metric, got = ?sample.metric, "sample for another feed");
            return None;
        }
        if let Err(e) = validate_sample(&sample) {
            debug!(metric = ?self.metric, error = %e, "dropping sample");
            return None;
        }
        self.watchdog.record_activity(now);
        Some(sample)
    }

    pub fn publish(&self, sample: SensorSample) {
        self.live.publish(sample);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SensorSample> {
        self.live.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<SensorSample> {
        self.live.sender()
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn watchdog_mut(&mut self) -> &mut Watchdog {
        &mut self.watchdog
    }
}
