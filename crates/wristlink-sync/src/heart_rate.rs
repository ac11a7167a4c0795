//! Heart-rate stream manager.
//!
//! Every valid sample is published live. While a session exists, a thinned
//! subset is retained for storage: the first sample, then any sample at least
//! [`RetentionPolicy::interval`] after the last retained one, or differing
//! from it by at least [`RetentionPolicy::significant_change_bpm`].

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use wristlink_core::{Metric, SensorSample, SessionState};

use crate::feed::{WatchdogConfig, WatchedFeed};

/// Which heart-rate samples are kept for the session record.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Measured on sample timestamps.
    pub interval: Duration,
    pub significant_change_bpm: f64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            significant_change_bpm: 10.0,
        }
    }
}

impl RetentionPolicy {
    pub fn should_retain(&self, last: Option<&SensorSample>, sample: &SensorSample) -> bool {
        let Some(last) = last else {
            return true;
        };
        let elapsed_ms = sample.timestamp_ms.saturating_sub(last.timestamp_ms);
        elapsed_ms >= self.interval.as_millis() as i64
            || (sample.value - last.value).abs() >= self.significant_change_bpm
    }
}

#[derive(Debug)]
pub struct HeartRateManager {
    feed: WatchedFeed,
    policy: RetentionPolicy,
    retained: Vec<SensorSample>,
}

impl HeartRateManager {
    pub fn new(watchdog: WatchdogConfig, policy: RetentionPolicy, capacity: usize) -> Self {
        Self {
            feed: WatchedFeed::new(Metric::HeartRate, watchdog, capacity),
            policy,
            retained: Vec::new(),
        }
    }

    /// Begin a session: clear retained samples and start the watchdog.
    pub fn start(&mut self, now: Instant) {
        self.retained.clear();
        self.feed.start(now);
    }

    pub fn stop(&mut self) {
        self.feed.stop();
    }

    /// Ingest a raw sample. Returns true if it was retained.
    pub fn ingest(&mut self, sample: SensorSample, state: SessionState, now: Instant) -> bool {
        let Some(sample) = self.feed.accept(sample, now) else {
            return false;
        };
        self.feed.publish(sample);

        if state == SessionState::Inactive {
            return false;
        }
        if !self.policy.should_retain(self.retained.last(), &sample) {
            return false;
        }
        self.retained.push(sample);
        true
    }

    pub fn retained(&self) -> &[SensorSample] {
        &self.retained
    }

    /// Hand over the retained samples, leaving the sequence empty.
    pub fn take_retained(&mut self) -> Vec<SensorSample> {
        std::mem::take(&mut self.retained)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SensorSample> {
        self.feed.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<SensorSample> {
        self.feed.sender()
    }

    pub fn feed(&self) -> &WatchedFeed {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut WatchedFeed {
        &mut self.feed
    }
}
