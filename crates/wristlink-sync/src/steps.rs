//! Steps stream manager.
//!
//! Only the latest cumulative count matters. Values are forwarded while the
//! session is active; samples received while paused or inactive still count as
//! feed activity but are dropped, not buffered.

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::trace;

use wristlink_core::{Metric, SensorSample, SessionState};

use crate::feed::{WatchdogConfig, WatchedFeed};

#[derive(Debug)]
pub struct StepsManager {
    feed: WatchedFeed,
    latest: Option<SensorSample>,
}

impl StepsManager {
    pub fn new(watchdog: WatchdogConfig, capacity: usize) -> Self {
        Self {
            feed: WatchedFeed::new(Metric::Steps, watchdog, capacity),
            latest: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.latest = None;
        self.feed.start(now);
    }

    pub fn stop(&mut self) {
        self.feed.stop();
    }

    /// Ingest a raw sample. Returns true if it was forwarded.
    pub fn ingest(&mut self, sample: SensorSample, state: SessionState, now: Instant) -> bool {
        let Some(sample) = self.feed.accept(sample, now) else {
            return false;
        };
        if state != SessionState::Active {
            trace!(?state, steps = sample.value, "steps outside active session dropped");
            return false;
        }
        self.latest = Some(sample);
        self.feed.publish(sample);
        true
    }

    pub fn latest(&self) -> Option<SensorSample> {
        self.latest
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_paused_steps_not_forwarded() {
        let mut steps = StepsManager::new(WatchdogConfig::default(), 16);
        let mut rx = steps.subscribe();
        let t0 = Instant::now();
        steps.start(t0);

        assert!(steps.ingest(SensorSample::steps(100.0, 1), SessionState::Active, t0));
        assert!(!steps.ingest(SensorSample::steps(150.0, 2), SessionState::Paused, t0));
        assert!(steps.ingest(SensorSample::steps(200.0, 3), SessionState::Active, t0));

        assert_eq!(rx.try_recv().unwrap().value, 100.0);
        assert_eq!(rx.try_recv().unwrap().value, 200.0);
        assert!(rx.try_recv().is_err());
        assert_eq!(steps.latest().map(|s| s.value), Some(200.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_steps_keep_watchdog_alive() {
        let mut steps = StepsManager::new(WatchdogConfig::default(), 16);
        let t0 = Instant::now();
        steps.start(t0);

        let t1 = t0 + Duration::from_secs(50);
        steps.ingest(SensorSample::steps(10.0, 1), SessionState::Paused, t1);
        assert!(!steps.feed().watchdog().on_tick(t0 + Duration::from_secs(100)));
    }
}
