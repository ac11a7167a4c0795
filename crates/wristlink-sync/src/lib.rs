//! # Wristlink Sync
//!
//! Keeps one workout session consistent between the phone and an
//! intermittently connected wearable.
//!
//! ## Overview
//!
//! Inbound wire messages are decoded and classified by the [`router`], then
//! applied by the [`SessionMachine`], which also drives the heart-rate and
//! steps managers. Outgoing commands go through the [`Outbox`], a FIFO
//! fire-and-forget queue over the [`Transport`].
//!
//! ## Key Properties
//!
//! - **Phone-authoritative**: only the phone creates sessions; on any
//!   disagreement its view is pushed to the wearable
//! - **Idempotent**: duplicate pause/resume/end commands produce no extra events
//! - **Non-fatal**: send failures, undecodable messages and bad samples are
//!   logged and dropped
//!
//! ## Message Flow
//!
//! ```text
//! Phone                               Wearable
//!   |-------- workoutStarted ---------->|
//!   |-------- setSessionId ------------>|
//!   |<------- watchHeartRateUpdate -----|
//!   |<------- pauseSession -------------|
//!   |-------- pauseConfirmed ---------->|
//!   |<------- ping ---------------------|
//!   |-------- pingResponse ------------>|
//!   |-------- updateSettings ---------->|
//!   |-------- syncSessionState -------->|
//!   |-------- sessionEnded ------------>|
//!   |-------- workoutStopped ---------->|
//!   |-------- endSession -------------->|
//! ```

pub mod backend;
pub mod error;
pub mod feed;
pub mod heart_rate;
pub mod machine;
pub mod outbox;
pub mod router;
pub mod settings;
pub mod steps;
pub mod transport;

pub use backend::{HealthStore, SessionBackend, SessionPatch};
pub use error::{Result, SyncError};
pub use feed::{BackoffPolicy, LiveFeed, Watchdog, WatchdogConfig, WatchedFeed};
pub use heart_rate::{HeartRateManager, RetentionPolicy};
pub use machine::{
    now_millis, BackfillWindow, Collaborators, CompletionReport, FeedSignal, MachineConfig,
    SessionEvent, SessionMachine,
};
pub use outbox::{Outbox, SendCallback};
pub use router::{LifecycleRequest, PeerView, Route};
pub use settings::SettingsSyncer;
pub use steps::StepsManager;
pub use transport::{
    memory::{MemoryLink, MemoryTransport},
    Dispatcher, Transport,
};
