//! # Wristlink
//!
//! Keeps a workout session consistent between a phone and a companion
//! wearable over an unreliable message channel, while ingesting the
//! wearable's heart-rate and step streams.
//!
//! ## Overview
//!
//! - **Sessions**: only the phone starts them; pause, resume and end may come
//!   from either side and are idempotent
//! - **Sensor feeds**: validated, broadcast live, watched for silence and
//!   restarted with exponential backoff
//! - **Persistence**: last-used parameters and retained heart-rate samples
//!   survive restarts
//!
//! Everything runs on one task. [`spawn`] starts it and returns a cloneable
//! [`ControllerHandle`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use wristlink::{spawn, ControllerConfig, Dependencies};
//! use wristlink::core::SessionParameters;
//! use wristlink::store::SqliteStore;
//! use wristlink::sync::{HealthStore, SessionBackend, Transport};
//!
//! async fn example(
//!     transport: Arc<impl Transport + 'static>,
//!     backend: Arc<dyn SessionBackend>,
//!     health: Arc<dyn HealthStore>,
//! ) -> wristlink::Result<()> {
//!     let store = Arc::new(SqliteStore::open("wristlink.db").map_err(wristlink::sync::SyncError::from)?);
//!     let controller = spawn(
//!         transport,
//!         Dependencies { backend, health, store },
//!         ControllerConfig::default(),
//!     )?;
//!
//!     let mut heart_rate = controller.heart_rate();
//!     let handle = controller.start(SessionParameters::metric(20.0, 80.0), None).await?;
//!     while let Ok(sample) = heart_rate.recv().await {
//!         println!("{}: {} bpm", handle, sample.value);
//!     }
//!     controller.complete().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `wristlink::core` - Commands, session state, samples, wire encoding
//! - `wristlink::store` - Storage abstraction and SQLite
//! - `wristlink::sync` - Transport, feeds, router, session machine

pub mod controller;
pub mod error;

// Re-export component crates
pub use wristlink_core as core;
pub use wristlink_store as store;
pub use wristlink_sync as sync;

// Re-export main types for convenience
pub use controller::{spawn, ControllerConfig, ControllerHandle, Dependencies};
pub use error::{ControllerError, Result};

// Re-export commonly used types
pub use wristlink_core::{
    Command, Metric, SensorSample, SessionHandle, SessionMetrics, SessionParameters,
    SessionSnapshot, SessionState, Side, UnitSystem,
};
pub use wristlink_sync::{CompletionReport, SessionEvent};
