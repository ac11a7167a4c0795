//! # Wristlink Store
//!
//! Persistence for Wristlink behind the async [`Store`] trait.
//!
//! ## Key Types
//!
//! - [`Store`] - Key/value settings and per-session heart-rate samples
//! - [`StoreExt`] - Typed helpers (last parameters, heart-rate summary)
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wristlink_core::SessionParameters;
//! use wristlink_store::{SqliteStore, StoreExt};
//!
//! async fn example() -> wristlink_store::Result<()> {
//!     let store = SqliteStore::open("wristlink.db")?;
//!     store.save_parameters(&SessionParameters::metric(20.0, 80.0)).await?;
//!     let last = store.load_parameters().await?;
//!     assert!(last.is_some());
//!     Ok(())
//! }
//! ```
//!
//! Appending heart-rate samples is idempotent per `(session, timestamp)`, so a
//! flush retried after a partial failure never duplicates rows.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{keys, Store, StoreExt};
