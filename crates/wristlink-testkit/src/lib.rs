//! # Wristlink Testkit
//!
//! Testing utilities for Wristlink.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Wire messages with the commands they must decode to
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Fake collaborators and a phone/wearable test rig
//!
//! ## Golden Vectors
//!
//! ```rust
//! use wristlink_testkit::vectors::verify_all_vectors;
//!
//! for (name, passed, detail) in verify_all_vectors() {
//!     assert!(passed, "{}: {}", name, detail);
//! }
//! ```
//!
//! ## Test Rig
//!
//! Drive a controller from the wearable side:
//!
//! ```rust,ignore
//! use wristlink::ControllerConfig;
//! use wristlink_core::Command;
//! use wristlink_testkit::fixtures::TestRig;
//!
//! let rig = TestRig::new();
//! let controller = rig.spawn(ControllerConfig::default())?;
//! rig.wearable_says(Command::Ping).await?;
//! controller.flush().await?;
//! assert!(rig.sent_names().contains(&"pingResponse"));
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{init_tracing, wire, BackendCall, FakeBackend, FakeHealthStore, TestRig};
pub use generators::LifecycleOp;
pub use vectors::{all_vectors, verify_all_vectors, WireVector};
