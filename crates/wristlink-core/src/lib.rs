//! # Wristlink Core
//!
//! Pure primitives for the Wristlink session core: session state, commands,
//! sensor samples, and their wire encoding.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`SessionCore`] - Lifecycle state machine (Inactive / Active / Paused)
//! - [`Command`] - Closed set of phone/wearable commands
//! - [`WireMessage`] - The key/value map carried by the transport
//! - [`SensorSample`] - One heart-rate or step reading
//!
//! ## Wire Format
//!
//! Commands are flat maps with a camelCase `command` name. See [`wire`].

pub mod command;
pub mod error;
pub mod session;
pub mod types;
pub mod validation;
pub mod wire;

pub use command::{Command, Envelope, ErrorCode, Terminator, COMMAND_NAMES};
pub use error::{CoreError, SessionError, ValidationError};
pub use session::{SessionCore, SessionSnapshot, SessionState, Transition};
pub use types::{
    HeartRateSummary, Metric, SensorSample, SessionHandle, SessionMetrics, SessionParameters,
    Side, UnitSystem,
};
pub use validation::{validate_parameters, validate_sample};
pub use wire::WireMessage;
