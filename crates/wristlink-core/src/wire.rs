//! Wire encoding of commands.
//!
//! Native platform channels carry flat key/value maps. A [`WireMessage`] is
//! that map; decoding it yields a typed [`Command`] or says precisely why it
//! could not (missing name, unknown name, malformed payload).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::command::{Command, COMMAND_NAMES};
use crate::error::CoreError;

/// The key holding the command name.
pub const COMMAND_KEY: &str = "command";

/// A raw message as carried by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireMessage(Map<String, Value>);

impl WireMessage {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// The command name, if present and a string.
    pub fn command_name(&self) -> Option<&str> {
        self.0.get(COMMAND_KEY).and_then(Value::as_str)
    }

    /// Encode a typed command.
    pub fn encode(command: &Command) -> Result<Self, CoreError> {
        match serde_json::to_value(command) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(other) => Err(CoreError::EncodingError(format!(
                "{} encoded to non-object {}",
                command.name(),
                other
            ))),
            Err(e) => Err(CoreError::EncodingError(e.to_string())),
        }
    }

    /// Decode into a typed command. Unknown keys are ignored.
    pub fn decode(&self) -> Result<Command, CoreError> {
        let name = self.command_name().ok_or(CoreError::MissingCommand)?;

        if !COMMAND_NAMES.contains(&name) {
            return Err(CoreError::UnknownCommand(name.to_string()));
        }

        serde_json::from_value(Value::Object(self.0.clone())).map_err(|e| CoreError::Malformed {
            command: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Serialize as a JSON object string.
    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    /// Parse a JSON object string.
    pub fn from_json(s: &str) -> Result<Self, CoreError> {
        match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(CoreError::MissingCommand),
            Err(e) => Err(CoreError::Malformed {
                command: String::from("<json>"),
                reason: e.to_string(),
            }),
        }
    }
}

impl From<Map<String, Value>> for WireMessage {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
