// Event Domain Model
// Named, target-tagged JSON payloads handed to the job engine's event bus

use super::target::Target;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event name; steps declare the names they may emit as a static allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventName(&'static str);

impl EventName {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for EventName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

pub const EVENT_STDOUT: EventName = EventName::new("Stdout");
pub const EVENT_STDERR: EventName = EventName::new("Stderr");

/// Payload shape shared by the stdout and stderr events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "Msg")]
    pub msg: String,
}

impl EventPayload {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// One event as handed to the emitter collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventData {
    pub name: EventName,
    pub target: Target,
    /// Serialized JSON document, kept byte-exact
    pub payload: String,
}

impl EventData {
    /// Decode the payload back into a typed value
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.payload)
    }
}
