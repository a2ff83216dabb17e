//! Event registry types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A server event as delivered on the real-time stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garden: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    /// Milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Event {
    pub fn decode(message: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(message)?)
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_name(&self.name)
    }

    /// The `id` field of the payload, when the payload is a record.
    pub fn payload_id(&self) -> Option<&str> {
        self.payload.get("id").and_then(Value::as_str)
    }
}

/// Garden-related event names; everything else is [`EventKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    GardenCreated,
    GardenUpdated,
    GardenRemoved,
    GardenSync,
    GardenStarted,
    GardenStopped,
    GardenUnreachable,
    GardenError,
    GardenNotConfigured,
    Other,
}

impl EventKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "GARDEN_CREATED" => Self::GardenCreated,
            "GARDEN_UPDATED" => Self::GardenUpdated,
            "GARDEN_REMOVED" => Self::GardenRemoved,
            "GARDEN_SYNC" => Self::GardenSync,
            "GARDEN_STARTED" => Self::GardenStarted,
            "GARDEN_STOPPED" => Self::GardenStopped,
            "GARDEN_UNREACHABLE" => Self::GardenUnreachable,
            "GARDEN_ERROR" => Self::GardenError,
            "GARDEN_NOT_CONFIGURED" => Self::GardenNotConfigured,
            _ => Self::Other,
        }
    }
}

/// Upstream link state of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// `connect` has never been called.
    NoConnection,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConnection => f.write_str("no connection"),
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Handle returned by `subscribe`; identifies one registration of a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub(crate) name: String,
    pub(crate) generation: u64,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Event stream errors.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Failed to open event stream at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Invalid event message: {0}")]
    Decode(#[from] serde_json::Error),
}
