//! Event envelope types for bus transport.
//!
//! Every message on the bus travels inside an [`EventEnvelope`]: an
//! immutable wrapper carrying identity, routing, and provenance alongside
//! the opaque payload. The wire format is fixed:
//!
//! ```json
//! { "id": "<uuid>", "timestamp": "<ISO 8601>", "type": "task.updated",
//!   "data": { ... }, "source": "task-service" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

use super::Timestamp;

/// Unique identifier for a published event.
///
/// Generated at publish time; consumers may use it for deduplication,
/// the bus itself never does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random EventId using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an EventId from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable transport wrapper for a bus event.
///
/// Fields are public for reading; envelopes are constructed once at
/// publish time and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Globally unique event id.
    pub id: EventId,

    /// When the event was published.
    pub timestamp: Timestamp,

    /// Dot-namespaced routing key (e.g. `task.updated`).
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event-specific payload, opaque to the bus.
    pub data: JsonValue,

    /// Name of the publishing service.
    pub source: String,
}

impl EventEnvelope {
    /// Creates a new envelope stamped with a fresh id and the current time.
    pub fn new(
        event_type: impl Into<String>,
        data: JsonValue,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Timestamp::now(),
            event_type: event_type.into(),
            data,
            source: source.into(),
        }
    }

    /// Returns the suffix after the last `.` in the routing key.
    ///
    /// `notification.location_update` → `location_update`. Returns the
    /// whole key when there is no dot.
    pub fn type_suffix(&self) -> &str {
        self.event_type
            .rsplit_once('.')
            .map(|(_, suffix)| suffix)
            .unwrap_or(&self.event_type)
    }

    /// Deserialize the payload into a concrete type.
    pub fn data_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}
