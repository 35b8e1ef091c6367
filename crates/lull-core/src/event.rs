//! The triggering event payload and the tracked-event capability.
//!
//! An [`Event`] is what ingestion hands to the execution plane: a name, two
//! free-form JSON maps (`data` and `user`), and a wall-clock timestamp in
//! unix milliseconds. The serialized format is persisted (debounce items
//! embed the full event) and therefore stable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::{EventId, WorkspaceId};

/// An event ingested into the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Caller-supplied event id, used for idempotent ingestion.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// The event name, e.g. `"cart/item.added"`.
    pub name: String,

    /// Arbitrary event payload.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,

    /// Attributes of the user the event concerns.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub user: Map<String, Value>,

    /// Wall-clock time the event occurred, in unix milliseconds.
    #[serde(default)]
    pub timestamp: i64,

    /// Event schema version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl Event {
    /// Returns the event as a JSON value, for expression environments.
    ///
    /// The shape matches the serialized form, so expressions written against
    /// stored events and live events resolve identically.
    #[must_use]
    pub fn map(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Capability for anything that can stand in as the triggering event of a
/// function run.
///
/// Both a freshly-ingested event wrapper and a stored debounce item satisfy
/// this, so the executor schedules runs without caring which one triggered
/// them.
pub trait TrackedEvent {
    /// The internal, time-ordered id assigned at ingestion.
    fn internal_id(&self) -> EventId;

    /// The event payload.
    fn event(&self) -> &Event;

    /// The workspace the event belongs to.
    fn workspace_id(&self) -> WorkspaceId;
}
