//! The stored debounce item and the delay-queue payload.
//!
//! Both formats are persisted (items in the store's item map, payloads in
//! delay-queue jobs) and survive process restarts, so their field names are
//! stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lull_core::{
    AccountId, AppId, DebounceId, Event, EventId, FunctionId, TrackedEvent, WorkspaceId,
};

/// A debounce window's stored state: the latest triggering event plus the
/// identity of the function it will invoke.
///
/// `DebounceItem` implements [`TrackedEvent`], so the executor can schedule
/// the eventual run straight from the stored item without rewrapping it as
/// an ingested event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebounceItem {
    /// The account the debounced function belongs to.
    pub account_id: AccountId,

    /// The workspace the debounced function belongs to.
    pub workspace_id: WorkspaceId,

    /// The app the debounced function belongs to.
    pub app_id: AppId,

    /// The function this window will invoke.
    pub function_id: FunctionId,

    /// The function version captured when the event arrived.
    pub function_version: i32,

    /// The internal id of the triggering event.
    pub event_id: EventId,

    /// The full triggering event.
    pub event: Event,

    /// Hard deadline for this window as a unix-millisecond wall-clock time.
    ///
    /// Stamped once when the window is created and carried forward across
    /// every overwrite; updates never extend past it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,

    /// When the function was paused, if it is paused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_paused_at: Option<DateTime<Utc>>,
}

impl DebounceItem {
    /// Builds the payload for this item's delay-queue job.
    ///
    /// The payload carries identity only: the executor fetches the item by
    /// debounce id when the job fires, so late events extend the same window
    /// without touching the queued job body.
    #[must_use]
    pub fn queue_payload(&self, debounce_id: DebounceId) -> DebouncePayload {
        DebouncePayload {
            debounce_id,
            account_id: self.account_id,
            workspace_id: self.workspace_id,
            app_id: self.app_id,
            function_id: self.function_id,
            function_version: self.function_version,
        }
    }
}

impl TrackedEvent for DebounceItem {
    fn internal_id(&self) -> EventId {
        self.event_id
    }

    fn event(&self) -> &Event {
        &self.event
    }

    fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }
}

/// What a delay-queue job carries: the debounce id plus identifying fields.
///
/// Deliberately excludes the event; the job body never changes while the
/// window extends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebouncePayload {
    /// The window this job belongs to.
    pub debounce_id: DebounceId,

    /// The account the debounced function belongs to.
    pub account_id: AccountId,

    /// The workspace the debounced function belongs to.
    pub workspace_id: WorkspaceId,

    /// The app the debounced function belongs to.
    pub app_id: AppId,

    /// The function the job will invoke.
    pub function_id: FunctionId,

    /// The function version captured when the window was created.
    pub function_version: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_item() -> DebounceItem {
        let mut data = serde_json::Map::new();
        data.insert("cart_id".into(), json!("c-1"));
        DebounceItem {
            account_id: AccountId::generate(),
            workspace_id: WorkspaceId::generate(),
            app_id: AppId::generate(),
            function_id: FunctionId::generate(),
            function_version: 7,
            event_id: EventId::generate(),
            event: Event {
                name: "cart/item.added".into(),
                data,
                timestamp: 1_700_000_000_000,
                ..Event::default()
            },
            timeout_ms: None,
            function_paused_at: None,
        }
    }

    #[test]
    fn serialized_field_names_are_stable() {
        let item = sample_item();
        let value = serde_json::to_value(&item).unwrap();

        for field in [
            "account_id",
            "workspace_id",
            "app_id",
            "function_id",
            "function_version",
            "event_id",
            "event",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        // Optionals are omitted when unset.
        assert!(value.get("timeout_ms").is_none());
        assert!(value.get("function_paused_at").is_none());
    }

    #[test]
    fn roundtrip_preserves_item() {
        let mut item = sample_item();
        item.timeout_ms = Some(1_700_000_120_000);
        let json = serde_json::to_string(&item).unwrap();
        let parsed: DebounceItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, parsed);
    }

    #[test]
    fn queue_payload_excludes_the_event() {
        let item = sample_item();
        let debounce_id = DebounceId::generate();
        let payload = item.queue_payload(debounce_id);

        assert_eq!(payload.debounce_id, debounce_id);
        assert_eq!(payload.function_id, item.function_id);

        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("event").is_none());
    }

    #[test]
    fn item_is_a_tracked_event() {
        let item = sample_item();
        assert_eq!(item.internal_id(), item.event_id);
        assert_eq!(item.workspace_id(), item.workspace_id);
        assert_eq!(TrackedEvent::event(&item).name, "cart/item.added");
    }
}
