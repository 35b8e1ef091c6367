//! End-to-end scenarios for the debounce coordinator over the in-memory
//! store and queue.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use lull_core::{
    AccountId, AppId, Debounce, DebounceId, Event, EventId, Function, FunctionId, WorkspaceId,
};
use lull_debounce::prelude::*;

type TestDebouncer = StoreDebouncer<InMemoryStore, InMemoryQueue>;

fn test_config() -> DebouncerConfig {
    DebouncerConfig::new()
        .with_max_update_attempts(2)
        .with_retry_backoff(Duration::from_millis(10))
}

fn harness() -> (TestDebouncer, InMemoryStore, InMemoryQueue) {
    let store = InMemoryStore::new();
    let queue = InMemoryQueue::attached(&store, &KeyGen::default());
    let debouncer =
        StoreDebouncer::new(store.clone(), queue.clone(), test_config()).expect("registry loads");
    (debouncer, store, queue)
}

fn debounced_function(period: &str) -> Function {
    Function::new(FunctionId::generate(), "send-digest", 1).with_debounce(Debounce::new(period))
}

fn item_for(function: &Function, event_ms: i64, seq: i64) -> DebounceItem {
    let mut data = serde_json::Map::new();
    data.insert("seq".into(), json!(seq));
    DebounceItem {
        account_id: AccountId::generate(),
        workspace_id: WorkspaceId::generate(),
        app_id: AppId::generate(),
        function_id: function.id,
        function_version: function.version,
        event_id: EventId::generate(),
        event: Event {
            name: "cart/item.added".into(),
            data,
            timestamp: event_ms,
            ..Event::default()
        },
        timeout_ms: None,
        function_paused_at: None,
    }
}

fn active_debounce_id(store: &InMemoryStore, function: &Function) -> DebounceId {
    let keys = KeyGen::default();
    let pointer = keys.pointer(function.id, &function.id.to_string());
    store
        .pointer_value(&pointer)
        .expect("store readable")
        .expect("pointer present")
        .parse()
        .expect("pointer holds a debounce id")
}

fn seq_of(item: &DebounceItem) -> i64 {
    item.event.data["seq"].as_i64().expect("seq marker")
}

/// S1: a single event creates a pointer and one job at `ttl + buffer + 1s`,
/// and the fired job can be claimed.
#[tokio::test]
async fn single_event_creates_one_window() {
    let (debouncer, store, queue) = harness();
    let function = debounced_function("1s");
    let before = Utc::now();

    debouncer
        .debounce(item_for(&function, before.timestamp_millis(), 1), &function)
        .await
        .unwrap();

    let debounce_id = active_debounce_id(&store, &function);
    assert_eq!(queue.len(), 1);

    // Scheduled at ttl (1s) + buffer (50ms) + the 1s update deadline.
    let scheduled = queue.scheduled_at(&debounce_id.to_string()).unwrap();
    let delay_ms = scheduled.timestamp_millis() - before.timestamp_millis();
    assert!((2_050..2_500).contains(&delay_ms), "delay was {delay_ms}ms");

    let stored = debouncer.get_debounce_item(debounce_id).await.unwrap();
    assert_eq!(seq_of(&stored), 1);

    debouncer
        .start_execution(stored, &function, debounce_id)
        .await
        .unwrap();
    assert_ne!(active_debounce_id(&store, &function), debounce_id);
}

/// S2: a burst collapses into one job carrying the latest event, with the
/// deadline pushed out by each extension.
#[tokio::test]
async fn burst_collapses_into_latest_event() {
    let (debouncer, store, queue) = harness();
    let function = debounced_function("1s");
    let base = Utc::now().timestamp_millis();

    debouncer
        .debounce(item_for(&function, base, 1), &function)
        .await
        .unwrap();
    let debounce_id = active_debounce_id(&store, &function);
    let first_deadline = queue.scheduled_at(&debounce_id.to_string()).unwrap();

    debouncer
        .debounce(item_for(&function, base + 300, 2), &function)
        .await
        .unwrap();
    debouncer
        .debounce(item_for(&function, base + 700, 3), &function)
        .await
        .unwrap();

    // One job, same id, extended.
    assert_eq!(queue.len(), 1);
    assert_eq!(active_debounce_id(&store, &function), debounce_id);
    let final_deadline = queue.scheduled_at(&debounce_id.to_string()).unwrap();
    assert!(final_deadline >= first_deadline);

    let stored = debouncer.get_debounce_item(debounce_id).await.unwrap();
    assert_eq!(seq_of(&stored), 3);
    assert_eq!(stored.event.timestamp, base + 700);
}

/// S3: the hard timeout caps every extension; the stored deadline survives
/// overwrites.
#[tokio::test]
async fn timeout_clamps_extensions() {
    let (debouncer, store, queue) = harness();
    let function = Function::new(FunctionId::generate(), "send-digest", 1)
        .with_debounce(Debounce::new("5s").with_timeout("2s"));
    let before = Utc::now();

    debouncer
        .debounce(item_for(&function, before.timestamp_millis(), 1), &function)
        .await
        .unwrap();
    let debounce_id = active_debounce_id(&store, &function);

    let created = debouncer.get_debounce_item(debounce_id).await.unwrap();
    let timeout_ms = created.timeout_ms.expect("timeout stamped at creation");
    assert!(timeout_ms <= Utc::now().timestamp_millis() + 2_100);

    debouncer
        .debounce(
            item_for(&function, before.timestamp_millis() + 100, 2),
            &function,
        )
        .await
        .unwrap();

    // The requeue used the clamped ttl (~2s), not the requested 5s.
    let scheduled = queue.scheduled_at(&debounce_id.to_string()).unwrap();
    let delay_ms = scheduled.timestamp_millis() - before.timestamp_millis();
    assert!(delay_ms < 4_000, "deadline must be clamped, was {delay_ms}ms");

    // The overwrite kept the creation-time deadline.
    let stored = debouncer.get_debounce_item(debounce_id).await.unwrap();
    assert_eq!(stored.timeout_ms, Some(timeout_ms));
    assert_eq!(seq_of(&stored), 2);
}

/// S4: an event older than the stored one is silently discarded.
#[tokio::test]
async fn out_of_order_event_is_discarded() {
    let (debouncer, store, _queue) = harness();
    let function = debounced_function("1s");

    debouncer
        .debounce(item_for(&function, 100, 1), &function)
        .await
        .unwrap();
    let debounce_id = active_debounce_id(&store, &function);

    // Arrives second, but its event predates the stored one.
    debouncer
        .debounce(item_for(&function, 90, 2), &function)
        .await
        .unwrap();

    let stored = debouncer.get_debounce_item(debounce_id).await.unwrap();
    assert_eq!(seq_of(&stored), 1);
    assert_eq!(stored.event.timestamp, 100);
}

/// S5: after `start_execution` rotates the pointer, a concurrent event
/// opens a brand-new window while the executing run keeps its item.
#[tokio::test]
async fn rotation_isolates_the_executing_run() {
    let (debouncer, store, queue) = harness();
    let function = debounced_function("1s");

    debouncer
        .debounce(item_for(&function, 1_000, 1), &function)
        .await
        .unwrap();
    let old_id = active_debounce_id(&store, &function);
    let old_item = debouncer.get_debounce_item(old_id).await.unwrap();

    debouncer
        .start_execution(old_item, &function, old_id)
        .await
        .unwrap();
    let rotated_id = active_debounce_id(&store, &function);
    assert_ne!(rotated_id, old_id);

    // A new event lands on the rotated pointer and starts a fresh window.
    debouncer
        .debounce(item_for(&function, 2_000, 2), &function)
        .await
        .unwrap();

    assert_eq!(active_debounce_id(&store, &function), rotated_id);
    let fresh = debouncer.get_debounce_item(rotated_id).await.unwrap();
    assert_eq!(seq_of(&fresh), 2);

    // The executing run still owns its item, untouched by the new window.
    let executing = debouncer.get_debounce_item(old_id).await.unwrap();
    assert_eq!(seq_of(&executing), 1);

    // Both the fired job and the fresh window's job exist.
    assert_eq!(queue.len(), 2);
    assert!(queue.job(&rotated_id.to_string()).is_some());
}

/// S6: a pointer whose item vanished is healed on the next event.
#[tokio::test]
async fn ghost_pointer_is_healed() {
    let (debouncer, store, queue) = harness();
    let function = debounced_function("1s");

    debouncer
        .debounce(item_for(&function, 1_000, 1), &function)
        .await
        .unwrap();
    let debounce_id = active_debounce_id(&store, &function);

    // Simulate the item vanishing out from under the pointer.
    store
        .hdel(&KeyGen::default().item_map(), &debounce_id.to_string())
        .await
        .unwrap();

    debouncer
        .debounce(item_for(&function, 2_000, 2), &function)
        .await
        .unwrap();

    let healed = debouncer.get_debounce_item(debounce_id).await.unwrap();
    assert_eq!(seq_of(&healed), 2);
    assert_eq!(queue.len(), 1);
    assert!(queue.job(&debounce_id.to_string()).is_some());
}

/// A leased job blocks extension until the retry budget is spent.
#[tokio::test]
async fn leased_job_exhausts_the_retry_budget() {
    let (debouncer, store, queue) = harness();
    let function = debounced_function("1s");

    debouncer
        .debounce(item_for(&function, 1_000, 1), &function)
        .await
        .unwrap();
    let debounce_id = active_debounce_id(&store, &function);

    queue
        .lease(&debounce_id.to_string(), Duration::from_secs(30))
        .unwrap();

    let err = debouncer
        .debounce(item_for(&function, 2_000, 2), &function)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RetriesExhausted { attempts: 2, .. }));

    // The stored item was never overwritten by the blocked update.
    let stored = debouncer.get_debounce_item(debounce_id).await.unwrap();
    assert_eq!(seq_of(&stored), 1);
}

#[tokio::test]
async fn missing_debounce_config_is_invalid() {
    let (debouncer, _store, _queue) = harness();
    let function = Function::new(FunctionId::generate(), "no-debounce", 1);

    let err = debouncer
        .debounce(item_for(&function, 1_000, 1), &function)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[tokio::test]
async fn unparseable_period_is_invalid() {
    let (debouncer, _store, _queue) = harness();
    let function = Function::new(FunctionId::generate(), "bad-period", 1)
        .with_debounce(Debounce::new("7x"));

    let err = debouncer
        .debounce(item_for(&function, 1_000, 1), &function)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[tokio::test]
async fn get_missing_item_is_not_found() {
    let (debouncer, _store, _queue) = harness();
    let missing = DebounceId::generate();

    let err = debouncer.get_debounce_item(missing).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { debounce_id } if debounce_id == missing));
}

#[tokio::test]
async fn corrupt_item_is_surfaced() {
    let (debouncer, store, _queue) = harness();
    let debounce_id = DebounceId::generate();

    store
        .hset(&KeyGen::default().item_map(), &debounce_id.to_string(), "not json")
        .await
        .unwrap();

    let err = debouncer.get_debounce_item(debounce_id).await.unwrap_err();
    assert!(matches!(err, Error::Corrupt { .. }));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (debouncer, store, _queue) = harness();
    let function = debounced_function("1s");

    debouncer
        .debounce(item_for(&function, 1_000, 1), &function)
        .await
        .unwrap();
    let debounce_id = active_debounce_id(&store, &function);

    debouncer.delete_debounce_item(debounce_id).await.unwrap();
    debouncer.delete_debounce_item(debounce_id).await.unwrap();

    let err = debouncer.get_debounce_item(debounce_id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

/// Grouping-key expressions give each key its own independent window.
#[tokio::test]
async fn key_expression_partitions_windows() {
    let (debouncer, store, queue) = harness();
    let function = Function::new(FunctionId::generate(), "per-cart", 1)
        .with_debounce(Debounce::new("1s").with_key("event.data.cart_id"));

    let mut item_a = item_for(&function, 1_000, 1);
    item_a.event.data.insert("cart_id".into(), json!("cart-a"));
    let mut item_b = item_for(&function, 1_000, 2);
    item_b.event.data.insert("cart_id".into(), json!("cart-b"));

    debouncer.debounce(item_a, &function).await.unwrap();
    debouncer.debounce(item_b, &function).await.unwrap();

    assert_eq!(queue.len(), 2);

    let keys = KeyGen::default();
    let pointer_a = store
        .pointer_value(&keys.pointer(function.id, "cart-a"))
        .unwrap();
    let pointer_b = store
        .pointer_value(&keys.pointer(function.id, "cart-b"))
        .unwrap();
    assert!(pointer_a.is_some());
    assert!(pointer_b.is_some());
    assert_ne!(pointer_a, pointer_b);
}
