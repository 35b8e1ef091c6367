//! Store key derivation and debounce-key evaluation.
//!
//! Two distinct notions of "key" live here. [`KeyGen`] derives the *store*
//! keys (where the pointer and item map live, namespaced by a configurable
//! prefix). [`debounce_key`] derives the *grouping* key that decides which
//! events collapse into the same window.

use serde_json::Value;

use lull_core::{Event, Function, FunctionId};

/// Sentinel debounce key used when a key expression fails to evaluate.
///
/// All events whose expression errors collapse into this one window rather
/// than fanning out per-event.
pub const INVALID_KEY: &str = "<invalid>";

/// Deterministic store-key derivation.
///
/// Pointer keys embed the function id (fixed-width) before the debounce key,
/// so distinct `(function, key)` pairs can never collide even when a
/// user-controlled key contains the separator.
#[derive(Debug, Clone)]
pub struct KeyGen {
    prefix: String,
}

impl Default for KeyGen {
    fn default() -> Self {
        Self::new("lull")
    }
}

impl KeyGen {
    /// Creates a generator namespacing all keys under `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The pointer entry for one `(function, debounce key)` pair.
    #[must_use]
    pub fn pointer(&self, function_id: FunctionId, debounce_key: &str) -> String {
        format!("{}:debounce:ptr:{function_id}:{debounce_key}", self.prefix)
    }

    /// The single hash holding every serialized item, across all functions.
    #[must_use]
    pub fn item_map(&self) -> String {
        format!("{}:debounce:items", self.prefix)
    }

    /// The delay queue's item hash, read by `updateDebounce` for its lease
    /// check.
    #[must_use]
    pub fn queue_items(&self) -> String {
        format!("{}:queue:items", self.prefix)
    }
}

/// Computes the grouping key for an event under a function's debounce config.
///
/// Without a key expression every event for the function shares one window,
/// keyed by the function id. With an expression, the dotted path is resolved
/// against `{"event": ...}`; a string result is used verbatim and any other
/// JSON value is stringified. An expression that fails to resolve yields
/// [`INVALID_KEY`] and logs; a broken expression must not drop events.
#[must_use]
pub fn debounce_key(event: &Event, function: &Function) -> String {
    let Some(expression) = function
        .debounce
        .as_ref()
        .and_then(|debounce| debounce.key.as_deref())
    else {
        return function.id.to_string();
    };

    let env = Value::Object({
        let mut root = serde_json::Map::new();
        root.insert("event".into(), event.map());
        root
    });

    match evaluate_path(expression, &env) {
        Ok(Value::String(key)) => key,
        Ok(other) => other.to_string(),
        Err(reason) => {
            tracing::warn!(
                expression,
                function_id = %function.id,
                event = %event.name,
                reason,
                "error evaluating debounce expression"
            );
            INVALID_KEY.to_string()
        }
    }
}

/// Resolves a dotted path (`event.data.cart_id`) against a JSON environment.
///
/// The corpus' function definitions only ever use attribute access in
/// debounce keys, so the evaluator is a path walk rather than a full
/// expression language.
fn evaluate_path(expression: &str, env: &Value) -> Result<Value, &'static str> {
    if expression.trim().is_empty() {
        return Err("empty expression");
    }

    let mut current = env;
    for segment in expression.split('.') {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err("empty path segment");
        }
        let Value::Object(map) = current else {
            return Err("path descends into a non-object");
        };
        current = map.get(segment).ok_or("path not present in event")?;
    }
    Ok(current.clone())
}
