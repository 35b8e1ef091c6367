//! In-memory store implementation for testing.
//!
//! This module provides [`InMemoryStore`], an in-memory implementation of
//! [`ScriptStore`] that runs the three mutation scripts natively: each script
//! is a pure function of `(keys, args)` over the backend state, executed
//! under one lock so its steps are as atomic as a server-side script.
//!
//! The backend state is shared with
//! [`InMemoryQueue`](crate::queue::memory::InMemoryQueue): queue job records
//! live in a hash inside the same state, which is what lets
//! `updateDebounce`'s lease check see them: the same single-store topology
//! a production deployment gets from putting the queue and the debounce keys
//! in one Redis.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: no durability, no cross-process
//!   coordination
//! - **Single-process only**: state is not shared across process boundaries

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{ScriptReply, ScriptStore};
use crate::error::{Error, Result};
use crate::scripts::{Script, ScriptName};

/// A string entry with optional expiry, unix milliseconds.
#[derive(Debug, Clone)]
pub(crate) struct StringEntry {
    pub(crate) value: String,
    pub(crate) expires_at_ms: Option<i64>,
}

/// The backend state shared by the in-memory store and queue.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub(crate) strings: HashMap<String, StringEntry>,
    pub(crate) hashes: HashMap<String, HashMap<String, String>>,
}

impl SharedState {
    /// Reads a live string entry, lazily dropping it if expired.
    pub(crate) fn live_string(&mut self, key: &str, now_ms: i64) -> Option<String> {
        match self.strings.get(key) {
            Some(entry) if entry.expires_at_ms.is_none_or(|at| at > now_ms) => {
                Some(entry.value.clone())
            }
            Some(_) => {
                self.strings.remove(key);
                None
            }
            None => None,
        }
    }

    fn hash_field(&self, key: &str, field: &str) -> Option<String> {
        self.hashes.get(key).and_then(|hash| hash.get(field)).cloned()
    }

    fn set_hash_field(&mut self, key: &str, field: &str, value: String) {
        self.hashes.entry(key.to_string()).or_default().insert(field.to_string(), value);
    }
}

/// Converts a lock poison error to a storage error.
pub(crate) fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// In-memory store for testing.
///
/// ## Example
///
/// ```rust
/// use lull_debounce::store::memory::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// // Use store in tests...
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Mutex<SharedState>>,
}

impl InMemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shared(&self) -> Arc<Mutex<SharedState>> {
        Arc::clone(&self.shared)
    }

    /// Returns the live pointer value under `key`, if any.
    ///
    /// Test helper: expired pointers read as missing, exactly as the
    /// scripts see them.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn pointer_value(&self, key: &str) -> Result<Option<String>> {
        let mut shared = self.shared.lock().map_err(poison_err)?;
        Ok(shared.live_string(key, Utc::now().timestamp_millis()))
    }

    fn new_debounce(&self, keys: &[String], args: &[String]) -> Result<ScriptReply> {
        let [key_ptr, key_map] = expect_keys::<2>(ScriptName::NewDebounce, keys)?;
        let [debounce_id, item, ttl] = expect_args::<3>(ScriptName::NewDebounce, args)?;
        let ttl_secs = int_arg(ScriptName::NewDebounce, "ttl", ttl)?;

        let now_ms = Utc::now().timestamp_millis();
        let mut shared = self.shared.lock().map_err(poison_err)?;

        if let Some(existing) = shared.live_string(key_ptr, now_ms) {
            return Ok(ScriptReply::Str(existing));
        }

        shared.strings.insert(
            key_ptr.to_string(),
            StringEntry {
                value: debounce_id.to_string(),
                expires_at_ms: Some(now_ms + ttl_secs * 1000),
            },
        );
        shared.set_hash_field(key_map, debounce_id, item.to_string());
        Ok(ScriptReply::Str("0".to_string()))
    }

    #[allow(clippy::too_many_lines)]
    fn update_debounce(&self, keys: &[String], args: &[String]) -> Result<ScriptReply> {
        let [key_ptr, key_map, key_queue] = expect_keys::<3>(ScriptName::UpdateDebounce, keys)?;
        let [debounce_id, item, ttl, job_key, now, event_ts] =
            expect_args::<6>(ScriptName::UpdateDebounce, args)?;
        let ttl_secs = int_arg(ScriptName::UpdateDebounce, "ttl", ttl)?;
        let now_ms = int_arg(ScriptName::UpdateDebounce, "now", now)?;
        let event_ms = int_arg(ScriptName::UpdateDebounce, "event timestamp", event_ts)?;

        let mut shared = self.shared.lock().map_err(poison_err)?;

        let Some(current) = shared.live_string(key_ptr, now_ms) else {
            return Ok(ScriptReply::Int(-1));
        };
        if current != debounce_id {
            // Rotated between the caller's read and this mutation: the old
            // window is being executed.
            return Ok(ScriptReply::Int(-1));
        }

        let Some(existing) = shared.hash_field(key_map, debounce_id) else {
            // Ghost pointer: heal the item so the re-enqueued job has
            // something to execute.
            shared.set_hash_field(key_map, debounce_id, item.to_string());
            if let Some(entry) = shared.strings.get_mut(key_ptr) {
                entry.expires_at_ms = Some(now_ms + ttl_secs * 1000);
            }
            return Ok(ScriptReply::Int(-3));
        };

        let stored: Value = serde_json::from_str(&existing)
            .map_err(|e| Error::storage(format!("updateDebounce: undecodable stored item: {e}")))?;

        let stored_event_ms = stored
            .get("event")
            .and_then(|event| event.get("timestamp"))
            .and_then(Value::as_i64);
        if stored_event_ms.is_some_and(|stored_ms| stored_ms > event_ms) {
            return Ok(ScriptReply::Int(-2));
        }

        // The timeout is fixed at creation; updates only ever shrink the
        // window.
        let stored_timeout = stored.get("timeout_ms").and_then(Value::as_i64);
        let mut effective_ttl = ttl_secs;
        if let Some(timeout_ms) = stored_timeout {
            let remaining = (timeout_ms - now_ms).div_euclid(1000);
            effective_ttl = effective_ttl.min(remaining).max(1);
        }

        if let Some(record) = shared.hash_field(key_queue, job_key) {
            let record: Value = serde_json::from_str(&record).map_err(|e| {
                Error::storage(format!("updateDebounce: undecodable queue item: {e}"))
            })?;
            let leased = record
                .get("lease_expires_at_ms")
                .and_then(Value::as_i64)
                .is_some_and(|lease_ms| lease_ms > now_ms);
            if leased {
                return Ok(ScriptReply::Int(-1));
            }
        }

        let mut incoming: Value = serde_json::from_str(item)
            .map_err(|e| Error::storage(format!("updateDebounce: undecodable item: {e}")))?;
        if let Value::Object(map) = &mut incoming {
            match stored_timeout {
                Some(timeout_ms) => {
                    map.insert("timeout_ms".to_string(), Value::from(timeout_ms));
                }
                None => {
                    map.remove("timeout_ms");
                }
            }
        }
        shared.set_hash_field(key_map, debounce_id, incoming.to_string());
        if let Some(entry) = shared.strings.get_mut(key_ptr) {
            entry.expires_at_ms = Some(now_ms + effective_ttl * 1000);
        }

        Ok(ScriptReply::Int(effective_ttl))
    }

    fn start_execution(&self, keys: &[String], args: &[String]) -> Result<ScriptReply> {
        let [key_ptr] = expect_keys::<1>(ScriptName::StartExecution, keys)?;
        let [new_id, current_id] = expect_args::<2>(ScriptName::StartExecution, args)?;

        let now_ms = Utc::now().timestamp_millis();
        let mut shared = self.shared.lock().map_err(poison_err)?;

        match shared.live_string(key_ptr, now_ms) {
            Some(current) if current == current_id => {
                if let Some(entry) = shared.strings.get_mut(key_ptr) {
                    // Rotate in place, retaining the expiry.
                    entry.value = new_id.to_string();
                }
                Ok(ScriptReply::Int(0))
            }
            _ => Ok(ScriptReply::Int(1)),
        }
    }
}

#[async_trait]
impl ScriptStore for InMemoryStore {
    async fn eval(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> Result<ScriptReply> {
        match script.name() {
            ScriptName::NewDebounce => self.new_debounce(keys, args),
            ScriptName::UpdateDebounce => self.update_debounce(keys, args),
            ScriptName::StartExecution => self.start_execution(keys, args),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let shared = self.shared.lock().map_err(poison_err)?;
        Ok(shared.hash_field(key, field))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut shared = self.shared.lock().map_err(poison_err)?;
        shared.set_hash_field(key, field, value.to_string());
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let mut shared = self.shared.lock().map_err(poison_err)?;
        if let Some(hash) = shared.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }
}

fn expect_keys<'a, const N: usize>(script: ScriptName, keys: &'a [String]) -> Result<[&'a str; N]> {
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    keys.try_into().map_err(|_| {
        Error::storage(format!("{script}: expected {N} keys, got a different arity"))
    })
}

fn expect_args<'a, const N: usize>(script: ScriptName, args: &'a [String]) -> Result<[&'a str; N]> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    args.try_into().map_err(|_| {
        Error::storage(format!("{script}: expected {N} args, got a different arity"))
    })
}

fn int_arg(script: ScriptName, name: &str, raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|e| Error::storage(format!("{script}: {name} arg is not an integer: {e}")))
}
