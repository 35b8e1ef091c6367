//! The debounce coordinator.
//!
//! [`StoreDebouncer`] orchestrates the create/update retry loop over the
//! store's atomic scripts and keeps the delay queue's one job per window in
//! step with the stored state. It holds no lock and no per-window state of
//! its own: any number of producers may call [`Debouncer::debounce`]
//! concurrently for the same key, and every race lands on a script whose
//! return code tells the caller which path to take.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lull_core::{DebounceId, Function};

use crate::config::DebouncerConfig;
use crate::error::{Error, Result};
use crate::item::DebounceItem;
use crate::key::{debounce_key, KeyGen};
use crate::metrics::DebounceMetrics;
use crate::queue::{hash_job_id, DelayQueue, EnqueueOpts, QueueError, QueueItem, QueueShard};
use crate::scripts::{ScriptName, ScriptRegistry};
use crate::store::ScriptStore;

/// An implementation-agnostic function debouncer: delays a function run
/// until a quiet period passes with no more events matching a key.
#[async_trait]
pub trait Debouncer: Send + Sync {
    /// Folds `item` into the window for its `(function, key)` pair, creating
    /// the window if none exists.
    async fn debounce(&self, item: DebounceItem, function: &Function) -> Result<()>;

    /// Fetches the stored item for a window.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the item was deleted or never existed
    /// - [`Error::Corrupt`] if the stored payload does not deserialize
    async fn get_debounce_item(&self, debounce_id: DebounceId) -> Result<DebounceItem>;

    /// Removes the stored item for a window. Idempotent: deleting a missing
    /// item succeeds.
    async fn delete_debounce_item(&self, debounce_id: DebounceId) -> Result<()>;

    /// Atomically claims a fired window for execution by rotating the
    /// pointer to a fresh id, so future events open a new window instead of
    /// extending the run that is about to start.
    async fn start_execution(
        &self,
        item: DebounceItem,
        function: &Function,
        debounce_id: DebounceId,
    ) -> Result<()>;
}

/// Store-backed [`Debouncer`].
///
/// Generic over the store and queue so the same coordinator runs against a
/// production backend or the in-memory pair in tests.
#[derive(Debug)]
pub struct StoreDebouncer<S, Q> {
    store: S,
    queue: Q,
    shard: QueueShard,
    keys: KeyGen,
    scripts: ScriptRegistry,
    config: DebouncerConfig,
    metrics: DebounceMetrics,
}

impl<S, Q> StoreDebouncer<S, Q>
where
    S: ScriptStore,
    Q: DelayQueue,
{
    /// Creates a coordinator over `store` and `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptLoad`] if the embedded script registry fails
    /// to assemble.
    pub fn new(store: S, queue: Q, config: DebouncerConfig) -> Result<Self> {
        Ok(Self {
            store,
            queue,
            shard: QueueShard::default(),
            keys: KeyGen::new(config.key_prefix.clone()),
            scripts: ScriptRegistry::load()?,
            config,
            metrics: DebounceMetrics::new(),
        })
    }

    /// Uses `shard` as the default shard for requeue operations.
    #[must_use]
    pub fn with_default_shard(mut self, shard: QueueShard) -> Self {
        self.shard = shard;
        self
    }

    /// The window deadline for a quiet period of `ttl`, as scheduled on the
    /// delay queue.
    ///
    /// On top of the ttl: the configured buffer, plus one second reserved as
    /// the update-script completion deadline. No concurrent update may
    /// extend itself past this point, so the job cannot fire mid-mutation.
    fn fire_at(&self, now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
        now + ttl + self.config.enqueue_buffer + Duration::from_secs(1)
    }

    async fn enqueue_job(
        &self,
        item: &DebounceItem,
        debounce_id: DebounceId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let job = QueueItem::debounce(item.queue_payload(debounce_id));
        self.queue
            .enqueue(job, at, EnqueueOpts::new())
            .await
            .map_err(Error::Queue)
    }

    /// Creates a window, or reports the one already holding the pointer.
    ///
    /// On creation the item is stamped with its hard deadline and the
    /// window's job is enqueued. Returns [`Error::Exists`] with the current
    /// window id when the pointer is taken.
    async fn new_debounce(
        &self,
        item: &DebounceItem,
        function: &Function,
        ttl: Duration,
    ) -> Result<DebounceId> {
        let now = Utc::now();
        let debounce_id = DebounceId::generate();
        let key = debounce_key(&item.event, function);

        let mut item = item.clone();
        if let Some(timeout) = timeout_duration(function)? {
            item.timeout_ms =
                Some(now.timestamp_millis() + i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX));
        }
        let serialized = serde_json::to_string(&item).map_err(|e| Error::Serialization {
            message: format!("error marshalling debounce item: {e}"),
        })?;

        let keys = vec![self.keys.pointer(function.id, &key), self.keys.item_map()];
        let args = vec![
            debounce_id.to_string(),
            serialized,
            ttl_seconds(ttl).to_string(),
        ];
        let reply = self
            .store
            .eval(self.scripts.get(ScriptName::NewDebounce), &keys, &args)
            .await?;

        let Some(out) = reply.as_str() else {
            return Err(Error::Protocol {
                script: ScriptName::NewDebounce.as_str(),
                value: format!("{reply:?}"),
            });
        };

        if out == "0" {
            self.enqueue_job(&item, debounce_id, self.fire_at(now, ttl)).await?;
            self.metrics.record_window("created");
            tracing::debug!(
                %debounce_id,
                function_id = %function.id,
                debounce_key = %key,
                "debounce window created"
            );
            return Ok(debounce_id);
        }

        let existing: DebounceId = out.parse().map_err(|_| Error::Protocol {
            script: ScriptName::NewDebounce.as_str(),
            value: out.to_string(),
        })?;
        Err(Error::Exists {
            debounce_id: existing,
        })
    }

    /// Extends the window `debounce_id` with a newer event, requeueing its
    /// job to the new deadline.
    ///
    /// Bounded by the configured update deadline; an elapsed deadline maps
    /// to [`Error::DeadlineExceeded`] so the outer loop can re-check whether
    /// the window still exists.
    async fn update_debounce(
        &self,
        item: &DebounceItem,
        function: &Function,
        ttl: Duration,
        debounce_id: DebounceId,
    ) -> Result<()> {
        match tokio::time::timeout(
            self.config.update_deadline,
            self.update_debounce_inner(item, function, ttl, debounce_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::DeadlineExceeded),
        }
    }

    async fn update_debounce_inner(
        &self,
        item: &DebounceItem,
        function: &Function,
        ttl: Duration,
        debounce_id: DebounceId,
    ) -> Result<()> {
        let now = Utc::now();
        let key = debounce_key(&item.event, function);
        let job_id = debounce_id.to_string();

        let serialized = serde_json::to_string(item).map_err(|e| Error::Serialization {
            message: format!("error marshalling debounce item: {e}"),
        })?;

        let keys = vec![
            self.keys.pointer(function.id, &key),
            self.keys.item_map(),
            self.keys.queue_items(),
        ];
        let args = vec![
            job_id.clone(),
            serialized,
            ttl_seconds(ttl).to_string(),
            hash_job_id(&job_id),
            now.timestamp_millis().to_string(),
            item.event.timestamp.to_string(),
        ];
        let reply = self
            .store
            .eval(self.scripts.get(ScriptName::UpdateDebounce), &keys, &args)
            .await?;

        let Some(code) = reply.as_int() else {
            return Err(Error::Protocol {
                script: ScriptName::UpdateDebounce.as_str(),
                value: format!("{reply:?}"),
            });
        };

        match code {
            -1 => {
                self.metrics.record_window("conflict");
                Err(Error::InProgress)
            }
            -2 => {
                // Out-of-order: a newer event already owns the window.
                self.metrics.record_window("stale");
                tracing::debug!(
                    %debounce_id,
                    event_ms = item.event.timestamp,
                    "stale event discarded by debounce"
                );
                Ok(())
            }
            -3 => {
                // The pointer outlived its job; the script healed the item,
                // we restore the job.
                self.enqueue_job(item, debounce_id, self.fire_at(now, ttl)).await?;
                self.metrics.record_window("extended");
                Ok(())
            }
            effective_ttl if effective_ttl > 0 => {
                let effective = Duration::from_secs(effective_ttl.unsigned_abs());
                let at = self.fire_at(now, effective);
                match self.queue.requeue_by_job_id(&self.shard, &job_id, at).await {
                    Ok(()) => {
                        self.metrics.record_window("extended");
                        Ok(())
                    }
                    Err(QueueError::AlreadyLeased { .. }) => {
                        tracing::warn!(
                            %debounce_id,
                            ttl_secs = effective_ttl,
                            "debounce job leased during requeue; in progress"
                        );
                        self.metrics.record_window("conflict");
                        Err(Error::InProgress)
                    }
                    Err(err) => Err(Error::Queue(err)),
                }
            }
            other => Err(Error::Protocol {
                script: ScriptName::UpdateDebounce.as_str(),
                value: other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl<S, Q> Debouncer for StoreDebouncer<S, Q>
where
    S: ScriptStore,
    Q: DelayQueue,
{
    #[tracing::instrument(skip_all, fields(function_id = %function.id))]
    async fn debounce(&self, item: DebounceItem, function: &Function) -> Result<()> {
        let Some(debounce) = function.debounce.as_ref() else {
            return Err(Error::InvalidConfig {
                message: "function has no debounce config".to_string(),
            });
        };
        let ttl = parse_period(&debounce.period).map_err(|e| Error::InvalidConfig {
            message: format!("invalid debounce period '{}': {e}", debounce.period),
        })?;

        // Creating and checking are one atomic script, so two producers can
        // never both create. A window can still vanish between the create
        // attempt and the update (its job fired and cleared the pointer);
        // those races re-enter the loop after a backoff long enough for the
        // in-flight claim to settle.
        let mut attempt: u32 = 0;
        loop {
            let existing = match self.new_debounce(&item, function, ttl).await {
                Ok(_) => return Ok(()),
                Err(Error::Exists { debounce_id }) => debounce_id,
                Err(err) => return Err(err),
            };

            match self.update_debounce(&item, function, ttl, existing).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() => {
                    if attempt >= self.config.max_update_attempts {
                        tracing::warn!(
                            debounce_id = %existing,
                            attempts = attempt,
                            error = %err,
                            "unable to update debounce"
                        );
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    attempt += 1;
                    self.metrics.record_retry(attempt);
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_debounce_item(&self, debounce_id: DebounceId) -> Result<DebounceItem> {
        let raw = self
            .store
            .hget(&self.keys.item_map(), &debounce_id.to_string())
            .await?;
        let Some(raw) = raw else {
            return Err(Error::NotFound { debounce_id });
        };
        serde_json::from_str(&raw).map_err(|e| {
            tracing::error!(%debounce_id, error = %e, "stored debounce item is corrupt");
            Error::Corrupt {
                debounce_id,
                message: e.to_string(),
            }
        })
    }

    async fn delete_debounce_item(&self, debounce_id: DebounceId) -> Result<()> {
        self.store
            .hdel(&self.keys.item_map(), &debounce_id.to_string())
            .await
    }

    #[tracing::instrument(skip_all, fields(function_id = %function.id, %debounce_id))]
    async fn start_execution(
        &self,
        item: DebounceItem,
        function: &Function,
        debounce_id: DebounceId,
    ) -> Result<()> {
        let key = debounce_key(&item.event, function);
        let new_debounce_id = DebounceId::generate();

        let keys = vec![self.keys.pointer(function.id, &key)];
        let args = vec![new_debounce_id.to_string(), debounce_id.to_string()];
        let reply = self
            .store
            .eval(self.scripts.get(ScriptName::StartExecution), &keys, &args)
            .await?;

        match reply.as_int() {
            Some(0) => {
                self.metrics.record_execution("claimed");
                Ok(())
            }
            Some(1) => {
                self.metrics.record_execution("superseded");
                Ok(())
            }
            _ => Err(Error::Protocol {
                script: ScriptName::StartExecution.as_str(),
                value: format!("{reply:?}"),
            }),
        }
    }
}

/// Converts a quiet period to whole script seconds; sub-second periods round
/// up to the same 1 s floor the update clamp uses.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Resolves the function's hard timeout, if configured.
fn timeout_duration(function: &Function) -> Result<Option<Duration>> {
    let Some(timeout) = function
        .debounce
        .as_ref()
        .and_then(|debounce| debounce.timeout.as_deref())
    else {
        return Ok(None);
    };
    parse_period(timeout)
        .map(Some)
        .map_err(|e| Error::InvalidConfig {
            message: format!("invalid debounce timeout '{timeout}': {e}"),
        })
}

/// Parses a Go-style duration string as written in function definitions.
fn parse_period(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (num_str, suffix) = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or((s, ""), |(i, _)| (&s[..i], &s[i..]));

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid number in duration: {s}"))?;

    let multiplier = match suffix.trim() {
        "ms" => return Ok(Duration::from_millis(num)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        other => return Err(format!("unknown duration suffix: {other}")),
    };

    Ok(Duration::from_secs(num * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_period_accepts_common_units() {
        assert_eq!(parse_period("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_period("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_period("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_period("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_period("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_period("1d").unwrap(), Duration::from_secs(86400));
    }

    #[test]
    fn parse_period_rejects_garbage() {
        assert!(parse_period("").is_err());
        assert!(parse_period("30x").is_err());
        assert!(parse_period("abc").is_err());
        assert!(parse_period("-5s").is_err());
    }

    #[test]
    fn ttl_seconds_floors_at_one() {
        assert_eq!(ttl_seconds(Duration::from_millis(500)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(30)), 30);
    }
}
