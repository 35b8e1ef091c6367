//! In-memory delay queue for testing.
//!
//! [`InMemoryQueue`] stores its job records inside the hash state of an
//! [`InMemoryStore`](crate::store::memory::InMemoryStore), under the
//! queue-items key the coordinator passes to `updateDebounce`, so the
//! script's lease check observes exactly what the queue wrote, the same way
//! a production queue and debounce store share one Redis.
//!
//! Beyond the [`DelayQueue`] contract the queue exposes lease and inspection
//! helpers so tests can play the part of a worker claiming a fired job.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{hash_job_id, DelayQueue, EnqueueOpts, QueueError, QueueItem, QueueShard};
use crate::key::KeyGen;
use crate::store::memory::{InMemoryStore, SharedState};

/// The persisted job record.
///
/// Field names are load-bearing: `lease_expires_at_ms` is what the
/// `updateDebounce` script inspects for its lease check.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    job_id: String,
    at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lease_expires_at_ms: Option<i64>,
    item: QueueItem,
}

/// In-memory delay queue for testing.
#[derive(Debug, Clone)]
pub struct InMemoryQueue {
    shared: Arc<Mutex<SharedState>>,
    items_key: String,
}

impl InMemoryQueue {
    /// Creates a queue sharing its backend with `store`, keeping job records
    /// under the queue-items key derived by `keys`.
    ///
    /// The `keys` prefix must match the coordinator's, or the lease check
    /// will look in the wrong hash.
    #[must_use]
    pub fn attached(store: &InMemoryStore, keys: &KeyGen) -> Self {
        Self {
            shared: store.shared(),
            items_key: keys.queue_items(),
        }
    }

    /// Leases a job for `ttl`, as a worker does when it claims a fired job.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotFound`] if no job exists under `job_id`
    /// - [`QueueError::AlreadyLeased`] if a live lease exists
    pub fn lease(&self, job_id: &str, ttl: Duration) -> Result<(), QueueError> {
        let now_ms = Utc::now().timestamp_millis();
        self.with_record(job_id, |record| {
            if record.lease_expires_at_ms.is_some_and(|at| at > now_ms) {
                return Err(QueueError::AlreadyLeased {
                    job_id: record.job_id.clone(),
                });
            }
            record.lease_expires_at_ms =
                Some(now_ms + i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
            Ok(())
        })
    }

    /// Returns when the job is scheduled to fire, if it exists.
    #[must_use]
    pub fn scheduled_at(&self, job_id: &str) -> Option<DateTime<Utc>> {
        self.read_record(job_id)
            .and_then(|record| DateTime::from_timestamp_millis(record.at_ms))
    }

    /// Returns the job body, if it exists.
    #[must_use]
    pub fn job(&self, job_id: &str) -> Option<QueueItem> {
        self.read_record(job_id).map(|record| record.item)
    }

    /// Returns the number of outstanding jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .lock()
            .map(|shared| {
                shared
                    .hashes
                    .get(&self.items_key)
                    .map_or(0, std::collections::HashMap::len)
            })
            .unwrap_or(0)
    }

    /// Returns true if no jobs are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_record(&self, job_id: &str) -> Option<JobRecord> {
        let field = hash_job_id(job_id);
        let shared = self.shared.lock().ok()?;
        let encoded = shared.hashes.get(&self.items_key)?.get(&field)?;
        serde_json::from_str(encoded).ok()
    }

    fn with_record<T>(
        &self,
        job_id: &str,
        mutate: impl FnOnce(&mut JobRecord) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let field = hash_job_id(job_id);
        let mut shared = self.shared.lock().map_err(|_| QueueError::Storage {
            message: "lock poisoned".to_string(),
        })?;

        let encoded = shared
            .hashes
            .get(&self.items_key)
            .and_then(|hash| hash.get(&field))
            .ok_or_else(|| QueueError::NotFound {
                job_id: job_id.to_string(),
            })?;
        let mut record: JobRecord =
            serde_json::from_str(encoded).map_err(|e| QueueError::Storage {
                message: format!("undecodable job record: {e}"),
            })?;

        let result = mutate(&mut record)?;

        let encoded = serde_json::to_string(&record).map_err(|e| QueueError::Storage {
            message: format!("unencodable job record: {e}"),
        })?;
        shared
            .hashes
            .entry(self.items_key.clone())
            .or_default()
            .insert(field, encoded);
        Ok(result)
    }
}

#[async_trait]
impl DelayQueue for InMemoryQueue {
    async fn enqueue(
        &self,
        item: QueueItem,
        at: DateTime<Utc>,
        _opts: EnqueueOpts,
    ) -> Result<(), QueueError> {
        let record = JobRecord {
            job_id: item.job_id.clone(),
            at_ms: at.timestamp_millis(),
            lease_expires_at_ms: None,
            item,
        };
        let field = hash_job_id(&record.job_id);
        let encoded = serde_json::to_string(&record).map_err(|e| QueueError::Storage {
            message: format!("unencodable job record: {e}"),
        })?;

        let mut shared = self.shared.lock().map_err(|_| QueueError::Storage {
            message: "lock poisoned".to_string(),
        })?;
        shared
            .hashes
            .entry(self.items_key.clone())
            .or_default()
            .insert(field, encoded);
        Ok(())
    }

    async fn requeue_by_job_id(
        &self,
        _shard: &QueueShard,
        job_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let now_ms = Utc::now().timestamp_millis();
        self.with_record(job_id, |record| {
            if record.lease_expires_at_ms.is_some_and(|lease| lease > now_ms) {
                return Err(QueueError::AlreadyLeased {
                    job_id: record.job_id.clone(),
                });
            }
            record.at_ms = at.timestamp_millis();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::DebouncePayload;
    use lull_core::{AccountId, AppId, DebounceId, FunctionId, WorkspaceId};

    fn sample_item() -> QueueItem {
        QueueItem::debounce(DebouncePayload {
            debounce_id: DebounceId::generate(),
            account_id: AccountId::generate(),
            workspace_id: WorkspaceId::generate(),
            app_id: AppId::generate(),
            function_id: FunctionId::generate(),
            function_version: 1,
        })
    }

    fn queue() -> InMemoryQueue {
        InMemoryQueue::attached(&InMemoryStore::new(), &KeyGen::default())
    }

    #[tokio::test]
    async fn enqueue_and_inspect() {
        let queue = queue();
        let item = sample_item();
        let job_id = item.job_id.clone();
        let at = Utc::now() + chrono::Duration::seconds(30);

        queue.enqueue(item.clone(), at, EnqueueOpts::new()).await.unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.job(&job_id), Some(item));
        let scheduled = queue.scheduled_at(&job_id).unwrap();
        assert_eq!(scheduled.timestamp_millis(), at.timestamp_millis());
    }

    #[tokio::test]
    async fn requeue_moves_the_schedule() {
        let queue = queue();
        let item = sample_item();
        let job_id = item.job_id.clone();
        let first = Utc::now() + chrono::Duration::seconds(30);
        let second = first + chrono::Duration::seconds(15);

        queue.enqueue(item, first, EnqueueOpts::new()).await.unwrap();
        queue
            .requeue_by_job_id(&QueueShard::default(), &job_id, second)
            .await
            .unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.scheduled_at(&job_id).unwrap().timestamp_millis(),
            second.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn requeue_missing_job_is_not_found() {
        let queue = queue();
        let err = queue
            .requeue_by_job_id(&QueueShard::default(), "missing", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound { .. }));
    }

    #[tokio::test]
    async fn leased_job_cannot_be_requeued() {
        let queue = queue();
        let item = sample_item();
        let job_id = item.job_id.clone();

        queue
            .enqueue(item, Utc::now(), EnqueueOpts::new())
            .await
            .unwrap();
        queue.lease(&job_id, Duration::from_secs(5)).unwrap();

        let err = queue
            .requeue_by_job_id(&QueueShard::default(), &job_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::AlreadyLeased { .. }));
    }

    #[tokio::test]
    async fn double_lease_conflicts() {
        let queue = queue();
        let item = sample_item();
        let job_id = item.job_id.clone();

        queue
            .enqueue(item, Utc::now(), EnqueueOpts::new())
            .await
            .unwrap();
        queue.lease(&job_id, Duration::from_secs(5)).unwrap();

        let err = queue.lease(&job_id, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, QueueError::AlreadyLeased { .. }));
    }
}
