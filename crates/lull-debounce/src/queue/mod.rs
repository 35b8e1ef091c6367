//! Delay-queue abstraction for debounce jobs.
//!
//! This module provides:
//!
//! - [`DelayQueue`]: the trait the coordinator schedules through
//! - [`QueueItem`]: the serializable job body
//! - [`InMemoryQueue`](memory::InMemoryQueue): in-memory queue for testing
//!
//! The queue is the sole scheduler: the coordinator never sleeps on behalf
//! of a debounce, it only moves the one outstanding job per window to a new
//! absolute time. A job that a worker has already leased cannot be moved;
//! that conflict surfaces as [`QueueError::AlreadyLeased`] and the
//! coordinator translates it into its retry loop.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use lull_core::WorkspaceId;

use crate::item::DebouncePayload;

/// The job kind tag carried by debounce jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A delayed debounce invocation.
    Debounce,
}

/// Names the queue shard holding a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueShard {
    name: String,
}

impl QueueShard {
    /// Creates a shard reference by name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The shard's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for QueueShard {
    fn default() -> Self {
        Self::new("default")
    }
}

/// A delay-queue job body.
///
/// `job_id` is the debounce id's string form, which is what makes
/// requeue-by-job-id address the window's single outstanding job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Stable job identity; equals the debounce id.
    pub job_id: String,

    /// The workspace the job belongs to, for routing.
    pub workspace_id: WorkspaceId,

    /// The job kind tag.
    pub kind: JobKind,

    /// The payload handed to the executor when the job fires.
    pub payload: DebouncePayload,
}

impl QueueItem {
    /// Builds the debounce job for a payload.
    #[must_use]
    pub fn debounce(payload: DebouncePayload) -> Self {
        Self {
            job_id: payload.debounce_id.to_string(),
            workspace_id: payload.workspace_id,
            kind: JobKind::Debounce,
            payload,
        }
    }
}

/// Options for enqueueing a job.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOpts {
    /// Target a non-default shard.
    pub shard: Option<QueueShard>,
}

impl EnqueueOpts {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets a specific shard.
    #[must_use]
    pub fn with_shard(mut self, shard: QueueShard) -> Self {
        self.shard = Some(shard);
        self
    }
}

/// Errors surfaced by delay-queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The job is leased by a worker and cannot be moved.
    #[error("queue item '{job_id}' is already leased")]
    AlreadyLeased {
        /// The contested job id.
        job_id: String,
    },

    /// No job exists under the given id.
    #[error("queue item not found: {job_id}")]
    NotFound {
        /// The job id that was looked up.
        job_id: String,
    },

    /// A queue storage operation failed.
    #[error("queue storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },
}

/// The scheduling contract the coordinator consumes.
///
/// Implementations must guarantee that a successful requeue to time `T'`
/// supersedes any prior schedule for the same job id.
#[async_trait]
pub trait DelayQueue: Send + Sync {
    /// Enqueues a job to fire at an absolute time.
    async fn enqueue(
        &self,
        item: QueueItem,
        at: DateTime<Utc>,
        opts: EnqueueOpts,
    ) -> Result<(), QueueError>;

    /// Moves an existing job to a new absolute time.
    ///
    /// # Errors
    ///
    /// - [`QueueError::AlreadyLeased`] if a worker holds the job's lease
    /// - [`QueueError::NotFound`] if no job exists under `job_id`
    async fn requeue_by_job_id(
        &self,
        shard: &QueueShard,
        job_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), QueueError>;
}

/// Derives the queue-item hash key for a job id.
///
/// The scripted lease check addresses queue items by this hash rather than
/// the raw id, so the derivation is shared between the queue (which stores
/// records under it) and the coordinator (which passes it as a script arg).
#[must_use]
pub fn hash_job_id(job_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job_id.as_bytes());
    let hash = hasher.finalize();

    // First 16 bytes = 128 bits, plenty for a keyed lookup.
    hex::encode(hash.get(..16).unwrap_or(&hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lull_core::{AccountId, AppId, DebounceId, FunctionId};

    fn sample_payload() -> DebouncePayload {
        DebouncePayload {
            debounce_id: DebounceId::generate(),
            account_id: AccountId::generate(),
            workspace_id: WorkspaceId::generate(),
            app_id: AppId::generate(),
            function_id: FunctionId::generate(),
            function_version: 1,
        }
    }

    #[test]
    fn debounce_job_id_is_the_debounce_id() {
        let payload = sample_payload();
        let expected = payload.debounce_id.to_string();
        let item = QueueItem::debounce(payload);
        assert_eq!(item.job_id, expected);
        assert_eq!(item.kind, JobKind::Debounce);
    }

    #[test]
    fn queue_item_serializes() {
        let item = QueueItem::debounce(sample_payload());
        let json = serde_json::to_string(&item).unwrap();
        let parsed: QueueItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, parsed);
    }

    #[test]
    fn hash_job_id_is_stable_and_distinct() {
        let a = DebounceId::generate().to_string();
        let b = DebounceId::generate().to_string();

        assert_eq!(hash_job_id(&a), hash_job_id(&a));
        assert_ne!(hash_job_id(&a), hash_job_id(&b));
        assert_eq!(hash_job_id(&a).len(), 32);
    }

    #[test]
    fn default_shard_is_named_default() {
        assert_eq!(QueueShard::default().name(), "default");
    }

    #[test]
    fn enqueue_opts_builder() {
        let opts = EnqueueOpts::new().with_shard(QueueShard::new("eu-west"));
        assert_eq!(opts.shard.unwrap().name(), "eu-west");
    }
}
