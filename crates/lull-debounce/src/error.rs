//! Error types for the debounce domain.

use lull_core::DebounceId;

use crate::queue::QueueError;

/// The result type used throughout lull-debounce.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in debounce operations.
///
/// [`Error::Exists`] is an internal sentinel: the coordinator matches it to
/// switch from the create path to the update path, and it never crosses the
/// public [`Debouncer`](crate::debouncer::Debouncer) API. [`Error::InProgress`],
/// [`Error::NotFound`] and [`Error::DeadlineExceeded`] drive the bounded retry
/// loop; everything else is fatal to the call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The function has no debounce config, or its durations are unparseable.
    #[error("invalid debounce config: {message}")]
    InvalidConfig {
        /// Description of what made the config invalid.
        message: String,
    },

    /// A debounce window already exists for this key.
    ///
    /// Internal sentinel; carries the id of the existing window so the
    /// coordinator can extend it.
    #[error("a debounce exists for this function: {debounce_id}")]
    Exists {
        /// The id of the window that already holds the pointer.
        debounce_id: DebounceId,
    },

    /// The window is being claimed for execution, or just finished.
    #[error("debounce is in progress")]
    InProgress,

    /// No stored item exists for the given debounce id.
    #[error("debounce not found: {debounce_id}")]
    NotFound {
        /// The id that was looked up.
        debounce_id: DebounceId,
    },

    /// The stored item exists but could not be deserialized.
    #[error("corrupt debounce item {debounce_id}: {message}")]
    Corrupt {
        /// The id whose payload is corrupt.
        debounce_id: DebounceId,
        /// Description of the deserialization failure.
        message: String,
    },

    /// An item could not be serialized for storage.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The update mutation exceeded its completion deadline.
    #[error("debounce update exceeded its deadline")]
    DeadlineExceeded,

    /// A script returned a value outside its protocol.
    #[error("script {script} returned unrecognized value: {value}")]
    Protocol {
        /// The script that misbehaved.
        script: &'static str,
        /// The value it returned, rendered for diagnostics.
        value: String,
    },

    /// The embedded script registry failed to assemble.
    #[error("script load error: {message}")]
    ScriptLoad {
        /// Description of the load failure.
        message: String,
    },

    /// The create/update retry budget is spent.
    #[error("unable to update debounce after {attempts} attempts")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The final retryable error.
        #[source]
        source: Box<Error>,
    },

    /// A store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A delay-queue operation failed and was not translated to a sentinel.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// An error from lull-core.
    #[error("core error: {0}")]
    Core(#[from] lull_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if the error should restart the create/update loop.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InProgress | Self::NotFound { .. } | Self::DeadlineExceeded
        )
    }
}
