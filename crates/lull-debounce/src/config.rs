//! Coordinator tunables with documented defaults.

use std::time::Duration;

/// Configuration for [`StoreDebouncer`](crate::debouncer::StoreDebouncer).
///
/// The defaults are production values; tests shrink the retry knobs to keep
/// suites fast.
#[derive(Debug, Clone)]
pub struct DebouncerConfig {
    /// How many times the create/update loop restarts after a retryable
    /// failure before surfacing the error. Default: 5.
    pub max_update_attempts: u32,

    /// How long to wait between restarts. Long enough to outlast the
    /// in-script lease window of a job that is being claimed. Default: 750 ms.
    pub retry_backoff: Duration,

    /// Completion deadline for one `updateDebounce` round trip. A stuck
    /// mutation elapses here and re-enters the retry loop rather than hanging
    /// the caller. Default: 5 s.
    pub update_deadline: Duration,

    /// Safety margin added to every scheduled firing time, on top of the one
    /// second reserved for a concurrent update to finish. Default: 50 ms.
    pub enqueue_buffer: Duration,

    /// Namespace prefix for all store keys. Default: `"lull"`.
    pub key_prefix: String,
}

impl Default for DebouncerConfig {
    fn default() -> Self {
        Self {
            max_update_attempts: 5,
            retry_backoff: Duration::from_millis(750),
            update_deadline: Duration::from_secs(5),
            enqueue_buffer: Duration::from_millis(50),
            key_prefix: "lull".to_string(),
        }
    }
}

impl DebouncerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry attempt budget.
    #[must_use]
    pub const fn with_max_update_attempts(mut self, attempts: u32) -> Self {
        self.max_update_attempts = attempts;
        self
    }

    /// Sets the backoff between retry attempts.
    #[must_use]
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the `updateDebounce` completion deadline.
    #[must_use]
    pub const fn with_update_deadline(mut self, deadline: Duration) -> Self {
        self.update_deadline = deadline;
        self
    }

    /// Sets the scheduling safety margin.
    #[must_use]
    pub const fn with_enqueue_buffer(mut self, buffer: Duration) -> Self {
        self.enqueue_buffer = buffer;
        self
    }

    /// Sets the store key namespace prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}
