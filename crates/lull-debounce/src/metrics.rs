//! Observability metrics for the debounce coordinator.
//!
//! Exposed via the `metrics` crate facade; recording is a no-op until an
//! exporter installs a recorder.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `lull_debounce_windows_total` | Counter | `outcome` | Window mutations by outcome |
//! | `lull_debounce_retries_total` | Counter | `attempt` | Create/update loop restarts |
//! | `lull_debounce_executions_total` | Counter | `result` | Pointer rotations at claim time |

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: window mutations by outcome.
    pub const WINDOWS_TOTAL: &str = "lull_debounce_windows_total";
    /// Counter: create/update loop restarts.
    pub const RETRIES_TOTAL: &str = "lull_debounce_retries_total";
    /// Counter: pointer rotations at claim time.
    pub const EXECUTIONS_TOTAL: &str = "lull_debounce_executions_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Window mutation outcome (created, extended, stale, conflict).
    pub const OUTCOME: &str = "outcome";
    /// Rotation result (claimed, superseded).
    pub const RESULT: &str = "result";
}

/// High-level interface for recording debounce metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Default)]
pub struct DebounceMetrics;

impl DebounceMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records a window mutation outcome.
    pub fn record_window(&self, outcome: &'static str) {
        counter!(names::WINDOWS_TOTAL, labels::OUTCOME => outcome).increment(1);
    }

    /// Records one restart of the create/update loop.
    pub fn record_retry(&self, attempt: u32) {
        counter!(names::RETRIES_TOTAL, "attempt" => attempt.to_string()).increment(1);
    }

    /// Records a pointer rotation at claim time.
    pub fn record_execution(&self, result: &'static str) {
        counter!(names::EXECUTIONS_TOTAL, labels::RESULT => result).increment(1);
    }
}
