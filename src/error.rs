//! Error types used by the genvisor runtime and tasks.
//!
//! This module defines the error enums surfaced by the scheduler:
//!
//! - [`SubmitError`] — a submission was refused (backpressure or closed pool).
//! - [`TaskError`] — an individual task did not produce a value.
//! - [`BatchError`] — a batch could not be completed under its failure policy.
//! - [`ConfigError`] — a [`PoolConfig`](crate::PoolConfig) violates its invariants.
//! - [`TelemetryError`] — a telemetry read failed (absorbed by the sampler).
//! - [`RuntimeError`] — shutdown did not complete within the grace period.
//!
//! All of them provide `as_label` (stable snake_case for logs/metrics).

use std::time::Duration;
use thiserror::Error;

use crate::tasks::Priority;

/// # Errors produced by the genvisor runtime.
///
/// These represent failures of the scheduler itself, such as a shutdown
/// sequence exceeding its grace period.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some tasks were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Labels of the tasks that did not exit in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use genvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// Error returned when the task pool refuses a submission.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The queue cannot hold the submission and its priority is not exempt
    /// from backpressure. Recoverable: retry later or shrink the batch.
    #[error(
        "pool saturated: {requested} {priority:?} task(s) refused ({queued}/{capacity} queued)"
    )]
    Saturated {
        /// Priority of the refused submission.
        priority: Priority,
        /// Number of tasks that were requested.
        requested: usize,
        /// Tasks queued at the time of the refusal.
        queued: usize,
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The scheduler has been shut down.
    #[error("pool closed")]
    Closed,
}

impl SubmitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::Saturated { .. } => "pool_saturated",
            SubmitError::Closed => "pool_closed",
        }
    }
}

/// # Errors produced by task execution.
///
/// `Fail` and `Panicked` mean the task ran and failed. `WatchdogCancelled` means
/// the task was stopped for running too long; `Canceled` means it never ran
/// to completion because its batch was abandoned or the scheduler shut down.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The watchdog cancelled the task after it overran its estimate.
    #[error("cancelled by watchdog after {elapsed:?} (budget {budget:?})")]
    WatchdogCancelled {
        /// Time the task had been running when it was cancelled.
        elapsed: Duration,
        /// `estimated_duration * overrun_factor`.
        budget: Duration,
    },

    /// Task was cancelled before producing a result (batch abandoned, fail-fast, shutdown).
    #[error("context cancelled")]
    Canceled,

    /// The executor panicked.
    #[error("task panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl TaskError {
    /// Convenience constructor for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use genvisor::TaskError;
    ///
    /// assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::WatchdogCancelled { .. } => "task_watchdog_cancelled",
            TaskError::Canceled => "task_canceled",
            TaskError::Panicked { .. } => "task_panicked",
        }
    }

    /// Returns `true` when the task ran and its executor reported a failure.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, TaskError::Fail { .. } | TaskError::Panicked { .. })
    }
}

/// Errors returned when awaiting a batch.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// The batch was refused at submission.
    #[error("batch rejected: {0}")]
    Rejected(#[from] SubmitError),

    /// Fail-fast batch: the task at `index` failed and the rest was abandoned.
    #[error("task #{index} failed: {error}")]
    TaskFailed {
        /// Submission index of the first failed task.
        index: usize,
        /// Its error.
        error: TaskError,
    },

    /// Result channels were dropped before every task reached a terminal state.
    #[error("batch aborted")]
    Aborted,
}

impl BatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BatchError::Rejected(_) => "batch_rejected",
            BatchError::TaskFailed { .. } => "batch_task_failed",
            BatchError::Aborted => "batch_aborted",
        }
    }
}

/// A [`PoolConfig`](crate::PoolConfig) that violates its invariants.
///
/// Raised by `validate`, `SchedulerBuilder::build` and `Scheduler::configure`;
/// never at runtime.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `min_concurrency` must be at least 1.
    #[error("min_concurrency must be >= 1")]
    ZeroMinConcurrency,

    /// `max_concurrency` is below `min_concurrency`.
    #[error("max_concurrency {max} < min_concurrency {min}")]
    MaxBelowMin {
        /// Configured minimum.
        min: usize,
        /// Configured maximum.
        max: usize,
    },

    /// `default_concurrency` is outside `[min, max]`.
    #[error("default_concurrency {default} outside [{min}, {max}]")]
    DefaultOutOfRange {
        /// Configured minimum.
        min: usize,
        /// Configured default.
        default: usize,
        /// Configured maximum.
        max: usize,
    },

    /// `emergency_memory_pressure` must lie strictly inside (0, 1).
    #[error("emergency_memory_pressure {0} must be in (0, 1)")]
    EmergencyMemoryPressure(f64),

    /// `emergency_frame_rate` must be finite and positive.
    #[error("emergency_frame_rate {0} must be > 0")]
    EmergencyFrameRate(f64),

    /// `overrun_factor` must be at least 1.
    #[error("overrun_factor must be >= 1")]
    OverrunFactor,

    /// `queue_capacity` must be at least 1.
    #[error("queue_capacity must be >= 1")]
    ZeroQueueCapacity,

    /// A cadence or timeout field is zero.
    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::ZeroMinConcurrency => "config_zero_min",
            ConfigError::MaxBelowMin { .. } => "config_max_below_min",
            ConfigError::DefaultOutOfRange { .. } => "config_default_out_of_range",
            ConfigError::EmergencyMemoryPressure(_) => "config_emergency_memory_pressure",
            ConfigError::EmergencyFrameRate(_) => "config_emergency_frame_rate",
            ConfigError::OverrunFactor => "config_overrun_factor",
            ConfigError::ZeroQueueCapacity => "config_zero_queue_capacity",
            ConfigError::ZeroDuration(_) => "config_zero_duration",
        }
    }
}

/// Errors produced by a [`TelemetryProvider`](crate::TelemetryProvider).
///
/// Never propagated to callers: the sampler replaces a failed read with a
/// conservative fallback snapshot.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    /// The provider did not answer within the sampling timeout.
    #[error("telemetry read timed out after {0:?}")]
    Timeout(Duration),

    /// The provider could not read its counters.
    #[error("telemetry unavailable: {0}")]
    Unavailable(String),

    /// The provider returned a value that is not a valid reading.
    #[error("invalid telemetry value for {metric}: {value}")]
    Invalid {
        /// Metric name.
        metric: &'static str,
        /// Offending value.
        value: f64,
    },
}

impl TelemetryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TelemetryError::Timeout(_) => "telemetry_timeout",
            TelemetryError::Unavailable(_) => "telemetry_unavailable",
            TelemetryError::Invalid { .. } => "telemetry_invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_failure_classification() {
        assert!(TaskError::fail("boom").is_execution_failure());
        assert!(
            TaskError::Panicked {
                info: "x".into()
            }
            .is_execution_failure()
        );
        assert!(!TaskError::Canceled.is_execution_failure());
        assert!(
            !TaskError::WatchdogCancelled {
                elapsed: Duration::from_secs(6),
                budget: Duration::from_secs(5),
            }
            .is_execution_failure()
        );
    }

    #[test]
    fn test_batch_error_from_submit() {
        let err: BatchError = SubmitError::Closed.into();
        assert_eq!(err.as_label(), "batch_rejected");
        assert_eq!(err, BatchError::Rejected(SubmitError::Closed));
    }
}
