//! # Runtime events emitted by the scheduler.
//!
//! The [`EventKind`] enum classifies event types across five categories:
//! - **Task lifecycle**: queued, rejected, admitted, completed, failed, cancelled
//! - **Concurrency control**: target adjustments and emergency triggers
//! - **Diagnostics**: telemetry fallback, watchdog overruns, ignored cancellation
//! - **Batch / runtime**: batch submitted/finished, config reload, shutdown
//! - **Subscriber health**: overflow and panics
//!
//! The [`Event`] struct carries optional metadata (task label, ids, priority,
//! concurrency figures, timings, reason) depending on the kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use genvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ConcurrencyAdjusted)
//!     .with_concurrency(4, 2)
//!     .with_reason("memory_emergency");
//!
//! assert_eq!(ev.previous, Some(4));
//! assert_eq!(ev.target, Some(2));
//! assert_eq!(ev.reason.as_deref(), Some("memory_emergency"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::tasks::{BatchId, Priority, TaskId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Task lifecycle ===
    /// Tasks entered the queue.
    ///
    /// Sets: `batch`, `priority`, `count`.
    TaskQueued,

    /// Submission refused by backpressure.
    ///
    /// Sets: `priority`, `count`, `reason`.
    TaskRejected,

    /// Task admitted into a concurrency slot.
    ///
    /// Sets: `task`, `task_id`, `batch`, `index`, `priority`, `target`.
    TaskAdmitted,

    /// Task completed and its value was delivered.
    ///
    /// Sets: `task`, `task_id`, `batch`, `index`, `elapsed_ms`.
    TaskCompleted,

    /// Task ran and failed.
    ///
    /// Sets: `task`, `task_id`, `batch`, `index`, `elapsed_ms`, `reason`.
    TaskFailed,

    /// Task was cancelled (watchdog, batch abandonment or shutdown).
    ///
    /// Sets: `task`, `task_id`, `batch`, `index`, `reason`.
    TaskCancelled,

    // === Concurrency control ===
    /// Target concurrency changed.
    ///
    /// Sets: `previous`, `target`, `reason` (decision branch label).
    ConcurrencyAdjusted,

    /// A snapshot crossed the emergency memory threshold; re-evaluated out of band.
    ///
    /// Sets: `previous`, `target`, `reason`.
    EmergencyTriggered,

    // === Diagnostics ===
    /// Telemetry read failed; the conservative fallback snapshot was used.
    ///
    /// Sets: `reason`.
    TelemetryUnavailable,

    /// A running task exceeded `estimate * overrun_factor`.
    ///
    /// Sets: `task`, `task_id`, `batch`, `index`, `elapsed_ms`, `budget_ms`.
    WatchdogOverrun,

    /// An overrunning task cannot be cancelled; it keeps its slot.
    ///
    /// Sets: `task`, `task_id`, `elapsed_ms`.
    CancellationUnsupported,

    /// A cancelled task still has not returned one watchdog cycle later.
    ///
    /// Sets: `task`, `task_id`, `elapsed_ms`.
    CancellationIgnored,

    // === Batch / runtime ===
    /// A batch was accepted.
    ///
    /// Sets: `batch`, `priority`, `count`.
    BatchSubmitted,

    /// Every task of a batch reached a terminal state (or fail-fast tripped).
    ///
    /// Sets: `batch`, `count`, `reason` (`"ok"`, `"partial"`, `"failed"`).
    BatchFinished,

    /// A new configuration was applied.
    ///
    /// Sets: `previous`, `target`.
    ConfigReloaded,

    /// Shutdown requested.
    ShutdownRequested,

    /// All running tasks exited within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some tasks did not exit in time.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task (executor) label, or subscriber name for subscriber events.
    pub task: Option<Arc<str>>,
    /// Task identifier.
    pub task_id: Option<TaskId>,
    /// Batch identifier.
    pub batch: Option<BatchId>,
    /// Submission index inside the batch.
    pub index: Option<usize>,
    /// Priority of the task or submission.
    pub priority: Option<Priority>,
    /// Number of tasks concerned.
    pub count: Option<usize>,
    /// Target concurrency after the event.
    pub target: Option<usize>,
    /// Target concurrency before the event.
    pub previous: Option<usize>,
    /// Elapsed running time in milliseconds (compact).
    pub elapsed_ms: Option<u32>,
    /// Overrun budget in milliseconds (compact).
    pub budget_ms: Option<u32>,
    /// Human-readable reason (errors, decision branch, overflow details).
    pub reason: Option<Arc<str>>,
}

#[inline]
fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            task_id: None,
            batch: None,
            index: None,
            priority: None,
            count: None,
            target: None,
            previous: None,
            elapsed_ms: None,
            budget_ms: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task label.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a task identifier.
    #[inline]
    pub fn with_task_id(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }

    /// Attaches a batch identifier (if any).
    #[inline]
    pub fn with_batch(mut self, batch: Option<BatchId>) -> Self {
        self.batch = batch;
        self
    }

    /// Attaches a submission index.
    #[inline]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Attaches a priority.
    #[inline]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Attaches a task count.
    #[inline]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Attaches the current target concurrency only.
    #[inline]
    pub fn with_target(mut self, target: usize) -> Self {
        self.target = Some(target);
        self
    }

    /// Attaches a concurrency transition `previous → target`.
    #[inline]
    pub fn with_concurrency(mut self, previous: usize, target: usize) -> Self {
        self.previous = Some(previous);
        self.target = Some(target);
        self
    }

    /// Attaches an elapsed running time (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(compact_ms(d));
        self
    }

    /// Attaches an overrun budget (stored as milliseconds).
    #[inline]
    pub fn with_budget(mut self, d: Duration) -> Self {
        self.budget_ms = Some(compact_ms(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::TaskQueued);
        let b = Event::new(EventKind::TaskQueued);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_durations_are_compacted() {
        let ev = Event::new(EventKind::WatchdogOverrun)
            .with_elapsed(Duration::from_secs(u64::MAX))
            .with_budget(Duration::from_millis(250));
        assert_eq!(ev.elapsed_ms, Some(u32::MAX));
        assert_eq!(ev.budget_ms, Some(250));
    }
}
