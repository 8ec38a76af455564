//! # Priorities, resource estimates and identifiers.
//!
//! An [`Estimate`] is the caller's prediction of what a task will cost. The
//! controller sizes admission from the memory figure; the watchdog judges
//! overruns from the duration figure.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Global counter for task identifiers.
static TASK_SEQ: AtomicU64 = AtomicU64::new(1);
/// Global counter for batch identifiers.
static BATCH_SEQ: AtomicU64 = AtomicU64::new(1);

/// Coarse importance tag controlling queue order and backpressure exemption.
///
/// Admission drains higher priorities first; `Critical` and `High` are never
/// rejected by backpressure, only delayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    /// Essential work (e.g. chunks under the player).
    Critical,
    /// Important, latency-sensitive work.
    High,
    /// Regular generation work.
    #[default]
    Normal,
    /// Speculative work (e.g. chunks at view distance).
    Low,
    /// Work that only runs when nothing else waits.
    Background,
}

impl Priority {
    /// All priorities in admission order (highest first).
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Background,
    ];

    /// Position of this priority in [`Priority::ALL`].
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
            Priority::Background => 4,
        }
    }

    /// Whether submissions at this priority are exempt from backpressure.
    #[inline]
    pub const fn bypasses_backpressure(self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }

    /// Returns a short stable label for logs/metrics.
    pub const fn as_label(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Background => "background",
        }
    }
}

/// Caller-supplied prediction of a task's memory and time cost.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use genvisor::{Estimate, Priority};
///
/// let est = Estimate::new(20_000_000, Duration::from_millis(40)).with_priority(Priority::High);
/// assert_eq!(est.memory_bytes, 20_000_000);
/// assert_eq!(est.priority, Priority::High);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    /// Expected peak memory of one task, in bytes (`0` = not memory bound).
    pub memory_bytes: u64,
    /// Expected wall-clock duration of one task.
    pub duration: Duration,
    /// Priority of the task.
    pub priority: Priority,
}

impl Estimate {
    /// Creates an estimate with [`Priority::Normal`].
    pub fn new(memory_bytes: u64, duration: Duration) -> Self {
        Self {
            memory_bytes,
            duration,
            priority: Priority::Normal,
        }
    }

    /// Returns a copy with the given priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Time after which the watchdog considers the task anomalously slow.
    pub fn overrun_budget(&self, overrun_factor: u32) -> Duration {
        self.duration.saturating_mul(overrun_factor)
    }
}

impl Default for Estimate {
    /// 16 MiB, 50ms, normal priority.
    fn default() -> Self {
        Self::new(16 * 1024 * 1024, Duration::from_millis(50))
    }
}

/// Unique identifier of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(TASK_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Unique identifier of a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

impl BatchId {
    pub(crate) fn next() -> Self {
        BatchId(BATCH_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}
