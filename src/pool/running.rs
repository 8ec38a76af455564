//! # Running set.
//!
//! Tracks every admitted task until its launcher future returns. Each entry
//! is a [`RunningTaskHandle`]: the job metadata, the admission instant, the
//! child cancellation token and the write-once result sink.
//!
//! ## States
//! ```text
//! admitted ──► Running ──(watchdog: cancellable overrun)──► Cancelled ──► exit (removed)
//!                 │
//!                 └─(watchdog: uncancellable overrun)──► Running + flagged
//!                 ├─(awaits a nested batch)──► Parked ──(wait returns)──► Running
//!                 └─(exit)──► removed
//! ```
//! Neither a `Cancelled` nor a `Parked` handle counts toward concurrency: the
//! slot is free for the next admission. A parked task's watchdog clock is
//! stopped while it waits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::tasks::TaskId;
use crate::tasks::job::{JobMeta, ResultSink};

tokio::task_local! {
    /// Id of the admitted task whose launcher is being polled.
    pub(crate) static CURRENT_TASK: TaskId;
}

/// Lifecycle of an admitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunState {
    /// Holds a concurrency slot.
    Running,
    /// Revoked by the watchdog; waiting for the future to return.
    Cancelled {
        /// When the watchdog revoked the task.
        at: Instant,
    },
    /// Waiting on work it submitted to the same pool; slot lent out.
    Parked {
        /// When the wait started.
        since: Instant,
    },
}

pub(crate) struct RunningTaskHandle {
    pub meta: JobMeta,
    pub admitted_at: Instant,
    pub token: CancellationToken,
    pub sink: Arc<dyn ResultSink>,
    pub cancel_hook: Arc<dyn Fn() + Send + Sync>,
    pub state: RunState,
    /// Time spent parked in completed waits.
    pub parked_for: Duration,
    /// Overrun already reported for an uncancellable task.
    pub flagged: bool,
    /// `CancellationIgnored` already reported.
    pub ignore_reported: bool,
}

impl RunningTaskHandle {
    #[inline]
    pub(crate) fn holds_slot(&self) -> bool {
        self.state == RunState::Running
    }

    /// Time since admission, minus the time spent parked.
    pub(crate) fn active_elapsed(&self, now: Instant) -> Duration {
        let parked = match self.state {
            RunState::Parked { since } => self.parked_for + now.saturating_duration_since(since),
            _ => self.parked_for,
        };
        now.saturating_duration_since(self.admitted_at)
            .saturating_sub(parked)
    }
}

/// Admitted tasks keyed by id.
#[derive(Default)]
pub(crate) struct RunningSet {
    handles: HashMap<TaskId, RunningTaskHandle>,
}

impl RunningSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Tasks holding a concurrency slot.
    pub(crate) fn live(&self) -> usize {
        self.handles.values().filter(|h| h.holds_slot()).count()
    }

    /// Running tasks flagged as uncancellable overruns.
    pub(crate) fn flagged(&self) -> usize {
        self.handles
            .values()
            .filter(|h| h.holds_slot() && h.flagged)
            .count()
    }

    /// Revoked tasks whose future has not returned yet.
    pub(crate) fn lingering(&self) -> usize {
        self.handles
            .values()
            .filter(|h| matches!(h.state, RunState::Cancelled { .. }))
            .count()
    }

    /// Tasks waiting on nested work with their slot lent out.
    pub(crate) fn parked(&self) -> usize {
        self.handles
            .values()
            .filter(|h| matches!(h.state, RunState::Parked { .. }))
            .count()
    }

    /// Every tracked task, live or lingering.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub(crate) fn insert(&mut self, handle: RunningTaskHandle) {
        self.handles.insert(handle.meta.id, handle);
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut RunningTaskHandle> {
        self.handles.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<RunningTaskHandle> {
        self.handles.remove(&id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RunningTaskHandle> {
        self.handles.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RunningTaskHandle> {
        self.handles.values_mut()
    }
}
