//! # LogWriter: events rendered through `tracing`.
//!
//! Routine lifecycle events go to `debug`/`trace`, concurrency changes to
//! `info`, anything an operator should look at (emergencies, overruns,
//! lingering tasks, grace exceeded) to `warn`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  genvisor: concurrency adjusted previous=4 target=8 reason="headroom"
//! WARN  genvisor: memory emergency previous=8 target=2 reason="memory_emergency"
//! WARN  genvisor: watchdog overrun task="erosion" id=t17 elapsed_ms=260 budget_ms=250
//! INFO  genvisor: batch finished batch=b3 count=64 outcome="partial"
//! ```

use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Tracing-backed event writer.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        let id = e.task_id.map(|id| id.to_string()).unwrap_or_default();
        let batch = e.batch.map(|b| b.to_string()).unwrap_or_default();

        match e.kind {
            EventKind::TaskQueued => {
                trace!(seq = e.seq, %batch, count = e.count, priority = ?e.priority, "tasks queued");
            }
            EventKind::TaskRejected => {
                debug!(seq = e.seq, %batch, count = e.count, priority = ?e.priority, reason, "submission rejected");
            }
            EventKind::TaskAdmitted => {
                trace!(seq = e.seq, task, %id, %batch, index = e.index, target = e.target, "task admitted");
            }
            EventKind::TaskCompleted => {
                trace!(seq = e.seq, task, %id, %batch, index = e.index, elapsed_ms = e.elapsed_ms, "task completed");
            }
            EventKind::TaskFailed => {
                debug!(seq = e.seq, task, %id, %batch, index = e.index, elapsed_ms = e.elapsed_ms, reason, "task failed");
            }
            EventKind::TaskCancelled => {
                debug!(seq = e.seq, task, %id, %batch, index = e.index, reason, "task cancelled");
            }
            EventKind::ConcurrencyAdjusted => {
                info!(seq = e.seq, previous = e.previous, target = e.target, reason, "concurrency adjusted");
            }
            EventKind::EmergencyTriggered => {
                warn!(seq = e.seq, previous = e.previous, target = e.target, reason, "memory emergency");
            }
            EventKind::TelemetryUnavailable => {
                warn!(seq = e.seq, provider = task, reason, "telemetry unavailable, using fallback");
            }
            EventKind::WatchdogOverrun => {
                warn!(seq = e.seq, task, %id, %batch, elapsed_ms = e.elapsed_ms, budget_ms = e.budget_ms, "watchdog overrun");
            }
            EventKind::CancellationUnsupported => {
                warn!(seq = e.seq, task, %id, elapsed_ms = e.elapsed_ms, "task cannot be cancelled, slot kept");
            }
            EventKind::CancellationIgnored => {
                warn!(seq = e.seq, task, %id, elapsed_ms = e.elapsed_ms, "task ignores cancellation");
            }
            EventKind::BatchSubmitted => {
                debug!(seq = e.seq, %batch, count = e.count, priority = ?e.priority, "batch submitted");
            }
            EventKind::BatchFinished => {
                info!(seq = e.seq, %batch, count = e.count, outcome = reason, "batch finished");
            }
            EventKind::ConfigReloaded => {
                info!(seq = e.seq, previous = e.previous, target = e.target, "config reloaded");
            }
            EventKind::ShutdownRequested => {
                info!(seq = e.seq, "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!(seq = e.seq, "all tasks stopped within grace");
            }
            EventKind::GraceExceeded => {
                warn!(seq = e.seq, reason, "grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                warn!(seq = e.seq, subscriber = task, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(seq = e.seq, subscriber = task, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
