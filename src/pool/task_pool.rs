//! # Task pool.
//!
//! Holds the priority queues, the running set and the concurrency
//! controller behind one lock, and drives admission from a single periodic
//! [`tick`](TaskPool::tick).
//!
//! ## Tick
//! ```text
//! tick()
//!   ├─ gate busy?            → skip (overlapping ticks never run)
//!   ├─ sample telemetry      (bounded by telemetry_timeout, fallback on failure)
//!   ├─ reap releases         (exited tasks leave the running set)
//!   ├─ estimate              = head of highest non-empty lane, else the last one
//!   ├─ controller.refresh    → ConcurrencyAdjusted / EmergencyTriggered
//!   └─ while live < target   → pop + spawn launcher (TaskAdmitted)
//! ```
//!
//! ## Rules
//! - Only `tick` admits tasks and only `tick` changes the target; the two
//!   never race.
//! - Launchers report their exit through an unbounded channel owned by the
//!   tick gate; exits are applied at the next tick (or by `reap`).
//! - Submissions are all-or-nothing: a batch either fits the queue or is
//!   refused as a whole. `Critical` and `High` are never refused for capacity.
//! - Admitting a task never waits on memory or on the queue; a shrinking
//!   target only stops admission, running tasks keep their slot.
//! - A task awaiting a batch or task of the same pool is parked for the
//!   duration of the wait: its slot goes to the nested work, so batches of
//!   batches share the single admission point without starving it. On
//!   resume the parent takes its slot back even if that briefly puts the
//!   pool above target; the next ticks admit nothing until it is absorbed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::queue::PriorityQueues;
use super::running::{CURRENT_TASK, RunState, RunningSet, RunningTaskHandle};
use crate::config::PoolConfig;
use crate::controller::{Adjustment, ConcurrencyController, DecisionReason};
use crate::error::{SubmitError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::job::{Job, JobExit};
use crate::tasks::{BatchId, Estimate, Priority, TaskId};
use crate::telemetry::MetricsSnapshot;
use crate::telemetry::sampler::TelemetrySampler;

/// Exit notification sent by a launcher when its future returns.
struct Release {
    id: TaskId,
    exit: JobExit,
    at: Instant,
}

/// Outcome of one [`tick`](crate::Scheduler::tick).
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    /// `true` when another tick was still in progress and this one did nothing.
    pub skipped: bool,
    /// Target concurrency after the tick.
    pub target: usize,
    /// Tasks holding a slot after admission.
    pub running: usize,
    /// Tasks admitted by this tick.
    pub admitted: usize,
    /// Exited tasks removed from the running set.
    pub reaped: usize,
    /// Tasks still queued.
    pub queued: usize,
    /// Target change made by this tick, if any.
    pub adjustment: Option<Adjustment>,
    /// Snapshot the decision used.
    pub snapshot: Option<MetricsSnapshot>,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            target: 0,
            running: 0,
            admitted: 0,
            reaped: 0,
            queued: 0,
            adjustment: None,
            snapshot: None,
        }
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// Current target concurrency.
    pub target: usize,
    /// Tasks holding a slot.
    pub running: usize,
    /// Admitted tasks waiting on nested work, their slot lent out.
    pub parked: usize,
    /// Running tasks that overran and cannot be cancelled.
    pub flagged: usize,
    /// Tasks revoked by the watchdog whose future has not returned.
    pub lingering: usize,
    /// Queued tasks per priority, in [`Priority::ALL`] order.
    pub queued: [usize; 5],
    /// Configured queue capacity.
    pub queue_capacity: usize,
    /// Branch of the last controller evaluation.
    pub last_reason: Option<DecisionReason>,
    /// `true` once shutdown started.
    pub closed: bool,
}

impl PoolStatus {
    /// Total queued tasks.
    pub fn queued_total(&self) -> usize {
        self.queued.iter().sum()
    }

    /// Queued tasks of `priority`.
    pub fn queued_at(&self, priority: Priority) -> usize {
        self.queued[priority.index()]
    }
}

pub(crate) struct PoolState {
    pub cfg: Arc<PoolConfig>,
    pub queue: PriorityQueues,
    pub running: RunningSet,
    pub controller: ConcurrencyController,
    last_estimate: Option<Estimate>,
    pub closed: bool,
}

/// Adaptive task pool.
pub(crate) struct TaskPool {
    state: Mutex<PoolState>,
    /// Serializes ticks; owns the release receiver.
    gate: tokio::sync::Mutex<mpsc::UnboundedReceiver<Release>>,
    releases: mpsc::UnboundedSender<Release>,
    sampler: TelemetrySampler,
    bus: Bus,
    runtime_token: CancellationToken,
}

impl TaskPool {
    pub(crate) fn new(
        cfg: Arc<PoolConfig>,
        sampler: TelemetrySampler,
        bus: Bus,
        runtime_token: CancellationToken,
    ) -> Self {
        let (releases, rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(PoolState {
                controller: ConcurrencyController::new(&cfg),
                cfg,
                queue: PriorityQueues::new(),
                running: RunningSet::new(),
                last_estimate: None,
                closed: false,
            }),
            gate: tokio::sync::Mutex::new(rx),
            releases,
            sampler,
            bus,
            runtime_token,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn config(&self) -> Arc<PoolConfig> {
        Arc::clone(&self.lock().cfg)
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    pub(crate) fn sampler(&self) -> &TelemetrySampler {
        &self.sampler
    }

    /// Enqueues `jobs` at `priority`, all or none.
    pub(crate) fn submit(
        &self,
        jobs: Vec<Job>,
        priority: Priority,
        batch: Option<BatchId>,
    ) -> Result<(), SubmitError> {
        let requested = jobs.len();
        let mut st = self.lock();
        if st.closed {
            return Err(SubmitError::Closed);
        }

        let queued = st.queue.len();
        let capacity = st.cfg.queue_capacity;
        if !priority.bypasses_backpressure() && queued + requested > capacity {
            drop(st);
            let err = SubmitError::Saturated {
                priority,
                requested,
                queued,
                capacity,
            };
            debug!(priority = priority.as_label(), requested, queued, capacity, "submission refused");
            self.bus.publish(
                Event::new(EventKind::TaskRejected)
                    .with_batch(batch)
                    .with_priority(priority)
                    .with_count(requested)
                    .with_reason(err.as_label()),
            );
            return Err(err);
        }

        for mut job in jobs {
            job.meta.estimate.priority = priority;
            st.queue.push(job);
        }
        drop(st);

        trace!(priority = priority.as_label(), requested, "tasks queued");
        self.bus.publish(
            Event::new(EventKind::TaskQueued)
                .with_batch(batch)
                .with_priority(priority)
                .with_count(requested),
        );
        Ok(())
    }

    /// Samples telemetry, reaps exits, refreshes the target and admits tasks.
    pub(crate) async fn tick(&self) -> TickReport {
        let Ok(mut releases) = self.gate.try_lock() else {
            warn!("previous tick still running, skipping");
            return TickReport::skipped();
        };

        let cfg = self.config();
        let snapshot = self.sampler.sample(&cfg).await;
        let now = Instant::now();

        let mut st = self.lock();
        let reaped = self.drain_releases(&mut st, &mut releases);
        if st.closed {
            return TickReport {
                skipped: false,
                target: st.controller.target(),
                running: st.running.live(),
                admitted: 0,
                reaped,
                queued: st.queue.len(),
                adjustment: None,
                snapshot: Some(snapshot),
            };
        }

        let estimate = st
            .queue
            .peek_estimate()
            .or(st.last_estimate)
            .unwrap_or_default();
        st.last_estimate = Some(estimate);

        let running = st.running.live();
        let cfg = Arc::clone(&st.cfg);
        let adjustment = st
            .controller
            .refresh(&cfg, &snapshot, &estimate, running, now);
        if let Some(adj) = adjustment {
            self.publish_adjustment(&adj);
        }

        let target = st.controller.target();
        let mut admitted = 0;
        while st.running.live() < target {
            let Some(job) = st.queue.pop() else { break };
            self.admit(&mut st, job, now, target);
            admitted += 1;
        }

        TickReport {
            skipped: false,
            target,
            running: st.running.live(),
            admitted,
            reaped,
            queued: st.queue.len(),
            adjustment,
            snapshot: Some(snapshot),
        }
    }

    /// Applies pending exits without admitting anything.
    pub(crate) async fn reap(&self) -> usize {
        let mut releases = self.gate.lock().await;
        let mut st = self.lock();
        self.drain_releases(&mut st, &mut releases)
    }

    fn drain_releases(
        &self,
        st: &mut PoolState,
        releases: &mut mpsc::UnboundedReceiver<Release>,
    ) -> usize {
        let mut reaped = 0;
        while let Ok(Release { id, exit, at }) = releases.try_recv() {
            let Some(h) = st.running.remove(id) else {
                continue;
            };
            reaped += 1;
            let elapsed = at.saturating_duration_since(h.admitted_at);

            if let RunState::Cancelled { .. } = h.state {
                debug!(task = %h.meta.label, id = %id, ?elapsed, "revoked task returned");
                continue;
            }

            let ev = |kind| {
                Event::new(kind)
                    .with_task(Arc::clone(&h.meta.label))
                    .with_task_id(id)
                    .with_batch(h.meta.batch)
                    .with_index(h.meta.index)
                    .with_elapsed(elapsed)
            };
            match exit {
                JobExit::Completed => self.bus.publish(ev(EventKind::TaskCompleted)),
                JobExit::Failed(e) => {
                    debug!(task = %h.meta.label, id = %id, error = %e, "task failed");
                    self.bus
                        .publish(ev(EventKind::TaskFailed).with_reason(e.to_string()));
                }
                JobExit::Superseded => self
                    .bus
                    .publish(ev(EventKind::TaskCancelled).with_reason("superseded")),
            }
        }
        reaped
    }

    fn admit(&self, st: &mut PoolState, job: Job, now: Instant, target: usize) {
        let token = self.runtime_token.child_token();
        let meta = job.meta.clone();
        let sink = Arc::clone(&job.sink);
        let cancel_hook = Arc::clone(&job.cancel_hook);

        let id = meta.id;
        let fut = CURRENT_TASK.scope(id, job.launch(token.clone()));
        let releases = self.releases.clone();
        tokio::spawn(async move {
            let exit = fut.await;
            let _ = releases.send(Release {
                id,
                exit,
                at: Instant::now(),
            });
        });

        self.bus.publish(
            Event::new(EventKind::TaskAdmitted)
                .with_task(Arc::clone(&meta.label))
                .with_task_id(id)
                .with_batch(meta.batch)
                .with_index(meta.index)
                .with_priority(meta.estimate.priority)
                .with_target(target),
        );
        st.running.insert(RunningTaskHandle {
            meta,
            admitted_at: now,
            token,
            sink,
            cancel_hook,
            state: RunState::Running,
            parked_for: Duration::ZERO,
            flagged: false,
            ignore_reported: false,
        });
    }

    /// Lends the slot of running task `id` out. Returns `false` if the task
    /// is not running in this pool.
    pub(crate) fn park(&self, id: TaskId) -> bool {
        let mut st = self.lock();
        let Some(h) = st.running.get_mut(id) else {
            return false;
        };
        if h.state != RunState::Running {
            return false;
        }
        h.state = RunState::Parked {
            since: Instant::now(),
        };
        trace!(task = %h.meta.label, id = %id, "task parked on nested work");
        true
    }

    /// Gives a parked task its slot back.
    pub(crate) fn unpark(&self, id: TaskId) {
        let mut st = self.lock();
        let Some(h) = st.running.get_mut(id) else {
            return;
        };
        if let RunState::Parked { since } = h.state {
            h.parked_for += Instant::now().saturating_duration_since(since);
            h.state = RunState::Running;
            trace!(task = %h.meta.label, id = %id, "task resumed");
        }
    }

    fn publish_adjustment(&self, adj: &Adjustment) {
        let kind = if adj.out_of_band || adj.reason == DecisionReason::MemoryEmergency {
            warn!(
                previous = adj.previous,
                target = adj.target,
                reason = adj.reason.as_label(),
                "memory emergency, target concurrency cut to the floor"
            );
            EventKind::EmergencyTriggered
        } else {
            debug!(
                previous = adj.previous,
                target = adj.target,
                reason = adj.reason.as_label(),
                "target concurrency adjusted"
            );
            EventKind::ConcurrencyAdjusted
        };
        self.bus.publish(
            Event::new(kind)
                .with_concurrency(adj.previous, adj.target)
                .with_reason(adj.reason.as_label()),
        );
    }

    /// Fails every still-queued task of `batch` with [`TaskError::Canceled`].
    ///
    /// Running tasks of the batch are left alone.
    pub(crate) fn cancel_queued(&self, batch: BatchId) -> usize {
        let removed = self.lock().queue.remove_batch(batch);
        self.fail_cancelled(removed, "batch_abandoned")
    }

    fn fail_cancelled(&self, jobs: Vec<Job>, reason: &'static str) -> usize {
        let n = jobs.len();
        for job in jobs {
            if job.sink.fail(TaskError::Canceled) {
                self.bus.publish(
                    Event::new(EventKind::TaskCancelled)
                        .with_task(Arc::clone(&job.meta.label))
                        .with_task_id(job.meta.id)
                        .with_batch(job.meta.batch)
                        .with_index(job.meta.index)
                        .with_reason(reason),
                );
            }
        }
        n
    }

    /// Runs `f` on the running set under the pool lock.
    pub(crate) fn with_running<R>(&self, f: impl FnOnce(&mut RunningSet, &PoolConfig) -> R) -> R {
        let mut st = self.lock();
        let cfg = Arc::clone(&st.cfg);
        f(&mut st.running, &cfg)
    }

    /// Swaps the config in place and clamps the target into its bounds.
    pub(crate) fn reconfigure(&self, cfg: Arc<PoolConfig>) -> (usize, usize) {
        let mut st = self.lock();
        let (previous, target) = st.controller.reconfigure(&cfg);
        st.cfg = cfg;
        (previous, target)
    }

    pub(crate) fn status(&self) -> PoolStatus {
        let st = self.lock();
        PoolStatus {
            target: st.controller.target(),
            running: st.running.live(),
            parked: st.running.parked(),
            flagged: st.running.flagged(),
            lingering: st.running.lingering(),
            queued: st.queue.counts(),
            queue_capacity: st.cfg.queue_capacity,
            last_reason: st.controller.last_reason(),
            closed: st.closed,
        }
    }

    /// Refuses further submissions, fails every queued task and cancels
    /// every running one. Returns `(queued_failed, running_cancelled)`.
    pub(crate) fn close(&self) -> (usize, usize) {
        let (queued, running) = {
            let mut st = self.lock();
            st.closed = true;
            let queued = st.queue.drain_all();
            let mut running = 0;
            for h in st.running.iter() {
                h.token.cancel();
                (h.cancel_hook)();
                running += 1;
            }
            (queued, running)
        };
        (self.fail_cancelled(queued, "shutdown"), running)
    }

    /// Labels of tasks that have not returned yet.
    pub(crate) fn stuck(&self) -> Vec<String> {
        let st = self.lock();
        let mut out: Vec<String> = st
            .running
            .iter()
            .map(|h| format!("{}#{}", h.meta.label, h.meta.id))
            .collect();
        out.sort_unstable();
        out
    }

    pub(crate) fn is_idle(&self) -> bool {
        let st = self.lock();
        st.running.is_empty()
    }
}

/// Parks the calling task, if it is one of `pool`'s admitted tasks, until
/// dropped.
pub(crate) struct ParkGuard {
    pool: Weak<TaskPool>,
    id: TaskId,
}

impl ParkGuard {
    pub(crate) fn enter(pool: &Weak<TaskPool>) -> Option<Self> {
        let id = CURRENT_TASK.try_with(|id| *id).ok()?;
        let parked = pool.upgrade()?.park(id);
        parked.then(|| Self {
            pool: pool.clone(),
            id,
        })
    }
}

impl Drop for ParkGuard {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.unpark(self.id);
        }
    }
}
