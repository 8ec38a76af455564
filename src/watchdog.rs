//! # Watchdog.
//!
//! Scans the running set on its own cadence, independent of the admission
//! tick, for tasks running longer than `estimate.duration * overrun_factor`.
//!
//! ## Scan
//! ```text
//! for each handle
//!   ├─ Running, elapsed > budget, cancellable   → cancel token + executor hook
//!   │                                             result := WatchdogCancelled
//!   │                                             state  := Cancelled (slot freed)
//!   ├─ Running, elapsed > budget, uncancellable → flag once, keep the slot
//!   │                                             (CancellationUnsupported)
//!   └─ Cancelled for >= one watchdog cycle      → CancellationIgnored (once)
//! ```
//!
//! Elapsed time excludes the time a task spent parked on nested work, and a
//! parked task is never judged while it waits. A task that already returned
//! but was not reaped yet is skipped.
//!
//! Cancellation is cooperative: nothing here aborts a future. Tasks that
//! ignore their token stay tracked as lingering until they return.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::pool::{RunState, TaskPool};
use crate::tasks::{BatchId, TaskId};

/// Outcome of one watchdog scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogReport {
    /// Running tasks found over budget (cancelled or newly flagged).
    pub overruns: usize,
    /// Tasks cancelled by this scan.
    pub cancelled: usize,
    /// Uncancellable tasks flagged by this scan.
    pub flagged: usize,
    /// Cancelled tasks newly reported as ignoring cancellation.
    pub ignored: usize,
}

/// What the scan decided for one task, carried out after the pool lock is released.
enum Verdict {
    Cancel(Arc<dyn Fn() + Send + Sync>),
    Flag,
    Ignored,
}

struct Finding {
    verdict: Verdict,
    label: Arc<str>,
    id: TaskId,
    batch: Option<BatchId>,
    index: usize,
    elapsed: Duration,
    budget: Duration,
}

impl Finding {
    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_task(Arc::clone(&self.label))
            .with_task_id(self.id)
            .with_batch(self.batch)
            .with_index(self.index)
            .with_elapsed(self.elapsed)
    }
}

pub(crate) struct Watchdog {
    pool: Arc<TaskPool>,
}

impl Watchdog {
    pub(crate) fn new(pool: Arc<TaskPool>) -> Self {
        Self { pool }
    }

    /// Runs one scan at the current instant.
    pub(crate) fn scan(&self) -> WatchdogReport {
        let now = Instant::now();
        let findings = self.pool.with_running(|running, cfg| {
            let mut out = Vec::new();
            for h in running.iter_mut() {
                let elapsed = h.active_elapsed(now);
                let budget = h.meta.estimate.overrun_budget(cfg.overrun_factor);

                let state = h.state;
                let verdict = match state {
                    // Already returned, only waiting for the next tick to reap it.
                    RunState::Running if h.sink.is_resolved() => continue,
                    RunState::Running if elapsed > budget => {
                        if h.meta.cancellable {
                            if !h.sink.fail(TaskError::WatchdogCancelled { elapsed, budget }) {
                                continue;
                            }
                            h.token.cancel();
                            h.state = RunState::Cancelled { at: now };
                            Verdict::Cancel(Arc::clone(&h.cancel_hook))
                        } else if !h.flagged {
                            h.flagged = true;
                            Verdict::Flag
                        } else {
                            continue;
                        }
                    }
                    RunState::Cancelled { at }
                        if !h.ignore_reported
                            && now.saturating_duration_since(at) >= cfg.watchdog_interval =>
                    {
                        h.ignore_reported = true;
                        Verdict::Ignored
                    }
                    _ => continue,
                };
                out.push(Finding {
                    verdict,
                    label: Arc::clone(&h.meta.label),
                    id: h.meta.id,
                    batch: h.meta.batch,
                    index: h.meta.index,
                    elapsed,
                    budget,
                });
            }
            out
        });

        let bus = self.pool.bus();
        let mut report = WatchdogReport::default();
        for f in findings {
            match &f.verdict {
                Verdict::Cancel(hook) => {
                    hook();
                    report.overruns += 1;
                    report.cancelled += 1;
                    warn!(task = %f.label, id = %f.id, elapsed = ?f.elapsed, budget = ?f.budget, "overrunning task cancelled");
                    bus.publish(f.event(EventKind::WatchdogOverrun).with_budget(f.budget));
                    bus.publish(f.event(EventKind::TaskCancelled).with_reason("watchdog"));
                }
                Verdict::Flag => {
                    report.overruns += 1;
                    report.flagged += 1;
                    warn!(
                        task = %f.label,
                        id = %f.id,
                        elapsed = ?f.elapsed,
                        budget = ?f.budget,
                        "overrunning task does not support cancellation, it keeps its slot"
                    );
                    bus.publish(f.event(EventKind::WatchdogOverrun).with_budget(f.budget));
                    bus.publish(f.event(EventKind::CancellationUnsupported));
                }
                Verdict::Ignored => {
                    report.ignored += 1;
                    warn!(task = %f.label, id = %f.id, elapsed = ?f.elapsed, "cancelled task is still running");
                    bus.publish(f.event(EventKind::CancellationIgnored));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::PoolConfig;
    use crate::events::Bus;
    use crate::tasks::job::Job;
    use crate::tasks::{Estimate, ExecutorFn, Priority};
    use crate::telemetry::ManualTelemetry;
    use crate::telemetry::sampler::TelemetrySampler;

    fn setup(cfg: PoolConfig) -> (Arc<TaskPool>, Watchdog) {
        let bus = Bus::new(1024);
        let sampler = TelemetrySampler::new(Arc::new(ManualTelemetry::new()), bus.clone(), &cfg);
        let pool = Arc::new(TaskPool::new(
            Arc::new(cfg),
            sampler,
            bus,
            CancellationToken::new(),
        ));
        let dog = Watchdog::new(Arc::clone(&pool));
        (pool, dog)
    }

    fn cfg() -> PoolConfig {
        PoolConfig {
            min_concurrency: 1,
            default_concurrency: 1,
            max_concurrency: 1,
            overrun_factor: 5,
            watchdog_interval: Duration::from_millis(20),
            ..PoolConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellable_overrun_is_cancelled_and_slot_freed() {
        let (pool, dog) = setup(cfg());
        let hooked = Arc::new(AtomicBool::new(false));
        let exec = {
            let hooked = Arc::clone(&hooked);
            Arc::new(HookedExec { hooked })
        };
        let est = Estimate::new(1024, Duration::from_millis(10));
        let (stuck, stuck_rx) = Job::new(Arc::clone(&exec), Arc::new(()), None, 0, est);
        let (next, _next_rx) = Job::new(exec, Arc::new(()), None, 1, est);
        pool.submit(vec![stuck, next], Priority::Normal, None).unwrap();
        assert_eq!(pool.tick().await.running, 1);

        tokio::time::advance(Duration::from_millis(49)).await;
        assert_eq!(dog.scan(), WatchdogReport::default());

        tokio::time::advance(Duration::from_millis(2)).await;
        let report = dog.scan();
        assert_eq!((report.overruns, report.cancelled), (1, 1));
        assert!(hooked.load(Ordering::SeqCst));
        assert!(matches!(
            stuck_rx.await,
            Ok(Err(TaskError::WatchdogCancelled { .. }))
        ));

        let status = pool.status();
        assert_eq!(status.running, 0);
        assert_eq!(status.lingering, 1);

        let report = pool.tick().await;
        assert_eq!(report.admitted, 1);
        assert_eq!(report.running, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncancellable_overrun_is_flagged_once_and_keeps_slot() {
        let c = cfg();
        let interval = c.watchdog_interval;
        let (pool, dog) = setup(c);
        let exec = ExecutorFn::new("erode", |_t: Arc<()>, _ctx: CancellationToken| async {
            std::future::pending::<()>().await;
            Ok::<_, TaskError>(())
        })
        .uncancellable();
        let exec = Arc::new(exec);
        let est = Estimate::new(1024, Duration::from_millis(30));
        let (job, _rx) = Job::new(exec, Arc::new(()), None, 0, est);
        pool.submit(vec![job], Priority::Normal, None).unwrap();
        pool.tick().await;

        let budget = est.overrun_budget(5);
        let mut flagged_at = None;
        for cycle in 1..=cycles_to_detect(budget, interval) {
            tokio::time::advance(interval).await;
            if dog.scan().flagged == 1 {
                flagged_at = Some(cycle);
                break;
            }
        }
        let cycle = flagged_at.expect("flagged within budget + one cycle");
        assert!(interval * cycle <= budget + interval);

        tokio::time::advance(interval).await;
        assert_eq!(dog.scan(), WatchdogReport::default());

        let status = pool.status();
        assert_eq!((status.running, status.flagged), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_cancellation_reported_once() {
        let (pool, dog) = setup(cfg());
        let exec = ExecutorFn::arc("deaf", |_t: Arc<()>, _ctx: CancellationToken| async {
            std::future::pending::<()>().await;
            Ok::<_, TaskError>(())
        });
        let est = Estimate::new(1024, Duration::from_millis(1));
        let (job, _rx) = Job::new(exec, Arc::new(()), None, 0, est);
        pool.submit(vec![job], Priority::Normal, None).unwrap();
        pool.tick().await;

        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(dog.scan().cancelled, 1);
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(dog.scan().ignored, 1);
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(dog.scan().ignored, 0);
        assert_eq!(pool.status().lingering, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returned_but_unreaped_task_is_not_cancelled() {
        let (pool, dog) = setup(cfg());
        let mut events = pool.bus().subscribe();
        let exec = ExecutorFn::arc("lod", |_t: Arc<()>, _ctx: CancellationToken| async {
            tokio::time::sleep(Duration::from_millis(3)).await;
            Ok::<_, TaskError>(42u32)
        });
        let est = Estimate::new(1024, Duration::from_millis(1));
        let (job, rx) = Job::new(exec, Arc::new(()), None, 0, est);
        pool.submit(vec![job], Priority::Normal, None).unwrap();
        pool.tick().await;

        // returns at 3ms, scanned at 7ms (budget 5ms) before any tick reaps it
        tokio::time::sleep(Duration::from_millis(7)).await;
        assert_eq!(dog.scan(), WatchdogReport::default());
        assert_eq!(rx.await, Ok(Ok(42)));

        assert_eq!(pool.tick().await.reaped, 1);
        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::TaskCompleted), "{kinds:?}");
        assert!(!kinds.contains(&EventKind::WatchdogOverrun), "{kinds:?}");
        assert!(!kinds.contains(&EventKind::TaskCancelled), "{kinds:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_parked_task_is_not_judged_while_waiting() {
        let (pool, dog) = setup(cfg());
        let exec = ExecutorFn::arc("region", |_t: Arc<()>, ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err::<(), _>(TaskError::Canceled)
        });
        let est = Estimate::new(1024, Duration::from_millis(10));
        let (job, _rx) = Job::new(exec, Arc::new(()), None, 0, est);
        let id = job.meta.id;
        pool.submit(vec![job], Priority::Normal, None).unwrap();
        pool.tick().await;

        tokio::time::advance(Duration::from_millis(30)).await;
        assert!(pool.park(id));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(dog.scan(), WatchdogReport::default());
        assert_eq!((pool.status().running, pool.status().parked), (0, 1));

        pool.unpark(id);
        tokio::time::advance(Duration::from_millis(15)).await;
        assert_eq!(dog.scan(), WatchdogReport::default());
        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(dog.scan().cancelled, 1);
    }

    /// Watchdog scans needed before an overrun of `budget` is detected.
    fn cycles_to_detect(budget: Duration, interval: Duration) -> u32 {
        (budget.as_nanos() / interval.as_nanos()) as u32 + 1
    }

    struct HookedExec {
        hooked: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl crate::tasks::TaskExecutor<()> for HookedExec {
        type Output = ();

        async fn run(&self, _task: Arc<()>, ctx: CancellationToken) -> Result<(), TaskError> {
            ctx.cancelled().await;
            Err(TaskError::Canceled)
        }

        fn cancel(&self, _task: &()) {
            self.hooked.store(true, Ordering::SeqCst);
        }
    }
}
