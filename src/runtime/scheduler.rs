//! # Scheduler: the public facade of the adaptive pool.
//!
//! The [`Scheduler`] owns the event bus, the [`TaskPool`], the watchdog and
//! the live [`PoolConfig`]. It spawns the cadence drivers, forwards events to
//! subscribers, and performs graceful shutdown.
//!
//! ## High-level architecture
//! ```text
//! Callers:
//!   submit_batch(BatchSpec) ──► BatchSpec::into_jobs ──► TaskPool::submit (backpressure)
//!          │                                                    │
//!          └──► BatchHandle::wait() ◄── oneshot per index ◄─────┤
//!                                                               │
//! Drivers (spawned unless built with `manual()`):               ▼
//!   tick loop      (tick_interval)     ──► TaskPool::tick ──► telemetry sample
//!                                                          ├─► ConcurrencyController
//!                                                          └─► admit ─► tokio::spawn(executor.run)
//!   watchdog loop  (watchdog_interval) ──► Watchdog::scan ──► cancel / flag overruns
//!
//! Event flow:
//!   pool / watchdog / sampler ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//!
//! Shutdown path:
//!   shutdown()
//!     └─► Bus.publish(ShutdownRequested)
//!     └─► stop drivers
//!     └─► TaskPool::close()   (queued → Canceled, running tokens cancelled)
//!     └─► wait up to cfg.grace for running tasks:
//!            ├─ all exited      → Bus.publish(AllStoppedWithin)
//!            └─ grace exceeded  → Bus.publish(GraceExceeded), RuntimeError::GraceExceeded
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use genvisor::{BatchSpec, Estimate, ExecutorFn, ManualTelemetry, PoolConfig, Scheduler, TaskError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let telemetry = Arc::new(ManualTelemetry::new());
//!     let sched = Scheduler::builder(PoolConfig::default(), telemetry).build()?;
//!
//!     let exec = ExecutorFn::arc("heightmap", |chunk: Arc<(i32, i32)>, _ctx: CancellationToken| async move {
//!         Ok::<_, TaskError>(chunk.0 + chunk.1)
//!     });
//!     let chunks = (0..4).flat_map(|x| (0..4).map(move |z| (x, z)));
//!     let spec = BatchSpec::new(exec, chunks, |_| Estimate::new(8 << 20, Duration::from_millis(5)));
//!
//!     let results = sched.run_batch(spec).await?;
//!     assert_eq!(results.len(), 16);
//!     assert_eq!(results[5], Ok(2));
//!
//!     sched.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::builder::SchedulerBuilder;
use super::driver;
use crate::batch::{BatchHandle, BatchResults, BatchSpec, TaskHandle};
use crate::config::PoolConfig;
use crate::error::{BatchError, ConfigError, RuntimeError, SubmitError};
use crate::events::{Bus, Event, EventKind};
use crate::pool::{PoolStatus, TaskPool, TickReport};
use crate::subscribers::SubscriberSet;
use crate::tasks::job::Job;
use crate::tasks::{BatchId, Estimate, TaskExecutor};
use crate::telemetry::sampler::TelemetrySampler;
use crate::telemetry::{MetricsSnapshot, TelemetryProvider};
use crate::watchdog::{Watchdog, WatchdogReport};

/// Adaptive, telemetry-driven task scheduler.
pub struct Scheduler {
    pool: Arc<TaskPool>,
    watchdog: Arc<Watchdog>,
    bus: Bus,
    config: watch::Sender<Arc<PoolConfig>>,
    /// Stops the drivers; tasks run under `pool`'s runtime token.
    drivers_token: CancellationToken,
    /// Stops the subscriber listener (after the final shutdown events).
    listener_token: CancellationToken,
    runtime_token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Scheduler {
    /// Returns a builder for a scheduler with `cfg` and the given telemetry source.
    pub fn builder(cfg: PoolConfig, telemetry: Arc<dyn TelemetryProvider>) -> SchedulerBuilder {
        SchedulerBuilder::new(cfg, telemetry)
    }

    pub(super) fn new_internal(
        cfg: Arc<PoolConfig>,
        bus: Bus,
        sampler: TelemetrySampler,
        runtime_token: CancellationToken,
    ) -> Self {
        let pool = Arc::new(TaskPool::new(
            Arc::clone(&cfg),
            sampler,
            bus.clone(),
            runtime_token.clone(),
        ));
        let (config, _rx) = watch::channel(cfg);
        Self {
            watchdog: Arc::new(Watchdog::new(Arc::clone(&pool))),
            pool,
            bus,
            config,
            drivers_token: CancellationToken::new(),
            listener_token: CancellationToken::new(),
            runtime_token,
            handles: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    ///
    /// Ready events are drained before the stop signal is honoured, so the
    /// final shutdown events still reach subscribers.
    pub(super) fn subscriber_listener(&self, set: SubscriberSet) {
        let mut rx = self.bus.subscribe();
        let token = self.listener_token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
            set.shutdown().await;
        });
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Spawns the tick and watchdog loops.
    pub(super) fn spawn_drivers(&self) {
        let pool = Arc::clone(&self.pool);
        let tick = driver::spawn(
            "tick",
            self.config.subscribe(),
            |c| c.tick_interval,
            self.drivers_token.clone(),
            move || {
                let pool = Arc::clone(&pool);
                async move {
                    pool.tick().await;
                }
            },
        );

        let dog = Arc::clone(&self.watchdog);
        let watchdog = driver::spawn(
            "watchdog",
            self.config.subscribe(),
            |c| c.watchdog_interval,
            self.drivers_token.clone(),
            move || {
                dog.scan();
                async {}
            },
        );

        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([tick, watchdog]);
    }

    /// Submits a batch. Results are awaited through the returned handle.
    ///
    /// Fails with [`SubmitError::Saturated`] when the batch does not fit the
    /// queue and its priority is subject to backpressure (no task of the
    /// batch is queued in that case).
    pub fn submit_batch<T, E>(
        &self,
        spec: BatchSpec<T, E>,
    ) -> Result<BatchHandle<E::Output>, SubmitError>
    where
        T: Send + Sync + 'static,
        E: TaskExecutor<T>,
    {
        let id = BatchId::next();
        let (priority, policy) = (spec.priority(), spec.policy());
        let (jobs, receivers) = spec.into_jobs(id);
        let count = jobs.len();

        self.pool.submit(jobs, priority, Some(id))?;
        self.bus.publish(
            Event::new(EventKind::BatchSubmitted)
                .with_batch(Some(id))
                .with_priority(priority)
                .with_count(count),
        );
        Ok(BatchHandle::new(
            id,
            policy,
            receivers,
            Arc::downgrade(&self.pool),
            self.bus.clone(),
        ))
    }

    /// Submits a batch and waits for its results (in submission order).
    pub async fn run_batch<T, E>(
        &self,
        spec: BatchSpec<T, E>,
    ) -> Result<BatchResults<E::Output>, BatchError>
    where
        T: Send + Sync + 'static,
        E: TaskExecutor<T>,
    {
        self.submit_batch(spec)?.wait().await
    }

    /// Submits a single task at `estimate.priority`.
    pub fn submit_task<T, E>(
        &self,
        executor: Arc<E>,
        task: T,
        estimate: Estimate,
    ) -> Result<TaskHandle<E::Output>, SubmitError>
    where
        T: Send + Sync + 'static,
        E: TaskExecutor<T>,
    {
        let (job, rx) = Job::new(executor, Arc::new(task), None, 0, estimate);
        let id = job.meta.id;
        self.pool.submit(vec![job], estimate.priority, None)?;
        Ok(TaskHandle::new(id, rx, Arc::downgrade(&self.pool)))
    }

    /// Runs one admission tick now.
    ///
    /// With the built-in drivers this is already called every `tick_interval`;
    /// an overlapping call is skipped (see [`TickReport::skipped`]).
    pub async fn tick(&self) -> TickReport {
        self.pool.tick().await
    }

    /// Runs one watchdog scan now.
    pub fn scan_watchdog(&self) -> WatchdogReport {
        self.watchdog.scan()
    }

    /// Most recent telemetry snapshot.
    pub fn current_metrics(&self) -> MetricsSnapshot {
        self.pool.sampler().current()
    }

    /// Receiver observing every new telemetry snapshot.
    pub fn metrics_watch(&self) -> watch::Receiver<MetricsSnapshot> {
        self.pool.sampler().watch()
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<PoolConfig> {
        Arc::clone(&self.config.borrow())
    }

    /// Applies a new configuration.
    ///
    /// The config is validated first; on error nothing changes. Otherwise the
    /// target is clamped into the new bounds, a full re-evaluation is forced
    /// on the next tick, and the drivers pick up the new cadences.
    /// `bus_capacity` is ignored (build time only).
    pub fn configure(&self, cfg: PoolConfig) -> Result<(), ConfigError> {
        cfg.validate()?;
        let cfg = Arc::new(cfg);
        let (previous, target) = self.pool.reconfigure(Arc::clone(&cfg));
        self.config.send_replace(cfg);

        info!(previous, target, "configuration reloaded");
        self.bus
            .publish(Event::new(EventKind::ConfigReloaded).with_concurrency(previous, target));
        Ok(())
    }

    /// Point-in-time view of the pool.
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Receiver of every runtime event published from now on.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Stops the scheduler.
    ///
    /// Stops the drivers, fails every queued task with `Canceled`, cancels
    /// running tasks and waits up to `grace` for them to return. Calling it
    /// again is a no-op.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        self.drivers_token.cancel();
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for h in handles {
            let _ = h.await;
        }

        let (queued, running) = self.pool.close();
        info!(queued, running, "shutting down");
        self.runtime_token.cancel();

        let res = self.wait_all_with_grace().await;
        self.stop_listener().await;
        res
    }

    /// Waits for running tasks to return within the configured grace period.
    async fn wait_all_with_grace(&self) -> Result<(), RuntimeError> {
        let cfg = self.config();
        let grace = cfg.grace;
        let poll = cfg.tick_interval;
        let pool = &self.pool;
        let done = async {
            loop {
                pool.reap().await;
                if pool.is_idle() {
                    break;
                }
                time::sleep(poll).await;
            }
        };

        match time::timeout(grace, done).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck = pool.stuck();
                warn!(?grace, ?stuck, "grace exceeded");
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    async fn stop_listener(&self) {
        self.listener_token.cancel();
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(h) = handle {
            let _ = h.await;
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.drivers_token.cancel();
        self.listener_token.cancel();
        self.runtime_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::batch::FailurePolicy;
    use crate::controller::DecisionReason;
    use crate::error::TaskError;
    use crate::tasks::{ExecutorFn, Priority};
    use crate::telemetry::ManualTelemetry;

    const MB: u64 = 1024 * 1024;

    fn cfg() -> PoolConfig {
        PoolConfig {
            min_concurrency: 2,
            max_concurrency: 16,
            default_concurrency: 4,
            emergency_memory_pressure: 0.8,
            emergency_frame_rate: 30.0,
            ..PoolConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_emergency_caps_running_at_min() {
        let telemetry = Arc::new(ManualTelemetry::new());
        telemetry.set_memory_pressure(0.9);
        let sched = Scheduler::builder(cfg(), telemetry).build().unwrap();

        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let exec = {
            let (live, peak) = (Arc::clone(&live), Arc::clone(&peak));
            ExecutorFn::arc("chunk", move |n: Arc<u32>, _ctx: CancellationToken| {
                let (live, peak) = (Arc::clone(&live), Arc::clone(&peak));
                async move {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(5)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, TaskError>(*n)
                }
            })
        };
        let spec = BatchSpec::new(exec, 0..100u32, |_| {
            Estimate::new(20 * MB, Duration::from_millis(10))
        });

        let results = sched.run_batch(spec).await.unwrap();
        assert_eq!(results.len(), 100);
        assert!(results.iter().enumerate().all(|(i, r)| r == &Ok(i as u32)));
        assert!(peak.load(Ordering::SeqCst) <= 2, "peak {}", peak.load(Ordering::SeqCst));
        assert_eq!(sched.status().last_reason, Some(DecisionReason::MemoryEmergency));
        sched.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_headroom_scales_to_max() {
        let telemetry = Arc::new(ManualTelemetry::new());
        telemetry.set_cpu_usage(0.3);
        telemetry.set_memory_pressure(0.4);
        telemetry.set_available_memory(8_000_000_000);
        let sched = Scheduler::builder(cfg(), telemetry).manual().build().unwrap();

        let exec = ExecutorFn::arc("noise", |_t: Arc<()>, ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err::<(), _>(TaskError::Canceled)
        });
        let _handle = sched
            .submit_task(exec, (), Estimate::new(20_000_000, Duration::from_millis(50)))
            .unwrap();

        let report = sched.tick().await;
        assert_eq!(report.target, 16);
        assert_eq!(report.admitted, 1);
        assert_eq!(sched.status().last_reason, Some(DecisionReason::Headroom));
        assert!(!sched.current_metrics().fallback);
        sched.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_all_isolates_panics_and_failures() {
        let sched = Scheduler::builder(cfg(), Arc::new(ManualTelemetry::new()))
            .build()
            .unwrap();
        let exec = ExecutorFn::arc("erosion", |n: Arc<u8>, _ctx: CancellationToken| async move {
            match *n {
                2 => panic!("erosion diverged"),
                4 => Err(TaskError::fail("river carved off-map")),
                n => Ok(n),
            }
        });
        let spec = BatchSpec::new(exec, 0..6u8, |_| Estimate::default());
        let results = sched.run_batch(spec).await.unwrap();

        assert_eq!(results[0], Ok(0));
        assert_eq!(
            results[2],
            Err(TaskError::Panicked {
                info: "erosion diverged".into()
            })
        );
        assert_eq!(results[4], Err(TaskError::fail("river carved off-map")));
        assert_eq!(results[5], Ok(5));

        // the panicking task released its slot
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sched.status().running, 0);
        sched.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_cancels_runaway_task() {
        let c = PoolConfig {
            watchdog_interval: Duration::from_millis(10),
            overrun_factor: 5,
            ..cfg()
        };
        let sched = Scheduler::builder(c, Arc::new(ManualTelemetry::new()))
            .build()
            .unwrap();
        let exec = ExecutorFn::arc("cave", |n: Arc<u8>, ctx: CancellationToken| async move {
            if *n == 0 {
                ctx.cancelled().await;
                return Err(TaskError::Canceled);
            }
            time::sleep(Duration::from_millis(5)).await;
            Ok(*n)
        });
        let spec = BatchSpec::new(exec, 0..4u8, |_| Estimate::new(MB, Duration::from_millis(10)))
            .with_policy(FailurePolicy::CollectAll);
        let results = sched.run_batch(spec).await.unwrap();

        match &results[0] {
            Err(TaskError::WatchdogCancelled { elapsed, budget }) => {
                assert_eq!(*budget, Duration::from_millis(50));
                assert!(elapsed > budget);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(&results[1..], &[Ok(1), Ok(2), Ok(3)]);
        sched.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_batches_wider_than_target_complete() {
        let c = PoolConfig {
            min_concurrency: 2,
            default_concurrency: 2,
            max_concurrency: 2,
            watchdog_interval: Duration::from_millis(10),
            overrun_factor: 5,
            ..cfg()
        };
        let sched = Scheduler::builder(c, Arc::new(ManualTelemetry::new()))
            .build()
            .unwrap();

        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let chunk = {
            let (live, peak) = (Arc::clone(&live), Arc::clone(&peak));
            ExecutorFn::arc("chunk", move |n: Arc<u32>, _ctx: CancellationToken| {
                let (live, peak) = (Arc::clone(&live), Arc::clone(&peak));
                async move {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(40)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, TaskError>(*n * 10)
                }
            })
        };
        let region = {
            let sched = Arc::downgrade(&sched);
            ExecutorFn::arc("region", move |r: Arc<u32>, _ctx: CancellationToken| {
                let (sched, chunk) = (sched.clone(), Arc::clone(&chunk));
                async move {
                    let sched = sched.upgrade().ok_or(TaskError::Canceled)?;
                    let first = *r * 2;
                    let inner = BatchSpec::new(chunk, [first, first + 1], |_| {
                        Estimate::new(MB, Duration::from_millis(40))
                    });
                    let chunks = sched
                        .run_batch(inner)
                        .await
                        .map_err(|e| TaskError::fail(e.to_string()))?;
                    chunks.into_iter().sum::<Result<u32, TaskError>>()
                }
            })
        };

        // Regions wait far longer than their own 100ms budget: only the time
        // they hold a slot counts.
        let outer = BatchSpec::new(region, 0..4u32, |_| {
            Estimate::new(MB, Duration::from_millis(20))
        });
        let results = sched.run_batch(outer).await.unwrap();

        assert_eq!(results, vec![Ok(10), Ok(50), Ok(90), Ok(130)]);
        assert!(peak.load(Ordering::SeqCst) <= 2, "peak {}", peak.load(Ordering::SeqCst));
        assert_eq!(sched.status().parked, 0);
        sched.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_backpressure_rejects_normal_but_queues_critical() {
        let c = PoolConfig {
            queue_capacity: 8,
            ..cfg()
        };
        let sched = Scheduler::builder(c, Arc::new(ManualTelemetry::new()))
            .manual()
            .build()
            .unwrap();
        let exec = ExecutorFn::arc("lod", |n: Arc<u32>, _ctx: CancellationToken| async move {
            Ok::<_, TaskError>(*n)
        });
        let est = |_: &u32| Estimate::new(MB, Duration::from_millis(1));

        let first = sched
            .submit_batch(BatchSpec::new(Arc::clone(&exec), 0..8u32, est))
            .unwrap();
        let err = sched
            .submit_batch(BatchSpec::new(Arc::clone(&exec), 0..1u32, est))
            .err();
        assert!(matches!(err, Some(SubmitError::Saturated { .. })));

        let urgent = sched
            .submit_batch(
                BatchSpec::new(Arc::clone(&exec), 0..3u32, est).with_priority(Priority::Critical),
            )
            .unwrap();
        let high = sched
            .submit_task(exec, 7u32, est(&0).with_priority(Priority::High))
            .unwrap();
        let status = sched.status();
        assert_eq!(status.queued_total(), 12);
        assert_eq!(status.queued_at(Priority::Critical), 3);
        assert_eq!(status.queued_at(Priority::High), 1);

        let driver = async {
            loop {
                sched.tick().await;
                time::sleep(Duration::from_millis(1)).await;
            }
        };
        let results = async {
            (
                urgent.wait().await.unwrap(),
                high.wait().await.unwrap(),
                first.wait().await.unwrap(),
            )
        };
        let (urgent, high, first) = tokio::select! {
            r = results => r,
            _ = driver => unreachable!(),
        };
        assert_eq!(urgent, vec![Ok(0), Ok(1), Ok(2)]);
        assert_eq!(high, 7);
        assert_eq!(first.len(), 8);
        sched.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_validates_and_clamps() {
        let sched = Scheduler::builder(cfg(), Arc::new(ManualTelemetry::new()))
            .manual()
            .build()
            .unwrap();
        let mut events = sched.events();

        let bad = PoolConfig {
            min_concurrency: 8,
            max_concurrency: 4,
            ..cfg()
        };
        assert_eq!(
            sched.configure(bad),
            Err(ConfigError::MaxBelowMin { min: 8, max: 4 })
        );
        assert_eq!(sched.config().min_concurrency, 2);
        assert_eq!(sched.status().target, 4);

        let narrow = PoolConfig {
            min_concurrency: 1,
            default_concurrency: 2,
            max_concurrency: 3,
            ..cfg()
        };
        sched.configure(narrow).unwrap();
        assert_eq!(sched.status().target, 3);
        assert_eq!(sched.config().max_concurrency, 3);

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ConfigReloaded);
        assert_eq!((ev.previous, ev.target), (Some(4), Some(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_rejected_at_build() {
        let bad = PoolConfig {
            emergency_memory_pressure: 1.5,
            ..cfg()
        };
        let res = Scheduler::builder(bad, Arc::new(ManualTelemetry::new())).build();
        assert!(matches!(res, Err(ConfigError::EmergencyMemoryPressure(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_stuck_tasks() {
        let c = PoolConfig {
            grace: Duration::from_millis(100),
            ..cfg()
        };
        let sched = Scheduler::builder(c, Arc::new(ManualTelemetry::new()))
            .build()
            .unwrap();
        let exec = ExecutorFn::new("tectonics", |_t: Arc<()>, _ctx: CancellationToken| async {
            std::future::pending::<()>().await;
            Ok::<_, TaskError>(())
        })
        .uncancellable();
        let handle = sched
            .submit_task(Arc::new(exec), (), Estimate::new(MB, Duration::from_secs(60)))
            .unwrap();
        time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sched.status().running, 1);

        match sched.shutdown().await {
            Err(RuntimeError::GraceExceeded { grace, stuck }) => {
                assert_eq!(grace, Duration::from_millis(100));
                assert_eq!(stuck.len(), 1);
                assert!(stuck[0].starts_with("tectonics#"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(sched.shutdown().await.is_ok());
        drop(handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_queued_and_closes() {
        let c = PoolConfig {
            min_concurrency: 1,
            default_concurrency: 1,
            max_concurrency: 1,
            ..cfg()
        };
        let sched = Scheduler::builder(c, Arc::new(ManualTelemetry::new()))
            .build()
            .unwrap();
        let exec = ExecutorFn::arc("river", |_t: Arc<u8>, ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err::<(), _>(TaskError::Canceled)
        });
        let handle = sched
            .submit_batch(BatchSpec::new(Arc::clone(&exec), [1u8, 2, 3], |_| {
                Estimate::new(MB, Duration::from_secs(60))
            }))
            .unwrap();
        time::sleep(Duration::from_millis(30)).await;

        sched.shutdown().await.unwrap();
        let results = handle.wait().await.unwrap();
        assert!(results.iter().all(|r| r == &Err(TaskError::Canceled)));
        assert_eq!(
            sched.submit_task(exec, 9u8, Estimate::default()).err(),
            Some(SubmitError::Closed)
        );
        assert!(sched.status().closed);
    }
}
