//! # genvisor
//!
//! **Genvisor** is an adaptive, telemetry-driven task pool for procedural
//! world generation (terrain, erosion, meshing, biome passes).
//!
//! Instead of a fixed worker count, it continuously resizes its concurrency
//! ceiling from live host metrics (memory pressure, CPU load, frame rate) and
//! per-task resource estimates, so a generation pass saturates the machine
//! when there is headroom and backs off before it drops frames or runs out of
//! memory.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  BatchSpec   │   │  BatchSpec   │   │ submit_task  │
//!     │ (heightmap)  │   │  (erosion)   │   │  (one mesh)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Scheduler (public facade)                                        │
//! │  - TaskPool: one FIFO per Priority, backpressure, running set     │
//! │  - ConcurrencyController: the single target-concurrency integer   │
//! │  - TelemetrySampler: timeout + conservative fallback              │
//! │  - Watchdog: overrun scan, cooperative cancellation               │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        │ tick()           │ scan()           │ sample()      │
//!        ▼                  ▼                  ▼               │
//!  admit while         cancel / flag      MetricsSnapshot      │
//!  running < target    overrunning tasks  (watch channel)      │
//!        │                  │                  │               │
//!        ▼                  ▼                  ▼               ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                 (capacity: PoolConfig::bus_capacity)              │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       │    (in Scheduler)      │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                            (per-sub queues)
//!                        ┌──────────┼──────────┐
//!                        ▼          ▼          ▼
//!                    LogWriter   metrics    overlay
//! ```
//!
//! ### Task lifecycle
//! ```text
//! submit ──► Queued ──(tick: running < target)──► Running ──┬─► Completed
//!              │                                            ├─► Failed
//!              │                                            └─► Cancelled (watchdog)
//!              └──(batch abandoned / fail-fast / shutdown)──► Cancelled
//! ```
//! A running task that awaits a batch of the same scheduler is parked: its
//! slot serves the nested work until the wait returns, so batches of batches
//! go through the same admission point at any depth.
//!
//! ### Target concurrency
//! ```text
//! memory_pressure > emergency     → min_concurrency            (out of band)
//! frame_rate < emergency          → floor(running * 0.7), >= min
//! cpu < 0.5 and memory allows > 2x default → min(max, by_memory)
//! otherwise                       → min(default * 2, by_memory, max), >= min
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Batches**       | Submission-ordered results, fail-fast or collect-all.        | [`BatchSpec`], [`BatchHandle`], [`FailurePolicy`] |
//! | **Executors**     | Run one kind of task, with an optional cancellation hook.    | [`TaskExecutor`], [`ExecutorFn`]            |
//! | **Telemetry**     | Plug in host metrics; failures degrade conservatively.       | [`TelemetryProvider`], [`MetricsSnapshot`]  |
//! | **Control**       | Pure target computation and its stateful holder.             | [`compute_target_concurrency`], [`ConcurrencyController`] |
//! | **Subscriber API**| Hook into pool events (logging, metrics, overlays).          | [`Subscribe`]                               |
//! | **Errors**        | Typed errors for submission, tasks, batches and config.      | [`SubmitError`], [`TaskError`], [`BatchError`] |
//! | **Configuration** | Validated, hot-reloadable settings.                          | [`PoolConfig`]                              |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], a subscriber rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use genvisor::{
//!     BatchSpec, Estimate, ExecutorFn, FailurePolicy, ManualTelemetry, PoolConfig, Priority,
//!     Scheduler, TaskError,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let telemetry = Arc::new(ManualTelemetry::new());
//!     let sched = Scheduler::builder(PoolConfig::default(), telemetry.clone()).build()?;
//!
//!     let erosion = ExecutorFn::arc("erosion", |chunk: Arc<u32>, ctx: CancellationToken| async move {
//!         for _ in 0..4 {
//!             if ctx.is_cancelled() {
//!                 return Err(TaskError::Canceled);
//!             }
//!             tokio::time::sleep(Duration::from_millis(1)).await;
//!         }
//!         Ok(*chunk * 2)
//!     });
//!
//!     // host gets busy: the pool shrinks on its next evaluation
//!     telemetry.set_cpu_usage(0.9);
//!
//!     let spec = BatchSpec::new(erosion, 0..32u32, |_| Estimate::new(32 << 20, Duration::from_millis(4)))
//!         .with_priority(Priority::High)
//!         .with_policy(FailurePolicy::CollectAll);
//!     let results = sched.run_batch(spec).await?;
//!     assert_eq!(results[10], Ok(20));
//!
//!     sched.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod batch;
mod config;
mod controller;
mod error;
mod events;
mod pool;
mod runtime;
mod subscribers;
mod tasks;
mod telemetry;
mod watchdog;

// ---- Public re-exports ----

pub use batch::{BatchHandle, BatchResults, BatchSpec, FailurePolicy, TaskHandle};
pub use config::PoolConfig;
pub use controller::{
    Adjustment, CPU_HEADROOM_THRESHOLD, ConcurrencyController, Decision, DecisionReason,
    FRAME_RATE_RETAIN, compute_target_concurrency, max_by_memory,
};
pub use error::{BatchError, ConfigError, RuntimeError, SubmitError, TaskError, TelemetryError};
pub use events::{Event, EventKind};
pub use pool::{PoolStatus, TickReport};
pub use runtime::{Scheduler, SchedulerBuilder};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{BatchId, Estimate, ExecutorFn, Priority, TaskExecutor, TaskId};
pub use telemetry::{ManualTelemetry, MetricsSnapshot, TelemetryProvider};
pub use watchdog::WatchdogReport;

// Optional: expose a tracing-backed logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
