//! # Batch and task handles.
//!
//! A [`BatchHandle`] is what the caller holds while a batch runs. Results
//! arrive through one oneshot receiver per submission index, so the output
//! order is the submission order regardless of completion order.
//!
//! ## Wait
//! ```text
//! CollectAll: await rx[0], rx[1], ... rx[n-1]       → Ok([Result; n])
//! FailFast:   await all rx in completion order
//!               ├─ first Err(e) at index i      → cancel queued, Err(TaskFailed { i, e })
//!               └─ all Ok                       → Ok([Ok; n])
//! ```
//! A handle dropped before its batch finished abandons the batch: every
//! still-queued task is failed with [`TaskError::Canceled`]. Tasks already
//! running finish normally.
//!
//! Waiting from inside a task admitted by the same scheduler parks that task:
//! its slot is lent to the awaited work until the wait returns.

use std::sync::Weak;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::oneshot;

use super::FailurePolicy;
use super::spec::Receivers;
use crate::error::{BatchError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::pool::{ParkGuard, TaskPool};
use crate::tasks::{BatchId, TaskId};

/// Per-index results of a batch, in submission order.
pub type BatchResults<R> = Vec<Result<R, TaskError>>;

/// Caller side of a submitted batch.
#[must_use = "dropping a BatchHandle abandons the queued part of the batch"]
pub struct BatchHandle<R> {
    id: BatchId,
    policy: FailurePolicy,
    receivers: Receivers<R>,
    pool: Weak<TaskPool>,
    bus: Bus,
    finished: bool,
}

impl<R: Send + 'static> BatchHandle<R> {
    pub(crate) fn new(
        id: BatchId,
        policy: FailurePolicy,
        receivers: Receivers<R>,
        pool: Weak<TaskPool>,
        bus: Bus,
    ) -> Self {
        Self {
            id,
            policy,
            receivers,
            pool,
            bus,
            finished: false,
        }
    }

    /// Identifier of the batch.
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Number of tasks in the batch.
    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    /// `true` for a batch without tasks.
    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    /// Abandons the batch: fails every still-queued task with
    /// [`TaskError::Canceled`]. Returns how many were cancelled.
    pub fn cancel(&self) -> usize {
        self.pool
            .upgrade()
            .map_or(0, |pool| pool.cancel_queued(self.id))
    }

    /// Waits until every task reached a terminal state (or, under
    /// [`FailurePolicy::FailFast`], until the first failure).
    pub async fn wait(mut self) -> Result<BatchResults<R>, BatchError> {
        let receivers = std::mem::take(&mut self.receivers);
        let count = receivers.len();
        let parked = ParkGuard::enter(&self.pool);
        let res = match self.policy {
            FailurePolicy::CollectAll => collect_all(receivers).await,
            FailurePolicy::FailFast => fail_fast(receivers).await,
        };
        drop(parked);

        let outcome = match &res {
            Ok(results) => {
                self.finished = true;
                let failed = results.iter().filter(|r| r.is_err()).count();
                match failed {
                    0 => "ok",
                    n if n == count => "failed",
                    _ => "partial",
                }
            }
            Err(BatchError::TaskFailed { .. }) => {
                self.cancel();
                self.finished = true;
                "failed"
            }
            Err(_) => "aborted",
        };
        self.bus.publish(
            Event::new(EventKind::BatchFinished)
                .with_batch(Some(self.id))
                .with_count(count)
                .with_reason(outcome),
        );
        res
    }
}

impl<R> Drop for BatchHandle<R> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.cancel_queued(self.id);
        }
    }
}

async fn collect_all<R>(receivers: Receivers<R>) -> Result<BatchResults<R>, BatchError> {
    let mut out = Vec::with_capacity(receivers.len());
    for rx in receivers {
        out.push(rx.await.map_err(|_| BatchError::Aborted)?);
    }
    Ok(out)
}

async fn fail_fast<R>(receivers: Receivers<R>) -> Result<BatchResults<R>, BatchError> {
    let count = receivers.len();
    let mut pending: FuturesUnordered<_> = receivers
        .into_iter()
        .enumerate()
        .map(|(index, rx)| async move { (index, rx.await) })
        .collect();

    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(count).collect();
    while let Some((index, res)) = pending.next().await {
        match res {
            Ok(Ok(value)) => slots[index] = Some(value),
            Ok(Err(error)) => return Err(BatchError::TaskFailed { index, error }),
            Err(_) => return Err(BatchError::Aborted),
        }
    }
    slots
        .into_iter()
        .map(|slot| slot.map(Ok).ok_or(BatchError::Aborted))
        .collect()
}

/// Caller side of a single submitted task.
pub struct TaskHandle<R> {
    id: TaskId,
    rx: oneshot::Receiver<Result<R, TaskError>>,
    pool: Weak<TaskPool>,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(
        id: TaskId,
        rx: oneshot::Receiver<Result<R, TaskError>>,
        pool: Weak<TaskPool>,
    ) -> Self {
        Self { id, rx, pool }
    }

    /// Identifier of the task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Waits for the task's result. A task dropped without a result
    /// (scheduler gone) reports [`TaskError::Canceled`].
    pub async fn wait(self) -> Result<R, TaskError> {
        let _parked = ParkGuard::enter(&self.pool);
        self.rx.await.unwrap_or(Err(TaskError::Canceled))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rand::Rng;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::batch::BatchSpec;
    use crate::config::PoolConfig;
    use crate::tasks::{Estimate, ExecutorFn, Priority};
    use crate::telemetry::ManualTelemetry;
    use crate::telemetry::sampler::TelemetrySampler;

    fn driven_pool(cfg: PoolConfig) -> (Arc<TaskPool>, CancellationToken) {
        let bus = Bus::new(1024);
        let sampler = TelemetrySampler::new(Arc::new(ManualTelemetry::new()), bus.clone(), &cfg);
        let pool = Arc::new(TaskPool::new(
            Arc::new(cfg),
            sampler,
            bus,
            CancellationToken::new(),
        ));
        let stop = CancellationToken::new();
        let driver = Arc::clone(&pool);
        let token = stop.clone();
        tokio::spawn(async move {
            while !token.is_cancelled() {
                driver.tick().await;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });
        (pool, stop)
    }

    fn submit<T, E>(pool: &Arc<TaskPool>, spec: BatchSpec<T, E>) -> BatchHandle<E::Output>
    where
        T: Send + Sync + 'static,
        E: crate::tasks::TaskExecutor<T>,
    {
        let id = BatchId::next();
        let (priority, policy) = (spec.priority(), spec.policy());
        let (jobs, receivers) = spec.into_jobs(id);
        pool.submit(jobs, priority, Some(id)).unwrap();
        BatchHandle::new(id, policy, receivers, Arc::downgrade(pool), pool.bus().clone())
    }

    fn cfg(max: usize) -> PoolConfig {
        PoolConfig {
            min_concurrency: 1,
            default_concurrency: max,
            max_concurrency: max,
            ..PoolConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_all_keeps_submission_order() {
        let (pool, stop) = driven_pool(cfg(8));
        let mut rng = rand::rng();
        let latencies: Vec<u64> = (0..64).map(|_| rng.random_range(1..40)).collect();

        let exec = ExecutorFn::arc("chunk", |ms: Arc<(usize, u64)>, _ctx: CancellationToken| async move {
            tokio::time::sleep(Duration::from_millis(ms.1)).await;
            if ms.0 % 10 == 3 {
                return Err(TaskError::fail(format!("chunk {} corrupt", ms.0)));
            }
            Ok(ms.0)
        });
        let spec = BatchSpec::new(exec, latencies.into_iter().enumerate(), |t| {
            Estimate::new(1024, Duration::from_millis(t.1))
        });
        let results = submit(&pool, spec).wait().await.unwrap();

        assert_eq!(results.len(), 64);
        for (i, r) in results.iter().enumerate() {
            if i % 10 == 3 {
                assert!(matches!(r, Err(TaskError::Fail { .. })), "index {i}");
            } else {
                assert_eq!(r, &Ok(i));
            }
        }
        stop.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_abandons_queued() {
        let (pool, stop) = driven_pool(cfg(1));
        let exec = ExecutorFn::arc("mesh", |n: Arc<usize>, _ctx: CancellationToken| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if *n == 1 {
                Err(TaskError::fail("degenerate mesh"))
            } else {
                Ok(*n)
            }
        });
        let spec = BatchSpec::new(exec, 0..10usize, |_| Estimate::new(1024, Duration::from_millis(5)))
            .with_policy(FailurePolicy::FailFast)
            .with_priority(Priority::High);
        let handle = submit(&pool, spec);
        let id = handle.id();

        let err = handle.wait().await.unwrap_err();
        assert_eq!(
            err,
            BatchError::TaskFailed {
                index: 1,
                error: TaskError::fail("degenerate mesh")
            }
        );
        assert_eq!(pool.status().queued_total(), 0);
        assert_eq!(pool.cancel_queued(id), 0);
        stop.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_queued() {
        let bus = Bus::new(64);
        let cfg = cfg(1);
        let sampler = TelemetrySampler::new(Arc::new(ManualTelemetry::new()), bus.clone(), &cfg);
        let pool = Arc::new(TaskPool::new(Arc::new(cfg), sampler, bus, CancellationToken::new()));

        let exec = ExecutorFn::arc("biome", |n: Arc<u8>, _ctx: CancellationToken| async move {
            Ok::<_, TaskError>(*n)
        });
        let handle = submit(&pool, BatchSpec::new(exec, [1u8, 2, 3], |_| Estimate::default()));
        assert_eq!(pool.status().queued_total(), 3);
        drop(handle);
        assert_eq!(pool.status().queued_total(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_resolves_immediately() {
        let handle: BatchHandle<()> = BatchHandle::new(
            BatchId::next(),
            FailurePolicy::FailFast,
            Vec::new(),
            Weak::new(),
            Bus::new(4),
        );
        assert!(handle.is_empty());
        assert_eq!(handle.wait().await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_task_handle_without_result_is_canceled() {
        let (tx, rx) = oneshot::channel::<Result<u8, TaskError>>();
        drop(tx);
        let handle = TaskHandle::new(TaskId(1), rx, Weak::new());
        assert_eq!(handle.wait().await, Err(TaskError::Canceled));
    }
}
