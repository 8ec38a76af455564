//! # Batch specification.
//!
//! A [`BatchSpec`] bundles everything the scheduler needs to run a set of
//! homogeneous tasks: the executor, the task inputs in submission order, a
//! per-task resource estimate, the batch priority and the failure policy.
//!
//! The batch priority applies to every task of the batch and overrides the
//! `priority` field of the individual estimates.

use std::sync::Arc;

use tokio::sync::oneshot;

use super::FailurePolicy;
use crate::error::TaskError;
use crate::tasks::job::Job;
use crate::tasks::{BatchId, Estimate, Priority, TaskExecutor};

type EstimateFn<T> = Box<dyn Fn(&T) -> Estimate + Send + Sync>;

/// Receivers of a batch's results, in submission order.
pub(crate) type Receivers<R> = Vec<oneshot::Receiver<Result<R, TaskError>>>;

/// Description of a batch of tasks run by one executor.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use genvisor::{BatchSpec, Estimate, ExecutorFn, FailurePolicy, Priority, TaskError};
///
/// let exec = ExecutorFn::arc("heightmap", |chunk: Arc<(i32, i32)>, _ctx: CancellationToken| async move {
///     Ok::<_, TaskError>(chunk.0 * chunk.1)
/// });
/// let spec = BatchSpec::new(exec, vec![(0, 0), (0, 1), (1, 1)], |_| {
///     Estimate::new(20 * 1024 * 1024, Duration::from_millis(40))
/// })
/// .with_priority(Priority::High)
/// .with_policy(FailurePolicy::FailFast);
///
/// assert_eq!(spec.len(), 3);
/// assert_eq!(spec.priority(), Priority::High);
/// ```
pub struct BatchSpec<T, E> {
    executor: Arc<E>,
    tasks: Vec<Arc<T>>,
    estimate: EstimateFn<T>,
    priority: Priority,
    policy: FailurePolicy,
}

impl<T, E> BatchSpec<T, E>
where
    T: Send + Sync + 'static,
    E: TaskExecutor<T>,
{
    /// Creates a `Normal` priority, collect-all batch.
    pub fn new<I, F>(executor: Arc<E>, tasks: I, estimate: F) -> Self
    where
        I: IntoIterator<Item = T>,
        F: Fn(&T) -> Estimate + Send + Sync + 'static,
    {
        Self {
            executor,
            tasks: tasks.into_iter().map(Arc::new).collect(),
            estimate: Box::new(estimate),
            priority: Priority::Normal,
            policy: FailurePolicy::CollectAll,
        }
    }

    /// Sets the priority of every task of the batch.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the failure policy.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// `true` for a batch without tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Priority every task of the batch is queued at.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Partial-failure policy of the batch.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Builds one job per task, indexed by submission order.
    pub(crate) fn into_jobs(self, batch: BatchId) -> (Vec<Job>, Receivers<E::Output>) {
        let mut jobs = Vec::with_capacity(self.tasks.len());
        let mut receivers = Vec::with_capacity(self.tasks.len());
        for (index, task) in self.tasks.into_iter().enumerate() {
            let est = (self.estimate)(&*task).with_priority(self.priority);
            let (job, rx) = Job::new(Arc::clone(&self.executor), task, Some(batch), index, est);
            jobs.push(job);
            receivers.push(rx);
        }
        (jobs, receivers)
    }
}
