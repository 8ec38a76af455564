//! # Task executors.
//!
//! A [`TaskExecutor`] knows how to run one kind of task (`T`) and produce its
//! output. The scheduler never runs a task on its own: it only decides *when*
//! the executor is invoked.
//!
//! [`ExecutorFn`] wraps a closure `F: Fn(Arc<T>, CancellationToken) -> Fut`,
//! producing a fresh future per task.
//!
//! ## Cancellation
//! Cancellation is cooperative. Each run receives a [`CancellationToken`];
//! the watchdog cancels it (and calls [`TaskExecutor::cancel`]) when the task
//! overruns its estimate. Executors that cannot observe cancellation should
//! return `false` from [`TaskExecutor::cancellable`]; their overruns are
//! flagged but the task keeps its slot until it returns.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use genvisor::{ExecutorFn, TaskError};
//!
//! let exec = ExecutorFn::arc("noise", |seed: Arc<u64>, _ctx: CancellationToken| async move {
//!     Ok::<_, TaskError>(*seed * 2)
//! });
//! assert_eq!(exec.name(), "noise");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// # Runs tasks of type `T`.
///
/// Implementations should check `ctx.is_cancelled()` (or select on
/// `ctx.cancelled()`) at safe points and return [`TaskError::Canceled`].
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use genvisor::{TaskError, TaskExecutor};
///
/// struct Mesher;
///
/// #[async_trait]
/// impl TaskExecutor<[i32; 3]> for Mesher {
///     type Output = usize;
///
///     async fn run(&self, chunk: Arc<[i32; 3]>, ctx: CancellationToken) -> Result<usize, TaskError> {
///         if ctx.is_cancelled() {
///             return Err(TaskError::Canceled);
///         }
///         Ok(chunk.iter().map(|c| c.unsigned_abs() as usize).sum())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor<T>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    /// Value produced by one successful run.
    type Output: Send + 'static;

    /// Executes one task until completion or cancellation.
    async fn run(&self, task: Arc<T>, ctx: CancellationToken) -> Result<Self::Output, TaskError>;

    /// Best-effort cancellation hook, invoked by the watchdog after the
    /// task's token has been cancelled. Default: no-op.
    fn cancel(&self, _task: &T) {}

    /// Whether runs of this executor respond to cancellation.
    ///
    /// When `false`, the watchdog only flags overruns.
    fn cancellable(&self) -> bool {
        true
    }

    /// Short name used as the task label in events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed executor.
///
/// Wraps a closure that *creates* a new future per task.
pub struct ExecutorFn<T, F> {
    name: Cow<'static, str>,
    f: F,
    cancellable: bool,
    _task: PhantomData<fn(Arc<T>)>,
}

impl<T, F> ExecutorFn<T, F> {
    /// Creates a new function-backed executor.
    ///
    /// Prefer [`ExecutorFn::arc`] when you immediately need an `Arc`.
    pub fn new<Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Arc<T>, CancellationToken) -> Fut,
    {
        Self {
            name: name.into(),
            f,
            cancellable: true,
            _task: PhantomData,
        }
    }

    /// Creates the executor and returns it as a shared handle.
    pub fn arc<Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self>
    where
        F: Fn(Arc<T>, CancellationToken) -> Fut,
    {
        Arc::new(Self::new(name, f))
    }

    /// Marks runs as ignoring their cancellation token.
    pub fn uncancellable(mut self) -> Self {
        self.cancellable = false;
        self
    }

    /// Returns the executor name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl<T, F, Fut, R> TaskExecutor<T> for ExecutorFn<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, TaskError>> + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    async fn run(&self, task: Arc<T>, ctx: CancellationToken) -> Result<R, TaskError> {
        (self.f)(task, ctx).await
    }

    fn cancellable(&self) -> bool {
        self.cancellable
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_executor_fn_runs_closure() {
        let exec = ExecutorFn::arc("double", |n: Arc<u32>, _ctx: CancellationToken| async move {
            Ok::<_, TaskError>(*n * 2)
        });
        let out = exec.run(Arc::new(21), CancellationToken::new()).await;
        assert_eq!(out, Ok(42));
        assert_eq!(TaskExecutor::<u32>::name(exec.as_ref()), "double");
        assert!(TaskExecutor::<u32>::cancellable(exec.as_ref()));
    }

    #[test]
    fn test_uncancellable_flag() {
        let exec = ExecutorFn::new("stubborn", |_n: Arc<u32>, _ctx: CancellationToken| async {
            Ok::<_, TaskError>(())
        })
        .uncancellable();
        assert!(!TaskExecutor::<u32>::cancellable(&exec));
    }
}
