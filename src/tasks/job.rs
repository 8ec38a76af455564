//! # Type-erased unit of work.
//!
//! The pool stores tasks of many batches (and many `T`/`Output` types) in the
//! same queues. A [`Job`] erases the types: it carries the metadata the pool
//! schedules on, a one-shot launcher, a cancellation hook and a write-once
//! result sink.
//!
//! ## Result delivery
//! ```text
//! launcher future ──► executor.run() ──► ResultSlot::resolve(Ok | Err)
//! watchdog        ──────────────────────► ResultSink::fail(WatchdogCancelled)
//! batch abandon   ──────────────────────► ResultSink::fail(Canceled)
//! ```
//! The first writer wins; later writers observe `false` and the launcher
//! reports [`JobExit::Superseded`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tasks::{BatchId, Estimate, TaskExecutor, TaskId};

/// How a launched job ended, as seen by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobExit {
    /// Executor returned `Ok` and the value was delivered.
    Completed,
    /// Executor returned an error (or panicked) and it was delivered.
    Failed(TaskError),
    /// Result was already resolved by someone else (watchdog, abandonment).
    Superseded,
}

/// Write-once destination of a task's result, with the value type erased.
pub(crate) trait ResultSink: Send + Sync {
    /// Resolves the task with an error. Returns `false` if already resolved.
    fn fail(&self, error: TaskError) -> bool;

    /// `true` once a result (of any writer) was delivered.
    fn is_resolved(&self) -> bool;
}

/// Typed write-once result slot backed by a oneshot channel.
pub(crate) struct ResultSlot<R> {
    tx: Mutex<Option<oneshot::Sender<Result<R, TaskError>>>>,
}

impl<R: Send> ResultSlot<R> {
    pub(crate) fn new() -> (Arc<Self>, oneshot::Receiver<Result<R, TaskError>>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
        });
        (slot, rx)
    }

    /// Delivers `res` if nobody did before. A dropped receiver still counts
    /// as delivered.
    pub(crate) fn resolve(&self, res: Result<R, TaskError>) -> bool {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match tx {
            Some(tx) => {
                let _ = tx.send(res);
                true
            }
            None => false,
        }
    }
}

impl<R: Send> ResultSink for ResultSlot<R> {
    fn fail(&self, error: TaskError) -> bool {
        self.resolve(Err(error))
    }

    fn is_resolved(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Metadata the pool schedules on.
#[derive(Debug, Clone)]
pub(crate) struct JobMeta {
    pub id: TaskId,
    pub batch: Option<BatchId>,
    /// Submission index inside the batch (0 for single tasks).
    pub index: usize,
    pub label: Arc<str>,
    pub estimate: Estimate,
    pub cancellable: bool,
}

type Launcher = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, JobExit> + Send>;

/// Type-erased queued task.
pub(crate) struct Job {
    pub meta: JobMeta,
    pub sink: Arc<dyn ResultSink>,
    pub cancel_hook: Arc<dyn Fn() + Send + Sync>,
    launch: Launcher,
}

impl Job {
    /// Builds a job for `task` run by `exec`, returning the receiver of its result.
    pub(crate) fn new<T, E>(
        exec: Arc<E>,
        task: Arc<T>,
        batch: Option<BatchId>,
        index: usize,
        estimate: Estimate,
    ) -> (Self, oneshot::Receiver<Result<E::Output, TaskError>>)
    where
        T: Send + Sync + 'static,
        E: TaskExecutor<T>,
    {
        let (slot, rx) = ResultSlot::<E::Output>::new();
        let meta = JobMeta {
            id: TaskId::next(),
            batch,
            index,
            label: Arc::from(exec.name()),
            estimate,
            cancellable: exec.cancellable(),
        };

        let run_exec = Arc::clone(&exec);
        let run_task = Arc::clone(&task);
        let run_slot = Arc::clone(&slot);
        let launch: Launcher = Box::new(move |ctx: CancellationToken| {
            async move {
                let res = AssertUnwindSafe(run_exec.run(run_task, ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        Err(TaskError::Panicked {
                            info: panic_message(payload.as_ref()),
                        })
                    });
                let exit = match &res {
                    Ok(_) => JobExit::Completed,
                    Err(e) => JobExit::Failed(e.clone()),
                };
                if run_slot.resolve(res) {
                    exit
                } else {
                    JobExit::Superseded
                }
            }
            .boxed()
        });

        let job = Self {
            meta,
            sink: slot,
            cancel_hook: Arc::new(move || exec.cancel(&task)),
            launch,
        };
        (job, rx)
    }

    /// Consumes the job, returning its future bound to `ctx`.
    pub(crate) fn launch(self, ctx: CancellationToken) -> BoxFuture<'static, JobExit> {
        (self.launch)(ctx)
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
