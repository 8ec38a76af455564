//! # Task abstractions.
//!
//! This module provides the task-related types:
//! - [`Priority`], [`Estimate`] - scheduling inputs supplied by the caller
//! - [`TaskId`], [`BatchId`] - identifiers used in events
//! - [`TaskExecutor`] - trait for running one kind of task
//! - [`ExecutorFn`] - closure-backed executor

mod estimate;
mod executor;
pub(crate) mod job;

pub use estimate::{BatchId, Estimate, Priority, TaskId};
pub use executor::{ExecutorFn, TaskExecutor};
