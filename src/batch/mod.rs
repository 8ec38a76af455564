//! Batch submission: spec, failure policy and the caller-side handles.

mod handle;
mod policy;
mod spec;

pub use handle::{BatchHandle, BatchResults, TaskHandle};
pub use policy::FailurePolicy;
pub use spec::BatchSpec;
