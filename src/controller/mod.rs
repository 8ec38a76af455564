//! Concurrency controller: converts telemetry into a target concurrency.
//!
//! ## Contents
//! - [`compute_target_concurrency`] the pure, emergency-first decision
//! - [`ConcurrencyController`] owner of the current target and its cadence

mod decision;
mod state;

pub use decision::{
    CPU_HEADROOM_THRESHOLD, Decision, DecisionReason, FRAME_RATE_RETAIN,
    compute_target_concurrency, max_by_memory,
};
pub use state::{Adjustment, ConcurrencyController};
