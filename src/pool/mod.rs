//! Priority queues, running set and the tick-driven admission pool.

mod queue;
mod running;
mod task_pool;

pub(crate) use running::RunState;
pub(crate) use task_pool::{ParkGuard, TaskPool};
pub use task_pool::{PoolStatus, TickReport};
