//! Scheduler facade, its builder and the cadence drivers.

mod builder;
mod driver;
mod scheduler;

pub use builder::SchedulerBuilder;
pub use scheduler::Scheduler;
