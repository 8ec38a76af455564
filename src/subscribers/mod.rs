//! # Event subscribers.
//!
//! [`Subscribe`] is the extension point; [`SubscriberSet`] fans events out to
//! every subscriber through its own bounded queue and worker.
//!
//! ```text
//! Bus ──► Scheduler listener ──► SubscriberSet::emit(&Event)
//!                                   ├──► LogWriter (feature "logging")
//!                                   ├──► metrics / overlays
//!                                   └──► ...
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
