//! # Cadence drivers.
//!
//! Two independent loops, each on its own period read from the live config:
//! - the **tick loop** calls `TaskPool::tick` every `tick_interval`;
//! - the **watchdog loop** calls `Watchdog::scan` every `watchdog_interval`.
//!
//! A config reload re-arms a loop's interval when its period changed. Missed
//! periods are delayed, never bursted, so a slow tick cannot trigger a
//! catch-up storm.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PoolConfig;

fn interval(period: Duration) -> Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Spawns a loop calling `step` once per `period_of(config)` until `token` is cancelled.
pub(super) fn spawn<F, Fut>(
    name: &'static str,
    mut config: watch::Receiver<Arc<PoolConfig>>,
    period_of: fn(&PoolConfig) -> Duration,
    token: CancellationToken,
    mut step: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut period = period_of(&**config.borrow_and_update());
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                changed = config.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = period_of(&**config.borrow_and_update());
                    if next != period {
                        debug!(driver = name, ?period, ?next, "driver period changed");
                        period = next;
                        ticker = interval(period);
                    }
                }
                _ = ticker.tick() => step().await,
            }
        }
        debug!(driver = name, "driver stopped");
    })
}
