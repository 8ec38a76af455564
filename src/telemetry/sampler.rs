//! # Telemetry sampler.
//!
//! Wraps a [`TelemetryProvider`] with the two guarantees the controller
//! relies on:
//! - a sample never takes longer than `PoolConfig::telemetry_timeout`;
//! - a failed, slow or invalid read yields [`MetricsSnapshot::fallback`],
//!   so failure degrades toward lower concurrency, never higher.
//!
//! The latest snapshot is kept in a `watch` channel for read-only access.
//!
//! ## Flow
//! ```text
//! sample(cfg)
//!   ├─► timeout(cfg.telemetry_timeout, read all four counters)
//!   │      ├─ Ok(valid)          → snapshot
//!   │      └─ Err / timeout      → fallback snapshot
//!   │                              publish TelemetryUnavailable (on transition only)
//!   └─► latest.send_replace(snapshot)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, warn};

use super::{MetricsSnapshot, TelemetryProvider};
use crate::config::PoolConfig;
use crate::error::TelemetryError;
use crate::events::{Bus, Event, EventKind};

/// Samples a provider under a timeout and publishes the latest snapshot.
pub(crate) struct TelemetrySampler {
    provider: Arc<dyn TelemetryProvider>,
    bus: Bus,
    latest: watch::Sender<MetricsSnapshot>,
    degraded: AtomicBool,
}

impl TelemetrySampler {
    /// Creates a sampler; until the first sample, the current snapshot is the fallback.
    pub(crate) fn new(provider: Arc<dyn TelemetryProvider>, bus: Bus, cfg: &PoolConfig) -> Self {
        let (latest, _rx) = watch::channel(MetricsSnapshot::fallback(cfg.emergency_frame_rate));
        Self {
            provider,
            bus,
            latest,
            degraded: AtomicBool::new(false),
        }
    }

    /// Takes a fresh sample (bounded by `cfg.telemetry_timeout`).
    pub(crate) async fn sample(&self, cfg: &PoolConfig) -> MetricsSnapshot {
        let read = time::timeout(cfg.telemetry_timeout, read_snapshot(self.provider.as_ref()))
            .await
            .unwrap_or(Err(TelemetryError::Timeout(cfg.telemetry_timeout)));

        let snapshot = match read {
            Ok(s) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    debug!(provider = self.provider.name(), "telemetry recovered");
                }
                s
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!(
                        provider = self.provider.name(),
                        error = %e,
                        "telemetry unavailable, using conservative fallback"
                    );
                    self.bus.publish(
                        Event::new(EventKind::TelemetryUnavailable)
                            .with_task(self.provider.name())
                            .with_reason(e.to_string()),
                    );
                }
                MetricsSnapshot::fallback(cfg.emergency_frame_rate)
            }
        };

        self.latest.send_replace(snapshot);
        snapshot
    }

    /// Returns the most recent snapshot.
    pub(crate) fn current(&self) -> MetricsSnapshot {
        *self.latest.borrow()
    }

    /// Returns a receiver observing every new snapshot.
    pub(crate) fn watch(&self) -> watch::Receiver<MetricsSnapshot> {
        self.latest.subscribe()
    }
}

/// Reads all counters concurrently and validates them.
async fn read_snapshot(p: &dyn TelemetryProvider) -> Result<MetricsSnapshot, TelemetryError> {
    let (memory, cpu, fps, available) = tokio::try_join!(
        p.memory_pressure(),
        p.cpu_usage(),
        p.frame_rate(),
        p.available_memory_bytes(),
    )?;

    let memory = ratio("memory_pressure", memory)?;
    let cpu = ratio("cpu_usage", cpu)?;
    if fps.is_nan() || fps < 0.0 {
        return Err(TelemetryError::Invalid {
            metric: "frame_rate",
            value: fps,
        });
    }
    Ok(MetricsSnapshot::new(cpu, memory, fps, available))
}

/// Accepts any non-negative number; values above 1 are clamped by the snapshot.
fn ratio(metric: &'static str, value: f64) -> Result<f64, TelemetryError> {
    if value.is_nan() || value < 0.0 {
        return Err(TelemetryError::Invalid { metric, value });
    }
    Ok(value)
}
