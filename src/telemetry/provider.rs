//! # Telemetry providers.
//!
//! The scheduler consumes, but does not implement, system telemetry. A
//! [`TelemetryProvider`] reads memory pressure, cpu usage, frame rate and
//! available memory from wherever the host keeps them (OS counters, the
//! render loop, a cgroup).
//!
//! [`ManualTelemetry`] is a settable provider for hosts that already compute
//! these figures (e.g. a game loop pushing its frame rate) and for tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TelemetryError;

/// Source of live system telemetry.
///
/// Reads should be cheap; the sampler abandons any read slower than
/// `PoolConfig::telemetry_timeout` and falls back to a conservative snapshot.
#[async_trait]
pub trait TelemetryProvider: Send + Sync + 'static {
    /// Memory pressure in `[0, 1]`.
    async fn memory_pressure(&self) -> Result<f64, TelemetryError>;

    /// CPU utilization in `[0, 1]`.
    async fn cpu_usage(&self) -> Result<f64, TelemetryError>;

    /// Frames per second. Headless hosts return `f64::INFINITY`.
    async fn frame_rate(&self) -> Result<f64, TelemetryError>;

    /// Bytes of memory available to generation work.
    async fn available_memory_bytes(&self) -> Result<u64, TelemetryError>;

    /// Provider name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Settable telemetry provider.
///
/// ## Example
/// ```rust
/// use genvisor::ManualTelemetry;
///
/// let telemetry = ManualTelemetry::new();
/// telemetry.set_memory_pressure(0.9);
/// telemetry.set_frame_rate(24.0);
/// ```
#[derive(Debug)]
pub struct ManualTelemetry {
    memory_pressure: AtomicU64,
    cpu_usage: AtomicU64,
    frame_rate: AtomicU64,
    available_memory: AtomicU64,
    unavailable: AtomicBool,
    delay_ms: AtomicU64,
}

impl ManualTelemetry {
    /// Idle host: no pressure, no cpu load, 60 fps, 8 GiB available.
    pub fn new() -> Self {
        Self {
            memory_pressure: AtomicU64::new(0.0f64.to_bits()),
            cpu_usage: AtomicU64::new(0.0f64.to_bits()),
            frame_rate: AtomicU64::new(60.0f64.to_bits()),
            available_memory: AtomicU64::new(8 * 1024 * 1024 * 1024),
            unavailable: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    /// Sets memory pressure.
    pub fn set_memory_pressure(&self, v: f64) {
        self.memory_pressure.store(v.to_bits(), Ordering::Relaxed);
    }

    /// Sets cpu usage.
    pub fn set_cpu_usage(&self, v: f64) {
        self.cpu_usage.store(v.to_bits(), Ordering::Relaxed);
    }

    /// Sets frame rate.
    pub fn set_frame_rate(&self, v: f64) {
        self.frame_rate.store(v.to_bits(), Ordering::Relaxed);
    }

    /// Sets available memory.
    pub fn set_available_memory(&self, bytes: u64) {
        self.available_memory.store(bytes, Ordering::Relaxed);
    }

    /// Makes every read fail with [`TelemetryError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Delays every read by `d` (simulates a stalled counter source).
    pub fn set_read_delay(&self, d: Duration) {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.delay_ms.store(ms, Ordering::Relaxed);
    }

    async fn read(&self, cell: &AtomicU64) -> Result<u64, TelemetryError> {
        let delay = self.delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(TelemetryError::Unavailable("manual telemetry disabled".into()));
        }
        Ok(cell.load(Ordering::Relaxed))
    }
}

impl Default for ManualTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryProvider for ManualTelemetry {
    async fn memory_pressure(&self) -> Result<f64, TelemetryError> {
        self.read(&self.memory_pressure).await.map(f64::from_bits)
    }

    async fn cpu_usage(&self) -> Result<f64, TelemetryError> {
        self.read(&self.cpu_usage).await.map(f64::from_bits)
    }

    async fn frame_rate(&self) -> Result<f64, TelemetryError> {
        self.read(&self.frame_rate).await.map(f64::from_bits)
    }

    async fn available_memory_bytes(&self) -> Result<u64, TelemetryError> {
        self.read(&self.available_memory).await
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_values_round_trip() {
        let t = ManualTelemetry::new();
        t.set_memory_pressure(0.42);
        t.set_available_memory(1_000);
        assert_eq!(t.memory_pressure().await, Ok(0.42));
        assert_eq!(t.available_memory_bytes().await, Ok(1_000));
        assert_eq!(t.frame_rate().await, Ok(60.0));
    }

    #[tokio::test]
    async fn test_unavailable_fails_reads() {
        let t = ManualTelemetry::new();
        t.set_unavailable(true);
        assert!(matches!(
            t.cpu_usage().await,
            Err(TelemetryError::Unavailable(_))
        ));
    }
}
