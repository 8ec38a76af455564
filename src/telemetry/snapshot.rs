//! # Point-in-time system metrics.
//!
//! A [`MetricsSnapshot`] is immutable: the sampler replaces it wholesale on
//! every sample and hands out copies.

use tokio::time::Instant;

use crate::config::PoolConfig;

/// Immutable record of system telemetry at `captured_at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    /// CPU utilization in `[0, 1]`.
    pub cpu_usage: f64,
    /// Memory pressure in `[0, 1]`.
    pub memory_pressure: f64,
    /// Frames per second (`f64::INFINITY` for headless hosts).
    pub frame_rate: f64,
    /// Memory still available to generation work, in bytes.
    pub available_memory_bytes: u64,
    /// Capture time.
    pub captured_at: Instant,
    /// `true` if this is the conservative fallback used after a telemetry failure.
    pub fallback: bool,
}

impl MetricsSnapshot {
    /// Creates a snapshot captured now, clamping ratios into `[0, 1]`
    /// and the frame rate to `>= 0`.
    pub fn new(
        cpu_usage: f64,
        memory_pressure: f64,
        frame_rate: f64,
        available_memory_bytes: u64,
    ) -> Self {
        Self {
            cpu_usage: cpu_usage.clamp(0.0, 1.0),
            memory_pressure: memory_pressure.clamp(0.0, 1.0),
            frame_rate: frame_rate.max(0.0),
            available_memory_bytes,
            captured_at: Instant::now(),
            fallback: false,
        }
    }

    /// Conservative snapshot used when telemetry is unavailable.
    ///
    /// Saturated cpu and memory with no available memory, so any failure
    /// degrades toward *lower* concurrency.
    pub fn fallback(emergency_frame_rate: f64) -> Self {
        Self {
            cpu_usage: 1.0,
            memory_pressure: 1.0,
            frame_rate: emergency_frame_rate,
            available_memory_bytes: 0,
            captured_at: Instant::now(),
            fallback: true,
        }
    }

    /// Whether memory pressure is above the emergency threshold.
    #[inline]
    pub fn is_memory_emergency(&self, cfg: &PoolConfig) -> bool {
        self.memory_pressure > cfg.emergency_memory_pressure
    }

    /// Whether the frame rate is below the emergency threshold.
    #[inline]
    pub fn is_frame_rate_emergency(&self, cfg: &PoolConfig) -> bool {
        self.frame_rate < cfg.emergency_frame_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_ratios() {
        let s = MetricsSnapshot::new(1.7, -0.2, -5.0, 10);
        assert_eq!(s.cpu_usage, 1.0);
        assert_eq!(s.memory_pressure, 0.0);
        assert_eq!(s.frame_rate, 0.0);
        assert!(!s.fallback);
    }

    #[test]
    fn test_fallback_is_an_emergency() {
        let cfg = PoolConfig::default();
        let s = MetricsSnapshot::fallback(cfg.emergency_frame_rate);
        assert!(s.fallback);
        assert!(s.is_memory_emergency(&cfg));
        assert_eq!(s.available_memory_bytes, 0);
        assert_eq!(s.cpu_usage, 1.0);
    }
}
