//! # Pool configuration.
//!
//! Provides [`PoolConfig`], the centralized settings for the scheduler:
//! concurrency bounds, emergency thresholds, cadences and queue capacity.
//!
//! Config is used in two ways:
//! 1. **Scheduler creation**: `Scheduler::builder(config, telemetry)`
//! 2. **Hot reload**: `Scheduler::configure(config)`
//!
//! Both paths call [`PoolConfig::validate`]; an invalid config is rejected
//! before any state changes.
//!
//! ## Invariants
//! - `1 <= min_concurrency <= default_concurrency <= max_concurrency`
//! - `0 < emergency_memory_pressure < 1`
//! - `emergency_frame_rate > 0`
//! - every interval/timeout is non-zero, `queue_capacity >= 1`, `overrun_factor >= 1`

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration of the adaptive task pool.
///
/// ## Field semantics
/// - `min_concurrency`: hard floor, used under memory emergency
/// - `max_concurrency`: hard ceiling, never exceeded by the controller
/// - `default_concurrency`: starting target; `default * 2` caps normal scaling
/// - `adjustment_interval`: cadence of regular re-evaluation of the target
/// - `emergency_memory_pressure`: pressure above which the floor is forced immediately
/// - `emergency_frame_rate`: frame rate below which concurrency is cut by 30%
/// - `queue_capacity`: queued tasks before Normal/Low/Background submissions are refused
/// - `tick_interval`: cadence of the admission tick
/// - `watchdog_interval`: cadence of the overrun scan
/// - `overrun_factor`: multiplier on estimated duration before a task counts as runaway
/// - `telemetry_timeout`: maximum time a telemetry read may take
/// - `bus_capacity`: event bus ring buffer size (build time only)
/// - `grace`: maximum wait for running tasks on shutdown
#[derive(Clone, Debug, PartialEq)]
pub struct PoolConfig {
    /// Lowest target concurrency (>= 1).
    pub min_concurrency: usize,
    /// Highest target concurrency.
    pub max_concurrency: usize,
    /// Initial target concurrency.
    pub default_concurrency: usize,
    /// Regular re-evaluation cadence of the target.
    pub adjustment_interval: Duration,
    /// Memory pressure in (0, 1) above which the floor is forced.
    pub emergency_memory_pressure: f64,
    /// Frames per second below which concurrency is reduced.
    pub emergency_frame_rate: f64,
    /// Maximum number of queued tasks for backpressure-subject priorities.
    pub queue_capacity: usize,
    /// Admission tick cadence.
    pub tick_interval: Duration,
    /// Watchdog scan cadence.
    pub watchdog_interval: Duration,
    /// Multiplier on `Estimate::duration` before the watchdog steps in.
    pub overrun_factor: u32,
    /// Timeout of one telemetry sample.
    pub telemetry_timeout: Duration,
    /// Capacity of the event bus (minimum 1). Not hot-reloadable.
    pub bus_capacity: usize,
    /// Maximum wait for running tasks during shutdown.
    pub grace: Duration,
}

impl PoolConfig {
    /// Checks the config invariants.
    ///
    /// # Example
    /// ```
    /// use genvisor::{ConfigError, PoolConfig};
    ///
    /// let mut cfg = PoolConfig::default();
    /// cfg.default_concurrency = cfg.max_concurrency + 1;
    /// assert!(matches!(cfg.validate(), Err(ConfigError::DefaultOutOfRange { .. })));
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_concurrency == 0 {
            return Err(ConfigError::ZeroMinConcurrency);
        }
        if self.max_concurrency < self.min_concurrency {
            return Err(ConfigError::MaxBelowMin {
                min: self.min_concurrency,
                max: self.max_concurrency,
            });
        }
        if !(self.min_concurrency..=self.max_concurrency).contains(&self.default_concurrency) {
            return Err(ConfigError::DefaultOutOfRange {
                min: self.min_concurrency,
                default: self.default_concurrency,
                max: self.max_concurrency,
            });
        }
        if !(self.emergency_memory_pressure > 0.0 && self.emergency_memory_pressure < 1.0) {
            return Err(ConfigError::EmergencyMemoryPressure(
                self.emergency_memory_pressure,
            ));
        }
        if !(self.emergency_frame_rate.is_finite() && self.emergency_frame_rate > 0.0) {
            return Err(ConfigError::EmergencyFrameRate(self.emergency_frame_rate));
        }
        if self.overrun_factor == 0 {
            return Err(ConfigError::OverrunFactor);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        for (name, d) in [
            ("adjustment_interval", self.adjustment_interval),
            ("tick_interval", self.tick_interval),
            ("watchdog_interval", self.watchdog_interval),
            ("telemetry_timeout", self.telemetry_timeout),
        ] {
            if d.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        Ok(())
    }

    /// Clamps `n` into `[min_concurrency, max_concurrency]`.
    #[inline]
    pub fn clamp_concurrency(&self, n: usize) -> usize {
        n.clamp(self.min_concurrency, self.max_concurrency)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for PoolConfig {
    /// Default configuration:
    ///
    /// - concurrency `min = 1`, `default = 4`, `max = 16`
    /// - `adjustment_interval = 250ms`, `tick_interval = 10ms`, `watchdog_interval = 100ms`
    /// - `emergency_memory_pressure = 0.85`, `emergency_frame_rate = 30`
    /// - `queue_capacity = 4096`, `overrun_factor = 5`
    /// - `telemetry_timeout = 5ms`, `bus_capacity = 1024`, `grace = 5s`
    fn default() -> Self {
        Self {
            min_concurrency: 1,
            max_concurrency: 16,
            default_concurrency: 4,
            adjustment_interval: Duration::from_millis(250),
            emergency_memory_pressure: 0.85,
            emergency_frame_rate: 30.0,
            queue_capacity: 4096,
            tick_interval: Duration::from_millis(10),
            watchdog_interval: Duration::from_millis(100),
            overrun_factor: 5,
            telemetry_timeout: Duration::from_millis(5),
            bus_capacity: 1024,
            grace: Duration::from_secs(5),
        }
    }
}
