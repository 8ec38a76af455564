//! # Target concurrency decision.
//!
//! Pure function from a [`MetricsSnapshot`], the next task's [`Estimate`] and
//! the current running count to a target concurrency. Branches are evaluated
//! top-down and the first match wins:
//!
//! ```text
//! 1. memory_pressure > emergency_memory_pressure  → min                          (MemoryEmergency)
//! 2. frame_rate < emergency_frame_rate            → max(min, ⌊running · 0.7⌋)    (FrameRateEmergency)
//! 3. max_by_memory = ⌊available / est.memory⌋
//!    cpu < 0.5 && max_by_memory > default · 2     → min(max, max_by_memory)      (Headroom)
//! 4. otherwise                                    → min(default · 2, max_by_memory, max) ≥ min  (Default)
//! ```
//!
//! Every result is clamped to `[min_concurrency, max_concurrency]`.

use crate::config::PoolConfig;
use crate::tasks::Estimate;
use crate::telemetry::MetricsSnapshot;

/// CPU usage below which spare memory may be turned into extra concurrency.
pub const CPU_HEADROOM_THRESHOLD: f64 = 0.5;

/// Fraction of the running count kept when the frame rate collapses.
pub const FRAME_RATE_RETAIN: f64 = 0.7;

/// Which branch of the decision produced a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionReason {
    /// Memory pressure above the emergency threshold; floor forced.
    MemoryEmergency,
    /// Frame rate below the emergency threshold; running count cut by 30%.
    FrameRateEmergency,
    /// Idle cpu and ample memory; scaled up to the memory bound.
    Headroom,
    /// Regular bound: twice the default, limited by memory.
    Default,
}

impl DecisionReason {
    /// Returns a short stable label for logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            DecisionReason::MemoryEmergency => "memory_emergency",
            DecisionReason::FrameRateEmergency => "frame_rate_emergency",
            DecisionReason::Headroom => "headroom",
            DecisionReason::Default => "default",
        }
    }

    /// Whether the decision was an emergency override.
    pub fn is_emergency(self) -> bool {
        matches!(
            self,
            DecisionReason::MemoryEmergency | DecisionReason::FrameRateEmergency
        )
    }
}

/// Outcome of [`compute_target_concurrency`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Target concurrency, within `[min_concurrency, max_concurrency]`.
    pub target: usize,
    /// Branch that produced it.
    pub reason: DecisionReason,
}

/// Number of tasks of size `estimate` that fit into `available` bytes.
///
/// A zero-byte estimate is not memory bound.
pub fn max_by_memory(available: u64, estimate: &Estimate) -> usize {
    if estimate.memory_bytes == 0 {
        return usize::MAX;
    }
    usize::try_from(available / estimate.memory_bytes).unwrap_or(usize::MAX)
}

/// Computes the target concurrency for the next admission round.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use genvisor::{compute_target_concurrency, DecisionReason, Estimate, MetricsSnapshot, PoolConfig};
///
/// let cfg = PoolConfig {
///     min_concurrency: 2,
///     max_concurrency: 16,
///     default_concurrency: 4,
///     emergency_memory_pressure: 0.8,
///     ..PoolConfig::default()
/// };
/// let est = Estimate::new(20_000_000, Duration::from_millis(50));
///
/// let calm = MetricsSnapshot::new(0.3, 0.3, 60.0, 1_000_000_000);
/// let d = compute_target_concurrency(&cfg, &calm, &est, 0);
/// assert_eq!((d.target, d.reason), (16, DecisionReason::Headroom));
///
/// let pressured = MetricsSnapshot::new(0.3, 0.9, 60.0, 1_000_000_000);
/// let d = compute_target_concurrency(&cfg, &pressured, &est, 0);
/// assert_eq!((d.target, d.reason), (2, DecisionReason::MemoryEmergency));
/// ```
pub fn compute_target_concurrency(
    cfg: &PoolConfig,
    snapshot: &MetricsSnapshot,
    estimate: &Estimate,
    running: usize,
) -> Decision {
    let (target, reason) = if snapshot.is_memory_emergency(cfg) {
        (cfg.min_concurrency, DecisionReason::MemoryEmergency)
    } else if snapshot.is_frame_rate_emergency(cfg) {
        let retained = (running as f64 * FRAME_RATE_RETAIN).floor() as usize;
        (
            retained.max(cfg.min_concurrency),
            DecisionReason::FrameRateEmergency,
        )
    } else {
        let by_memory = max_by_memory(snapshot.available_memory_bytes, estimate);
        let doubled = cfg.default_concurrency.saturating_mul(2);
        if snapshot.cpu_usage < CPU_HEADROOM_THRESHOLD && by_memory > doubled {
            (cfg.max_concurrency.min(by_memory), DecisionReason::Headroom)
        } else {
            let bound = doubled.min(by_memory).min(cfg.max_concurrency);
            (bound.max(cfg.min_concurrency), DecisionReason::Default)
        }
    };

    Decision {
        target: cfg.clamp_concurrency(target),
        reason,
    }
}
