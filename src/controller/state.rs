//! # Concurrency controller.
//!
//! Owns the single mutable integer of the scheduler: the *current target
//! concurrency*. It is updated only
//! - at adjustment-interval boundaries, or
//! - out of band, the moment a fresh snapshot crosses the emergency memory
//!   threshold (never wait a full interval to react to a crash risk).
//!
//! The controller lives inside the pool state and is driven exclusively by
//! `TaskPool::tick`; other components only ever see copies of its target.
//!
//! ## Re-evaluation rules
//! ```text
//! refresh(snapshot, estimate, running, now)
//!   ├─ emergency crossed (was calm, now > threshold) → evaluate now (EmergencyTriggered)
//!   ├─ now - last_evaluated >= adjustment_interval  → evaluate (ConcurrencyAdjusted if changed)
//!   └─ otherwise                                    → keep target
//! ```

use tokio::time::Instant;

use super::decision::{Decision, DecisionReason, compute_target_concurrency};
use crate::config::PoolConfig;
use crate::tasks::Estimate;
use crate::telemetry::MetricsSnapshot;

/// A change of the target concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    /// Target before the change.
    pub previous: usize,
    /// Target after the change.
    pub target: usize,
    /// Decision branch.
    pub reason: DecisionReason,
    /// `true` when evaluated out of band because of an emergency crossing.
    pub out_of_band: bool,
}

/// Holds and updates the target concurrency.
#[derive(Debug)]
pub struct ConcurrencyController {
    target: usize,
    last_evaluated: Option<Instant>,
    last_reason: Option<DecisionReason>,
    in_emergency: bool,
}

impl ConcurrencyController {
    /// Creates a controller starting at `default_concurrency`.
    pub fn new(cfg: &PoolConfig) -> Self {
        Self {
            target: cfg.default_concurrency,
            last_evaluated: None,
            last_reason: None,
            in_emergency: false,
        }
    }

    /// Current target concurrency.
    #[inline]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Branch of the last evaluation, if any.
    #[inline]
    pub fn last_reason(&self) -> Option<DecisionReason> {
        self.last_reason
    }

    /// Re-evaluates the target if due (or on an emergency crossing).
    ///
    /// Returns the adjustment when the target changed.
    pub fn refresh(
        &mut self,
        cfg: &PoolConfig,
        snapshot: &MetricsSnapshot,
        estimate: &Estimate,
        running: usize,
        now: Instant,
    ) -> Option<Adjustment> {
        let emergency = snapshot.is_memory_emergency(cfg);
        let crossed = emergency && !self.in_emergency;
        self.in_emergency = emergency;

        let due = self
            .last_evaluated
            .is_none_or(|at| now.saturating_duration_since(at) >= cfg.adjustment_interval);
        if !due && !crossed {
            return None;
        }

        let Decision { target, reason } =
            compute_target_concurrency(cfg, snapshot, estimate, running);
        self.last_evaluated = Some(now);
        self.last_reason = Some(reason);

        if target == self.target {
            return None;
        }
        let previous = std::mem::replace(&mut self.target, target);
        Some(Adjustment {
            previous,
            target,
            reason,
            out_of_band: crossed && !due,
        })
    }

    /// Applies a new config: clamps the target into the new bounds and
    /// forces a full evaluation on the next refresh.
    ///
    /// Returns `(previous, clamped)` targets.
    pub fn reconfigure(&mut self, cfg: &PoolConfig) -> (usize, usize) {
        let previous = self.target;
        self.target = cfg.clamp_concurrency(self.target);
        self.last_evaluated = None;
        (previous, self.target)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn cfg() -> PoolConfig {
        PoolConfig {
            min_concurrency: 2,
            max_concurrency: 16,
            default_concurrency: 4,
            emergency_memory_pressure: 0.8,
            adjustment_interval: Duration::from_millis(250),
            ..PoolConfig::default()
        }
    }

    fn est() -> Estimate {
        Estimate::new(20_000_000, Duration::from_millis(50))
    }

    fn calm() -> MetricsSnapshot {
        MetricsSnapshot::new(0.3, 0.3, 60.0, 1_000_000_000)
    }

    fn pressured() -> MetricsSnapshot {
        MetricsSnapshot::new(0.3, 0.9, 60.0, 1_000_000_000)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_refresh_evaluates_immediately() {
        let c = cfg();
        let mut ctl = ConcurrencyController::new(&c);
        assert_eq!(ctl.target(), 4);

        let adj = ctl.refresh(&c, &calm(), &est(), 0, Instant::now());
        assert_eq!(
            adj,
            Some(Adjustment {
                previous: 4,
                target: 16,
                reason: DecisionReason::Headroom,
                out_of_band: false,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_regular_changes_wait_for_interval() {
        let c = cfg();
        let mut ctl = ConcurrencyController::new(&c);
        let t0 = Instant::now();
        ctl.refresh(&c, &calm(), &est(), 0, t0);

        let busy = MetricsSnapshot::new(0.9, 0.3, 60.0, 1_000_000_000);
        assert_eq!(ctl.refresh(&c, &busy, &est(), 16, t0 + Duration::from_millis(100)), None);
        assert_eq!(ctl.target(), 16);

        let adj = ctl.refresh(&c, &busy, &est(), 16, t0 + Duration::from_millis(250));
        assert_eq!(adj.map(|a| a.target), Some(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_crossing_is_out_of_band() {
        let c = cfg();
        let mut ctl = ConcurrencyController::new(&c);
        let t0 = Instant::now();
        ctl.refresh(&c, &calm(), &est(), 0, t0);

        let adj = ctl
            .refresh(&c, &pressured(), &est(), 16, t0 + Duration::from_millis(1))
            .expect("emergency must adjust");
        assert_eq!(adj.target, 2);
        assert_eq!(adj.reason, DecisionReason::MemoryEmergency);
        assert!(adj.out_of_band);

        // Still in emergency: no growth until the pressure drops and the interval passes.
        assert_eq!(
            ctl.refresh(&c, &pressured(), &est(), 2, t0 + Duration::from_millis(2)),
            None
        );
        assert_eq!(ctl.refresh(&c, &calm(), &est(), 2, t0 + Duration::from_millis(3)), None);
        assert_eq!(ctl.target(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_clamps_and_forces_evaluation() {
        let c = cfg();
        let mut ctl = ConcurrencyController::new(&c);
        let t0 = Instant::now();
        ctl.refresh(&c, &calm(), &est(), 0, t0);
        assert_eq!(ctl.target(), 16);

        let narrow = PoolConfig {
            max_concurrency: 6,
            default_concurrency: 3,
            ..c
        };
        assert_eq!(ctl.reconfigure(&narrow), (16, 6));
        let adj = ctl.refresh(&narrow, &calm(), &est(), 6, t0 + Duration::from_millis(1));
        assert_eq!(adj, None);
        assert_eq!(ctl.last_reason(), Some(DecisionReason::Headroom));
    }
}
