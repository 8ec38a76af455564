use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::scheduler::Scheduler;
use crate::config::PoolConfig;
use crate::error::ConfigError;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::telemetry::TelemetryProvider;
use crate::telemetry::sampler::TelemetrySampler;

/// Builder for constructing a [`Scheduler`].
pub struct SchedulerBuilder {
    cfg: PoolConfig,
    telemetry: Arc<dyn TelemetryProvider>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    manual: bool,
}

impl SchedulerBuilder {
    /// Creates a new builder with the given configuration and telemetry source.
    pub fn new(cfg: PoolConfig, telemetry: Arc<dyn TelemetryProvider>) -> Self {
        Self {
            cfg,
            telemetry,
            subscribers: Vec::new(),
            manual: false,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Does not spawn the tick and watchdog loops.
    ///
    /// The embedder drives [`Scheduler::tick`] and [`Scheduler::scan_watchdog`]
    /// from its own timer (e.g. once per frame of a game loop).
    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }

    /// Validates the configuration and starts the scheduler.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<Arc<Scheduler>, ConfigError> {
        self.cfg.validate()?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let sampler = TelemetrySampler::new(self.telemetry, bus.clone(), &self.cfg);
        let runtime_token = CancellationToken::new();

        let sched = Arc::new(Scheduler::new_internal(
            Arc::new(self.cfg),
            bus,
            sampler,
            runtime_token,
        ));
        sched.subscriber_listener(subs);
        if !self.manual {
            sched.spawn_drivers();
        }
        Ok(sched)
    }
}
