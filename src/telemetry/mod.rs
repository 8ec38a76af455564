//! Telemetry: snapshots, providers and the sampling adapter.
//!
//! ## Contents
//! - [`MetricsSnapshot`] immutable point-in-time metrics
//! - [`TelemetryProvider`] collaborator trait the host implements
//! - [`ManualTelemetry`] settable provider
//! - `TelemetrySampler` timeout + conservative-fallback adapter (internal)

mod provider;
pub(crate) mod sampler;
mod snapshot;

pub use provider::{ManualTelemetry, TelemetryProvider};
pub use snapshot::MetricsSnapshot;
