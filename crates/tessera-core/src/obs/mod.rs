//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! This module does not access index stores directly.
//! Engine code reports through `MetricsEvent` and `tracing` only.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, IndexCounters};
pub use sink::{
    MetricsEvent, MetricsSink, PlanKind, metrics_report, metrics_reset_all, with_metrics_sink,
};
