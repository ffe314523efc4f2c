//! Observability: OpenTelemetry tracing and Prometheus metrics.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{enable_metrics, metrics_handler, CrmMetrics, ReorderOutcome, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, shutdown_tracer, TelemetryConfig};
