//! Prometheus Metrics Definitions
//!
//! All CRM metrics live in the default registry and are exposed at
//! `/metrics` for scraping. Nothing is registered or recorded until
//! [`enable_metrics`] runs.

use axum::{http::StatusCode, response::IntoResponse};
use crm_core::{CrmError, CrmResult, EntityType, ReorderError, StorageError};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds), 1ms to 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

const DB_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Rows renumbered by one rebalance.
const REBALANCE_SIZE_BUCKETS: &[f64] = &[1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0];

pub static METRICS: Lazy<ApiResult<CrmMetrics>> = Lazy::new(CrmMetrics::new);

/// Register the metric families. Until this is called [`with_metrics`]
/// records nothing.
pub fn enable_metrics() {
    if let Err(e) = Lazy::force(&METRICS) {
        tracing::error!(error = %e, "metrics disabled after registration failure");
    }
}

/// Run `f` against the global metrics if they are enabled and registered.
pub fn with_metrics(f: impl FnOnce(&CrmMetrics)) {
    if let Some(Ok(metrics)) = Lazy::get(&METRICS) {
        f(metrics);
    }
}

/// How a reorder request ended, as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    Success,
    InvalidInput,
    Unauthorized,
    NotFound,
    Failed,
}

impl ReorderOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReorderOutcome::Success => "success",
            ReorderOutcome::InvalidInput => "invalid_input",
            ReorderOutcome::Unauthorized => "unauthorized",
            ReorderOutcome::NotFound => "not_found",
            ReorderOutcome::Failed => "failed",
        }
    }

    pub fn of<T>(result: &CrmResult<T>) -> Self {
        match result {
            Ok(_) => ReorderOutcome::Success,
            Err(CrmError::Reorder(ReorderError::InvalidReorderInput { .. }))
            | Err(CrmError::Validation(_)) => ReorderOutcome::InvalidInput,
            Err(CrmError::Reorder(ReorderError::Unauthorized { .. })) => {
                ReorderOutcome::Unauthorized
            }
            Err(CrmError::Storage(StorageError::NotFound { .. })) => ReorderOutcome::NotFound,
            Err(_) => ReorderOutcome::Failed,
        }
    }
}

#[derive(Clone)]
pub struct CrmMetrics {
    /// labels: method, path, status
    pub http_requests_total: CounterVec,

    /// labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// labels: operation, entity, status
    pub db_operations_total: CounterVec,

    /// labels: operation, entity
    pub db_operation_duration_seconds: HistogramVec,

    /// labels: entity, outcome
    pub reorders_total: CounterVec,

    /// labels: entity, trigger (exhausted | manual)
    pub rebalances_total: CounterVec,

    /// labels: entity
    pub rebalance_size: HistogramVec,
}

impl CrmMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        let register_err =
            |name: &str, e: prometheus::Error| ApiError::internal_error(format!("Failed to register {}: {}", name, e));

        Ok(Self {
            http_requests_total: register_counter_vec!(
                "crm_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| register_err("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "crm_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| register_err("http_request_duration_seconds", e))?,

            db_operations_total: register_counter_vec!(
                "crm_db_operations_total",
                "Total number of database operations",
                &["operation", "entity", "status"]
            )
            .map_err(|e| register_err("db_operations_total", e))?,

            db_operation_duration_seconds: register_histogram_vec!(
                "crm_db_operation_duration_seconds",
                "Database operation duration in seconds",
                &["operation", "entity"],
                DB_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| register_err("db_operation_duration_seconds", e))?,

            reorders_total: register_counter_vec!(
                "crm_reorders_total",
                "Reorder and stage-change requests by outcome",
                &["entity", "outcome"]
            )
            .map_err(|e| register_err("reorders_total", e))?,

            rebalances_total: register_counter_vec!(
                "crm_rebalances_total",
                "Partition renumberings",
                &["entity", "trigger"]
            )
            .map_err(|e| register_err("rebalances_total", e))?,

            rebalance_size: register_histogram_vec!(
                "crm_rebalance_size",
                "Number of rows renumbered per rebalance",
                &["entity"],
                REBALANCE_SIZE_BUCKETS.to_vec()
            )
            .map_err(|e| register_err("rebalance_size", e))?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_db_operation(
        &self,
        operation: &str,
        entity: &str,
        success: bool,
        duration_secs: f64,
    ) {
        let status = if success { "success" } else { "error" };
        self.db_operations_total
            .with_label_values(&[operation, entity, status])
            .inc();
        self.db_operation_duration_seconds
            .with_label_values(&[operation, entity])
            .observe(duration_secs);
    }

    pub fn record_reorder(&self, entity: EntityType, outcome: ReorderOutcome) {
        self.reorders_total
            .with_label_values(&[entity.as_str(), outcome.as_str()])
            .inc();
    }

    pub fn record_rebalance(&self, entity: EntityType, trigger: &str, rows: usize) {
        self.rebalances_total
            .with_label_values(&[entity.as_str(), trigger])
            .inc();
        self.rebalance_size
            .with_label_values(&[entity.as_str()])
            .observe(rows as f64);
    }
}

/// GET /metrics - Prometheus text format
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the registry so an idle process still exposes the families.
    Lazy::force(&METRICS);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
