//! OpenTelemetry Tracer Initialization
//!
//! Exports spans over OTLP/HTTP when `CRM_OTLP_ENDPOINT` is set; otherwise
//! spans stay local and only the JSON log layer emits anything.

use once_cell::sync::OnceCell;
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    Resource,
};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP/HTTP endpoint for traces, e.g. "http://localhost:4318/v1/traces"
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
    pub service_version: String,
    /// production, staging, development
    pub environment: String,
    /// Fraction of traces sampled, clamped to 0.0..=1.0
    pub trace_sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: std::env::var("CRM_OTLP_ENDPOINT").ok(),
            service_name: std::env::var("CRM_SERVICE_NAME")
                .unwrap_or_else(|_| "crm-api".to_string()),
            service_version: std::env::var("CRM_SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            environment: std::env::var("CRM_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            trace_sample_rate: std::env::var("CRM_TRACE_SAMPLE_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
        }
    }
}

impl TelemetryConfig {
    pub fn sampler(&self) -> Sampler {
        if self.trace_sample_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.trace_sample_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.trace_sample_rate)
        }
    }
}

/// Install the W3C propagator, the tracer provider and the global
/// `tracing` subscriber. Call once, before any span is opened.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", config.service_version.clone()),
            KeyValue::new("deployment.environment", config.environment.clone()),
        ])
        .build();

    let builder = SdkTracerProvider::builder()
        .with_sampler(config.sampler())
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource);

    let tracer_provider = match &config.otlp_endpoint {
        Some(endpoint) => {
            let exporter = SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint)
                .build()
                .map_err(|e| {
                    ApiError::internal_error(format!("Failed to create OTLP exporter: {}", e))
                })?;
            builder.with_batch_exporter(exporter).build()
        }
        None => builder.build(),
    };

    let tracer = tracer_provider.tracer("crm-api");
    global::set_tracer_provider(tracer_provider.clone());
    let _ = TRACER_PROVIDER.set(tracer_provider);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crm_api=debug,tower_http=debug,info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(OpenTelemetryLayer::new(tracer))
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        "Telemetry initialized"
    );

    Ok(())
}

/// Flush pending spans. Call before process exit.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Tracer shutdown reported an error");
            return;
        }
    }
    tracing::info!("Tracer shutdown complete");
}
