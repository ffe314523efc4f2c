//! Per-request tracing span, Prometheus recording and `traceparent`
//! propagation.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use opentelemetry::{global, Context};
use opentelemetry_http::HeaderExtractor;
use regex::Regex;
use std::time::Instant;
use tracing::{field::Empty, info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::metrics::with_metrics;

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("UUID pattern is a valid regex")
});

static NUMERIC_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d+(/|$)").expect("numeric segment pattern is a valid regex"));

fn extract_trace_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Replace ids in a path with `{id}` to keep metric label cardinality flat.
pub fn normalize_path(path: &str) -> String {
    let result = UUID_SEGMENT.replace_all(path, "{id}");
    NUMERIC_SEGMENT
        .replace_all(&result, "/{id}$1")
        .into_owned()
}

pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = normalize_path(&path);

    let span = info_span!(
        "http_request",
        otel.name = %format!("{} {}", method, route),
        otel.kind = "server",
        otel.status_code = Empty,
        http.method = %method,
        http.target = %path,
        http.route = %route,
        http.status_code = Empty,
        tenant_id = Empty,
    );
    let _ = span.set_parent(extract_trace_context(request.headers()));

    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    let duration = start.elapsed();

    with_metrics(|m| {
        m.record_http_request(method.as_str(), &route, status.as_u16(), duration.as_secs_f64())
    });

    span.record("http.status_code", status.as_u16());
    span.record(
        "otel.status_code",
        if status.is_server_error() || status.is_client_error() {
            "ERROR"
        } else {
            "OK"
        },
    );

    tracing::info!(
        parent: &span,
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}
