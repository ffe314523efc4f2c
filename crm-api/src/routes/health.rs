//! Liveness and readiness probes, mounted outside the authenticated API.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use crm_core::CrmResult;
use crm_storage::PositionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    fn http_status(self) -> StatusCode {
        match self {
            Self::Healthy => StatusCode::OK,
            Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthDetails {
    /// Position store (Postgres or in-memory).
    pub storage: ComponentHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_probe(result: CrmResult<()>, took: Duration) -> Self {
        match result {
            Ok(()) => Self {
                status: HealthStatus::Healthy,
                latency_ms: Some(u64::try_from(took.as_millis()).unwrap_or(u64::MAX)),
                error: None,
            },
            Err(e) => Self {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Clone)]
pub struct HealthState {
    pub store: Arc<dyn PositionStore>,
    pub start_time: Instant,
}

#[utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses((status = 200, description = "Plain `pong`", body = String)),
)]
pub async fn ping() -> &'static str {
    "pong"
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Process is running", body = HealthResponse)),
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("alive".to_string()),
        details: None,
    })
}

/// Ready once the position store answers a ping; 503 otherwise.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Store reachable", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = HealthResponse),
    ),
)]
pub async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let started = Instant::now();
    let probe = state.store.ping().await;
    if let Err(e) = &probe {
        tracing::warn!(error = %e, "position store failed readiness probe");
    }
    let storage = ComponentHealth::from_probe(probe, started.elapsed());
    let status = storage.status;

    let body = HealthResponse {
        status,
        message: None,
        details: Some(HealthDetails {
            storage,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };
    (status.http_status(), Json(body))
}

pub fn create_router(store: Arc<dyn PositionStore>) -> Router {
    let state = Arc::new(HealthState {
        store,
        start_time: Instant::now(),
    });
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use crm_storage::MockStorage;
    use tower::ServiceExt;

    async fn get_json(store: Arc<MockStorage>, uri: &str) -> Result<(StatusCode, serde_json::Value), String> {
        let response = create_router(store)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        Ok((status, json))
    }

    #[tokio::test]
    async fn test_ready_when_store_answers() -> Result<(), String> {
        let (status, body) = get_json(Arc::new(MockStorage::new()), "/ready").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["details"]["storage"]["status"], "healthy");
        assert!(body["details"]["storage"].get("error").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_not_ready_when_store_fails() -> Result<(), String> {
        let store = Arc::new(MockStorage::new());
        store.fail_writes(true);
        let (status, body) = get_json(store, "/ready").await?;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
        assert!(body["details"]["storage"]["error"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn test_live_skips_details() -> Result<(), String> {
        let store = Arc::new(MockStorage::new());
        store.fail_writes(true);
        let (status, body) = get_json(store, "/live").await?;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("details").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_ping() -> Result<(), String> {
        let (status, _) = get_json(Arc::new(MockStorage::new()), "/ping").await?;
        assert_eq!(status, StatusCode::OK);
        Ok(())
    }
}
