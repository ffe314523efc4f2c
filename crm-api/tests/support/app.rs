use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use crm_api::{auth::JwtSecret, create_api_router, generate_jwt_token, ApiConfig, AuthConfig};
use crm_core::TenantId;
use crm_test_utils::MockStorage;
use serde::de::DeserializeOwned;
use tower::ServiceExt;

pub const TEST_API_KEY: &str = "integration_test_key";

pub fn test_auth_config() -> Result<AuthConfig, String> {
    let mut auth = AuthConfig::default();
    auth.add_api_key(TEST_API_KEY.to_string());
    auth.jwt_secret =
        JwtSecret::new("integration_test_secret".to_string()).map_err(|e| e.to_string())?;
    Ok(auth)
}

/// Full router over a shared `MockStorage`, rate limiting off.
pub fn test_app(storage: Arc<MockStorage>) -> Result<Router, String> {
    let auth = test_auth_config()?;
    let api = ApiConfig {
        rate_limit_enabled: false,
        ..ApiConfig::default()
    };
    create_api_router(storage, &api, auth).map_err(|e| e.message)
}

/// Authenticated request acting as `tenant`.
pub fn api_request(
    method: Method,
    uri: &str,
    tenant: TenantId,
    body: Option<serde_json::Value>,
) -> Result<Request<Body>, String> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", TEST_API_KEY)
        .header("x-tenant-id", tenant.to_string());
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .map_err(|e| e.to_string())
}

/// Request authenticated with a JWT whose `tenant_id` claim is `tenant`.
pub fn bearer_request(
    method: Method,
    uri: &str,
    tenant: TenantId,
    body: Option<serde_json::Value>,
) -> Result<Request<Body>, String> {
    let config = test_auth_config()?;
    let token = generate_jwt_token(&config, "test-user".to_string(), Some(tenant))
        .map_err(|e| e.message)?;
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .map_err(|e| e.to_string())
}

/// Send a request and return the status with the raw body.
pub async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Vec<u8>), String> {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| e.to_string())?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| e.to_string())?;
    Ok((status, bytes.to_vec()))
}

pub fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    serde_json::from_slice(bytes).map_err(|e| format!("{}: {}", e, String::from_utf8_lossy(bytes)))
}
