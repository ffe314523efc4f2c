//! CRM API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use crm_api::telemetry::{init_tracer, shutdown_tracer, TelemetryConfig};
use crm_api::{create_api_router, ApiConfig, ApiError, ApiResult, AuthConfig, DbClient, DbConfig};
use crm_storage::PositionStore;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;
    let store: Arc<dyn PositionStore> = Arc::new(db);

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();
    let app = create_api_router(store, &api_config, auth_config)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting CRM API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    shutdown_tracer();
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("CRM_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("CRM_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
