//! REST API Routes Module
//!
//! - Opportunity routes under /api/v1/opportunities
//! - Pipeline stage routes under /api/v1/pipeline-stages
//! - Health checks under /health (public)
//! - Metrics (when enabled) and the OpenAPI document (public, rate-limited)

pub mod health;
pub mod opportunity;
pub mod pipeline_stage;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use crm_storage::PositionStore;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{auth_middleware, rate_limit_middleware, AuthMiddlewareState, RateLimitState};
use crate::openapi::ApiDoc;
use crate::telemetry::{enable_metrics, metrics_handler, observability_middleware};

pub use health::create_router as health_router;
pub use opportunity::create_router as opportunity_router;
pub use pipeline_stage::create_router as pipeline_stage_router;

// ============================================================================
// OPENAPI ENDPOINTS
// ============================================================================

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(feature = "openapi")]
async fn openapi_yaml() -> impl IntoResponse {
    use axum::http::StatusCode;

    match ApiDoc::to_yaml() {
        Ok(yaml) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/yaml")], yaml),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("Failed to generate YAML: {}", e),
        ),
    }
}

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

fn is_production_environment() -> bool {
    std::env::var("CRM_ENVIRONMENT")
        .map(|e| matches!(e.to_lowercase().as_str(), "production" | "prod"))
        .unwrap_or(false)
}

fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set CRM_CORS_ORIGINS.",
        ));
    }
    if !config.rate_limit_enabled {
        tracing::warn!("Rate limiting is disabled in production. Set CRM_RATE_LIMIT_ENABLED=true.");
    }
    Ok(())
}

// ============================================================================
// SECURE ROUTER BUILDER
// ============================================================================

/// Builds the API router with auth, rate limiting, observability and CORS.
///
/// Health, metrics and the OpenAPI document skip authentication but are
/// still rate-limited.
pub struct SecureRouterBuilder {
    store: Arc<dyn PositionStore>,
    api_config: ApiConfig,
    auth_state: AuthMiddlewareState,
    rate_limit_state: RateLimitState,
}

impl SecureRouterBuilder {
    /// In production this refuses to start with an insecure JWT secret or
    /// without configured CORS origins.
    pub fn new(
        store: Arc<dyn PositionStore>,
        api_config: ApiConfig,
        auth_config: AuthConfig,
    ) -> ApiResult<Self> {
        let production = is_production_environment();
        auth_config.check_secret(production)?;
        if production {
            validate_api_config_for_production(&api_config)?;
        }

        let auth_state = AuthMiddlewareState::new(auth_config);
        let rate_limit_state = RateLimitState::new(api_config.clone());

        Ok(Self {
            store,
            api_config,
            auth_state,
            rate_limit_state,
        })
    }

    fn build_entity_routes(&self) -> Router {
        Router::new()
            .nest("/opportunities", opportunity::create_router(self.store.clone()))
            .nest("/pipeline-stages", pipeline_stage::create_router(self.store.clone()))
    }

    /// Execution order: CORS -> Observability -> Auth (/api/v1 only) -> Rate Limiting -> Handler
    ///
    /// Inside `/api/v1` the limiter runs after auth and buckets by tenant;
    /// the public routes are bucketed by client IP.
    pub fn build(self) -> Router {
        let api_routes = self
            .build_entity_routes()
            .layer(from_fn_with_state(self.rate_limit_state.clone(), rate_limit_middleware))
            .layer(from_fn_with_state(self.auth_state.clone(), auth_middleware));

        let mut public = Router::new()
            .nest("/health", health::create_router(self.store.clone()))
            .route("/openapi.json", get(openapi_json));

        if self.api_config.metrics_enabled {
            enable_metrics();
            public = public.route("/metrics", get(metrics_handler));
        }

        #[cfg(feature = "openapi")]
        {
            public = public.route("/openapi.yaml", get(openapi_yaml));
        }

        #[cfg(feature = "swagger-ui")]
        {
            use utoipa_swagger_ui::SwaggerUi;
            public = public.merge(SwaggerUi::new("/swagger-ui").url("/swagger-ui/openapi.json", ApiDoc::openapi()));
        }

        let public = public.layer(from_fn_with_state(self.rate_limit_state, rate_limit_middleware));
        let cors = build_cors_layer(&self.api_config);

        Router::new()
            .nest("/api/v1", api_routes)
            .merge(public)
            .layer(from_fn(observability_middleware))
            .layer(cors)
    }
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Empty origins allow any origin (development); otherwise only the listed
/// ones, with `*.domain` entries matching https subdomains.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-tenant-id"),
        ])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("retry-after"),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.is_production() {
        tracing::info!("CORS: development mode, allowing all origins");
        return cors.allow_origin(Any);
    }

    tracing::info!(origins = ?config.cors_origins, "CORS: restricted origins");
    let allowed = config.clone();
    let cors = cors.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _parts: &axum::http::request::Parts| {
            origin
                .to_str()
                .map(|o| allowed.is_origin_allowed(o))
                .unwrap_or(false)
        },
    ));

    if config.cors_allow_credentials {
        cors.allow_credentials(true)
    } else {
        cors
    }
}

/// Create the complete API router.
pub fn create_api_router(
    store: Arc<dyn PositionStore>,
    api_config: &ApiConfig,
    auth_config: AuthConfig,
) -> ApiResult<Router> {
    SecureRouterBuilder::new(store, api_config.clone(), auth_config).map(SecureRouterBuilder::build)
}
