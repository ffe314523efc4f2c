//! CRM Pipeline API
//!
//! REST layer over the pipeline: stages and opportunities kept in a
//! user-defined order with fractional positions. Handlers stay thin; the
//! ordering rules live in `crm-core` and the service layer here, storage
//! sits behind `crm_storage::PositionStore` (PostgreSQL in production,
//! `MockStorage` in tests).

pub mod auth;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod telemetry;
pub mod types;

pub use auth::{
    authenticate, authenticate_api_key, authenticate_jwt, extract_tenant_id,
    generate_jwt_token, validate_api_key, validate_jwt_token, AuthConfig, AuthContext, AuthMethod,
    Claims,
};
pub use config::ApiConfig;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{auth_middleware, rate_limit_middleware, AuthExtractor, AuthMiddlewareState};
pub use openapi::ApiDoc;
pub use routes::{create_api_router, SecureRouterBuilder};
pub use types::*;
