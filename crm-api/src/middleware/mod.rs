//! Request middleware: authentication and per-client rate limiting.

pub mod auth;
pub mod rate_limit;

pub use auth::{auth_middleware, AuthExtractor, AuthMiddlewareError, AuthMiddlewareState};
pub use rate_limit::{rate_limit_middleware, RateLimitError, RateLimitKey, RateLimitState};
