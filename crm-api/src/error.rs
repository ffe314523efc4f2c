//! JSON error responses.
//!
//! Every failure leaves the API as `{"code": "...", "message": "..."}` with
//! an optional `details` object. The HTTP status is a function of `code`.
//! Domain errors from `crm_core` convert through the `From` impls at the
//! bottom of this file; persistence details never reach the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crm_core::{CrmError, EntityType, ReorderError, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error category, serialized as `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 401
    Unauthorized,
    InvalidToken,
    TokenExpired,

    /// The resource belongs to another tenant.
    Forbidden,

    // 400
    ValidationFailed,
    InvalidInput,
    /// Neighbor positions missing, unordered or not finite.
    InvalidReorderInput,
    MissingField,
    InvalidFormat,

    // 404
    OpportunityNotFound,
    StageNotFound,

    TooManyRequests,

    // 500
    InternalError,
    DatabaseError,
}

impl ErrorCode {
    pub fn status_code(self) -> StatusCode {
        use ErrorCode::*;
        match self {
            Unauthorized | InvalidToken | TokenExpired => StatusCode::UNAUTHORIZED,
            Forbidden => StatusCode::FORBIDDEN,
            ValidationFailed | InvalidInput | InvalidReorderInput | MissingField
            | InvalidFormat => StatusCode::BAD_REQUEST,
            OpportunityNotFound | StageNotFound => StatusCode::NOT_FOUND,
            TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            InternalError | DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Extra context such as the offending field or the parser's reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(self, details: serde_json::Value) -> Self {
        Self {
            details: Some(details),
            ..self
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn token_expired() -> Self {
        Self::new(ErrorCode::TokenExpired, "Token has expired")
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_reorder_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidReorderInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorCode::MissingField, format!("{} is required", field))
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("{} must be a {}", field, expected),
        )
    }

    /// 404 with the entity-specific code.
    pub fn not_found(entity_type: EntityType, id: impl fmt::Display) -> Self {
        let code = match entity_type {
            EntityType::Opportunity => ErrorCode::OpportunityNotFound,
            EntityType::PipelineStage => ErrorCode::StageNotFound,
        };
        Self::new(code, format!("{} {} not found", entity_type.as_str(), id))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Too many requests, retry in {}s", secs),
            None => "Too many requests".to_string(),
        };
        Self::new(ErrorCode::TooManyRequests, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl From<ReorderError> for ApiError {
    fn from(err: ReorderError) -> Self {
        match err {
            ReorderError::InvalidReorderInput { reason } => Self::invalid_reorder_input(reason),
            ReorderError::Unauthorized {
                entity_type,
                acting,
                owner,
            } => {
                tracing::warn!(
                    entity_type = entity_type.as_str(),
                    acting_tenant = %acting,
                    owner_tenant = %owner,
                    "cross-tenant access rejected"
                );
                Self::forbidden(format!("{} belongs to another tenant", entity_type.as_str()))
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity_type, id } => Self::not_found(entity_type, id),
            other => {
                tracing::error!(error = %other, "persistence failure");
                Self::database_error("Database operation failed")
            }
        }
    }
}

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::Reorder(e) => e.into(),
            CrmError::Storage(e) => e.into(),
            CrmError::Validation(e) => Self::new(ErrorCode::ValidationFailed, e.to_string()),
            CrmError::Config(e) => {
                tracing::error!(error = %e, "configuration error");
                Self::internal_error("Server misconfigured")
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
