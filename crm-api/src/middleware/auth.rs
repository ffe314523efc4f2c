//! Authentication layer for `/api/v1`.

use crate::auth::{authenticate, AuthConfig, AuthContext};
use crate::error::ApiError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub auth_config: Arc<AuthConfig>,
}

impl AuthMiddlewareState {
    pub fn new(auth_config: AuthConfig) -> Self {
        Self {
            auth_config: Arc::new(auth_config),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Resolve the caller and store its [`AuthContext`] in request extensions.
///
/// Rejections use the `ApiError` status: 401 for credentials, 400 for a
/// missing or malformed tenant.
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let headers = request.headers();
    let context = authenticate(
        &state.auth_config,
        header(headers, "x-api-key"),
        header(headers, "authorization"),
        header(headers, "x-tenant-id"),
    )
    .map_err(|e| {
        tracing::debug!(code = ?e.code, "request rejected by auth");
        AuthMiddlewareError(e)
    })?;

    tracing::Span::current().record("tenant_id", tracing::field::display(context.tenant_id));
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

/// The authenticated caller, as placed by [`auth_middleware`].
///
/// On a route without the middleware this rejects with 500.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = AuthMiddlewareError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthContext>() {
            Some(context) => Ok(Self(context.clone())),
            None => Err(AuthMiddlewareError(ApiError::internal_error(
                "route is missing auth_middleware",
            ))),
        }
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
