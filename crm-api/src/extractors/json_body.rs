//! JSON body extraction that rejects with an `ApiError` body.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Drop-in for `axum::Json` whose rejections are 400 `INVALID_INPUT`
/// (or `MISSING_FIELD`-style detail) in the standard error shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(rejection_to_api_error(rejection)),
        }
    }
}

fn rejection_to_api_error(rejection: JsonRejection) -> ApiError {
    let reason = rejection.body_text();
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Expected request with `Content-Type: application/json`"
        }
        JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
        JsonRejection::JsonDataError(_) => "Request body does not match the expected shape",
        _ => "Failed to read request body",
    };
    ApiError::invalid_input(message).with_details(serde_json::json!({ "reason": reason }))
}
