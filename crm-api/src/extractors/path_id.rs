//! Typed entity id extraction from path parameters.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use crm_core::EntityIdType;
use uuid::Uuid;

use crate::error::ApiError;

/// Extracts a single `:id` path parameter as a typed entity id.
///
/// ```rust,ignore
/// async fn get_opportunity(PathId(id): PathId<OpportunityId>) -> ApiResult<Json<Opportunity>> {
///     // id is OpportunityId, not Uuid
/// }
/// ```
///
/// A malformed id is rejected with 400 `INVALID_FORMAT` naming the entity.
#[derive(Debug, Clone, Copy)]
pub struct PathId<T: EntityIdType>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathId<T>
where
    S: Send + Sync,
    T: EntityIdType,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(uuid): Path<Uuid> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                ApiError::invalid_format(T::ENTITY_NAME, "UUID").with_details(
                    serde_json::json!({
                        "path": parts.uri.path(),
                        "reason": e.body_text(),
                    }),
                )
            })?;

        Ok(PathId(T::new(uuid)))
    }
}

impl<T: EntityIdType> std::ops::Deref for PathId<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
