//! Opportunity REST API Routes
//!
//! Create, fetch and delete opportunities, reorder them inside their stage,
//! and move them across stages.

use axum::{http::StatusCode, response::IntoResponse, Json};
use crm_core::OpportunityId;
use crm_storage::PositionStore;
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    extractors::{ApiJson, PathId},
    middleware::AuthExtractor,
    services::{self, NewOpportunity},
    types::{ChangeStageRequest, CreateOpportunityRequest, OpportunityResponse, ReorderRequest},
};

// ============================================================================
// SHARED STATE
// ============================================================================

#[derive(Clone)]
pub struct OpportunityState {
    pub store: Arc<dyn PositionStore>,
}

impl OpportunityState {
    pub fn new(store: Arc<dyn PositionStore>) -> Self {
        Self { store }
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/opportunities - Create an opportunity at the end of a stage
#[utoipa::path(
    post,
    path = "/api/v1/opportunities",
    tag = "Opportunities",
    request_body = CreateOpportunityRequest,
    responses(
        (status = 201, description = "Opportunity created", body = OpportunityResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Stage belongs to another tenant", body = ApiError),
        (status = 404, description = "Stage not found", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn create_opportunity(
    axum::extract::State(state): axum::extract::State<Arc<OpportunityState>>,
    AuthExtractor(auth): AuthExtractor,
    ApiJson(req): ApiJson<CreateOpportunityRequest>,
) -> ApiResult<impl IntoResponse> {
    let opportunity = services::create_opportunity(
        state.store.as_ref(),
        auth.tenant_id,
        NewOpportunity {
            stage_id: req.stage_id,
            name: req.name,
            amount: req.amount,
            company_id: req.company_id,
            contact_id: req.contact_id,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(OpportunityResponse::from(opportunity))))
}

/// GET /api/v1/opportunities/{id} - Get an opportunity
#[utoipa::path(
    get,
    path = "/api/v1/opportunities/{id}",
    tag = "Opportunities",
    params(
        ("id" = Uuid, Path, description = "Opportunity ID")
    ),
    responses(
        (status = 200, description = "Opportunity details", body = OpportunityResponse),
        (status = 403, description = "Opportunity belongs to another tenant", body = ApiError),
        (status = 404, description = "Opportunity not found", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn get_opportunity(
    axum::extract::State(state): axum::extract::State<Arc<OpportunityState>>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<OpportunityId>,
) -> ApiResult<Json<OpportunityResponse>> {
    let opportunity = services::get_opportunity(state.store.as_ref(), auth.tenant_id, id).await?;
    Ok(Json(opportunity.into()))
}

/// DELETE /api/v1/opportunities/{id} - Delete an opportunity
#[utoipa::path(
    delete,
    path = "/api/v1/opportunities/{id}",
    tag = "Opportunities",
    params(
        ("id" = Uuid, Path, description = "Opportunity ID")
    ),
    responses(
        (status = 204, description = "Opportunity deleted"),
        (status = 403, description = "Opportunity belongs to another tenant", body = ApiError),
        (status = 404, description = "Opportunity not found", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn delete_opportunity(
    axum::extract::State(state): axum::extract::State<Arc<OpportunityState>>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<OpportunityId>,
) -> ApiResult<StatusCode> {
    services::delete_opportunity(state.store.as_ref(), auth.tenant_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/v1/opportunities/{id}/stage - Move an opportunity to a stage
///
/// Stage and position are written together. Without neighbors the
/// opportunity goes to the end of the destination stage.
#[utoipa::path(
    patch,
    path = "/api/v1/opportunities/{id}/stage",
    tag = "Opportunities",
    params(
        ("id" = Uuid, Path, description = "Opportunity ID")
    ),
    request_body = ChangeStageRequest,
    responses(
        (status = 200, description = "Opportunity moved", body = OpportunityResponse),
        (status = 400, description = "Invalid neighbors", body = ApiError),
        (status = 403, description = "Opportunity or stage belongs to another tenant", body = ApiError),
        (status = 404, description = "Opportunity or stage not found", body = ApiError),
        (status = 500, description = "Persistence failure", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn change_stage(
    axum::extract::State(state): axum::extract::State<Arc<OpportunityState>>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<OpportunityId>,
    ApiJson(req): ApiJson<ChangeStageRequest>,
) -> ApiResult<Json<OpportunityResponse>> {
    let moved = services::move_opportunity_to_stage(
        state.store.as_ref(),
        auth.tenant_id,
        id,
        req.stage_id,
        req.neighbors(),
    )
    .await?;
    Ok(Json(moved.item.into()))
}

/// POST /api/v1/opportunities/{id}/reorder - Reorder inside the current stage
#[utoipa::path(
    post,
    path = "/api/v1/opportunities/{id}/reorder",
    tag = "Opportunities",
    params(
        ("id" = Uuid, Path, description = "Opportunity ID")
    ),
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "Opportunity reordered", body = OpportunityResponse),
        (status = 400, description = "Missing or invalid neighbors", body = ApiError),
        (status = 403, description = "Opportunity belongs to another tenant", body = ApiError),
        (status = 404, description = "Opportunity not found", body = ApiError),
        (status = 500, description = "Persistence failure", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn reorder_opportunity(
    axum::extract::State(state): axum::extract::State<Arc<OpportunityState>>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<OpportunityId>,
    ApiJson(req): ApiJson<ReorderRequest>,
) -> ApiResult<Json<OpportunityResponse>> {
    let moved =
        services::reorder_opportunity(state.store.as_ref(), auth.tenant_id, id, req.neighbors())
            .await?;
    Ok(Json(moved.item.into()))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router(store: Arc<dyn PositionStore>) -> axum::Router {
    let state = Arc::new(OpportunityState::new(store));

    axum::Router::new()
        .route("/", axum::routing::post(create_opportunity))
        .route(
            "/:id",
            axum::routing::get(get_opportunity).delete(delete_opportunity),
        )
        .route("/:id/stage", axum::routing::patch(change_stage))
        .route("/:id/reorder", axum::routing::post(reorder_opportunity))
        .with_state(state)
}
