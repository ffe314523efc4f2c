//! Pipeline Stage REST API Routes

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use crm_core::{EntityType, StageId};
use crm_storage::PositionStore;
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    extractors::{ApiJson, PathId},
    middleware::AuthExtractor,
    services,
    types::{
        CreatePipelineStageRequest, ListOpportunitiesResponse, ListPipelineStagesResponse,
        PipelineStageResponse, RebalanceResponse, ReorderRequest,
    },
};

#[derive(Clone)]
pub struct PipelineStageState {
    pub store: Arc<dyn PositionStore>,
}

impl PipelineStageState {
    pub fn new(store: Arc<dyn PositionStore>) -> Self {
        Self { store }
    }
}

/// POST /api/v1/pipeline-stages - Create a stage at the end of the pipeline
#[utoipa::path(
    post,
    path = "/api/v1/pipeline-stages",
    tag = "Pipeline Stages",
    request_body = CreatePipelineStageRequest,
    responses(
        (status = 201, description = "Stage created", body = PipelineStageResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn create_stage(
    State(state): State<Arc<PipelineStageState>>,
    AuthExtractor(auth): AuthExtractor,
    ApiJson(req): ApiJson<CreatePipelineStageRequest>,
) -> ApiResult<impl IntoResponse> {
    let stage = services::create_stage(state.store.as_ref(), auth.tenant_id, &req.name).await?;
    Ok((StatusCode::CREATED, Json(PipelineStageResponse::from(stage))))
}

/// GET /api/v1/pipeline-stages - List the tenant's stages in order
#[utoipa::path(
    get,
    path = "/api/v1/pipeline-stages",
    tag = "Pipeline Stages",
    responses(
        (status = 200, description = "Stages ordered by position", body = ListPipelineStagesResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn list_stages(
    State(state): State<Arc<PipelineStageState>>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<ListPipelineStagesResponse>> {
    let stages = services::list_stages(state.store.as_ref(), auth.tenant_id).await?;
    Ok(Json(stages.into()))
}

/// GET /api/v1/pipeline-stages/{id} - Get a stage
#[utoipa::path(
    get,
    path = "/api/v1/pipeline-stages/{id}",
    tag = "Pipeline Stages",
    params(
        ("id" = Uuid, Path, description = "Pipeline stage ID")
    ),
    responses(
        (status = 200, description = "Stage details", body = PipelineStageResponse),
        (status = 403, description = "Stage belongs to another tenant", body = ApiError),
        (status = 404, description = "Stage not found", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn get_stage(
    State(state): State<Arc<PipelineStageState>>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<StageId>,
) -> ApiResult<Json<PipelineStageResponse>> {
    let stage = services::get_stage(state.store.as_ref(), auth.tenant_id, id).await?;
    Ok(Json(stage.into()))
}

/// GET /api/v1/pipeline-stages/{id}/opportunities - Opportunities of a stage in order
#[utoipa::path(
    get,
    path = "/api/v1/pipeline-stages/{id}/opportunities",
    tag = "Pipeline Stages",
    params(
        ("id" = Uuid, Path, description = "Pipeline stage ID")
    ),
    responses(
        (status = 200, description = "Opportunities ordered by position", body = ListOpportunitiesResponse),
        (status = 403, description = "Stage belongs to another tenant", body = ApiError),
        (status = 404, description = "Stage not found", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn list_stage_opportunities(
    State(state): State<Arc<PipelineStageState>>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<StageId>,
) -> ApiResult<Json<ListOpportunitiesResponse>> {
    let opportunities =
        services::list_stage_opportunities(state.store.as_ref(), auth.tenant_id, id).await?;
    Ok(Json(ListOpportunitiesResponse::new(id, opportunities)))
}

/// POST /api/v1/pipeline-stages/{id}/reorder - Move a stage in the pipeline
#[utoipa::path(
    post,
    path = "/api/v1/pipeline-stages/{id}/reorder",
    tag = "Pipeline Stages",
    params(
        ("id" = Uuid, Path, description = "Pipeline stage ID")
    ),
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "Stage reordered", body = PipelineStageResponse),
        (status = 400, description = "Missing or invalid neighbors", body = ApiError),
        (status = 403, description = "Stage belongs to another tenant", body = ApiError),
        (status = 404, description = "Stage not found", body = ApiError),
        (status = 500, description = "Persistence failure", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn reorder_stage(
    State(state): State<Arc<PipelineStageState>>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<StageId>,
    ApiJson(req): ApiJson<ReorderRequest>,
) -> ApiResult<Json<PipelineStageResponse>> {
    let moved =
        services::reorder_stage(state.store.as_ref(), auth.tenant_id, id, req.neighbors()).await?;
    Ok(Json(moved.item.into()))
}

/// POST /api/v1/pipeline-stages/rebalance - Renumber the tenant's stages to 1..n
#[utoipa::path(
    post,
    path = "/api/v1/pipeline-stages/rebalance",
    tag = "Pipeline Stages",
    responses(
        (status = 200, description = "Stages renumbered", body = RebalanceResponse),
        (status = 500, description = "Persistence failure", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn rebalance_stages(
    State(state): State<Arc<PipelineStageState>>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<RebalanceResponse>> {
    let assignments = services::rebalance_stages(state.store.as_ref(), auth.tenant_id).await?;
    Ok(Json(RebalanceResponse::new(
        EntityType::PipelineStage.as_str(),
        assignments,
    )))
}

/// POST /api/v1/pipeline-stages/{id}/rebalance - Renumber a stage's opportunities to 1..n
#[utoipa::path(
    post,
    path = "/api/v1/pipeline-stages/{id}/rebalance",
    tag = "Pipeline Stages",
    params(
        ("id" = Uuid, Path, description = "Pipeline stage ID")
    ),
    responses(
        (status = 200, description = "Opportunities renumbered", body = RebalanceResponse),
        (status = 403, description = "Stage belongs to another tenant", body = ApiError),
        (status = 404, description = "Stage not found", body = ApiError),
        (status = 500, description = "Persistence failure", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn rebalance_stage_opportunities(
    State(state): State<Arc<PipelineStageState>>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<StageId>,
) -> ApiResult<Json<RebalanceResponse>> {
    let assignments =
        services::rebalance_stage_opportunities(state.store.as_ref(), auth.tenant_id, id).await?;
    Ok(Json(RebalanceResponse::new(
        EntityType::Opportunity.as_str(),
        assignments,
    )))
}

pub fn create_router(store: Arc<dyn PositionStore>) -> axum::Router {
    let state = Arc::new(PipelineStageState::new(store));

    axum::Router::new()
        .route(
            "/",
            axum::routing::post(create_stage).get(list_stages),
        )
        .route("/rebalance", axum::routing::post(rebalance_stages))
        .route("/:id", axum::routing::get(get_stage))
        .route("/:id/opportunities", axum::routing::get(list_stage_opportunities))
        .route("/:id/reorder", axum::routing::post(reorder_stage))
        .route("/:id/rebalance", axum::routing::post(rebalance_stage_opportunities))
        .with_state(state)
}
