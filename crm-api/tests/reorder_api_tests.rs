//! Reorder and stage-change scenarios driven through the HTTP router.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use crm_api::{ApiError, ErrorCode, ListOpportunitiesResponse, OpportunityResponse, PipelineStageResponse};
use crm_core::{EntityIdType, TenantId};
use crm_test_utils::{fixtures::seed_stage, MockStorage};
use serde_json::json;

#[path = "support/app.rs"]
mod app_support;
use app_support::{api_request, parse, send, test_app};

async fn reorder(
    app: &axum::Router,
    tenant: TenantId,
    id: impl std::fmt::Display,
    body: serde_json::Value,
) -> Result<(StatusCode, Vec<u8>), String> {
    let uri = format!("/api/v1/opportunities/{}/reorder", id);
    send(app, api_request(Method::POST, &uri, tenant, Some(body))?).await
}

#[tokio::test]
async fn test_reorder_between_neighbors() -> Result<(), String> {
    let storage = Arc::new(MockStorage::new());
    let tenant = TenantId::now_v7();
    let seeded = seed_stage(&storage, tenant, "Qualified", 1.0, &[1.0, 2.0, 3.0])
        .await
        .map_err(|e| e.to_string())?;
    let app = test_app(storage.clone())?;
    let moved = seeded.opportunity_id(2).ok_or("missing")?;

    let (status, body) = reorder(&app, tenant, moved, json!({"prevPosition": 1.0, "nextPosition": 2.0})).await?;
    assert_eq!(status, StatusCode::OK);
    let response: OpportunityResponse = parse(&body)?;
    assert_eq!(response.position, 1.5);

    let uri = format!("/api/v1/pipeline-stages/{}/opportunities", seeded.id());
    let (status, body) = send(&app, api_request(Method::GET, &uri, tenant, None)?).await?;
    assert_eq!(status, StatusCode::OK);
    let list: ListOpportunitiesResponse = parse(&body)?;
    let order: Vec<_> = list.opportunities.iter().map(|o| o.id).collect();
    assert_eq!(
        order,
        vec![
            seeded.opportunity_id(0).ok_or("missing")?,
            moved,
            seeded.opportunity_id(1).ok_or("missing")?,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_reorder_to_edges() -> Result<(), String> {
    let storage = Arc::new(MockStorage::new());
    let tenant = TenantId::now_v7();
    let seeded = seed_stage(&storage, tenant, "Proposal", 1.0, &[1.0, 2.0, 3.0])
        .await
        .map_err(|e| e.to_string())?;
    let app = test_app(storage)?;

    let (status, body) = reorder(
        &app,
        tenant,
        seeded.opportunity_id(1).ok_or("missing")?,
        json!({"nextPosition": 1.0}),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse::<OpportunityResponse>(&body)?.position, 0.5);

    let (status, body) = reorder(
        &app,
        tenant,
        seeded.opportunity_id(0).ok_or("missing")?,
        json!({"prevPosition": 3.0}),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse::<OpportunityResponse>(&body)?.position, 3.5);
    Ok(())
}

#[tokio::test]
async fn test_reorder_rejects_bad_neighbors() -> Result<(), String> {
    let storage = Arc::new(MockStorage::new());
    let tenant = TenantId::now_v7();
    let seeded = seed_stage(&storage, tenant, "Won", 1.0, &[1.0, 2.0])
        .await
        .map_err(|e| e.to_string())?;
    let app = test_app(storage)?;
    let id = seeded.opportunity_id(0).ok_or("missing")?;

    for body in [
        json!({}),
        json!({"prevPosition": 2.0, "nextPosition": 1.0}),
        json!({"prevPosition": 2.0, "nextPosition": 2.0}),
    ] {
        let (status, bytes) = reorder(&app, tenant, id, body).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ApiError = parse(&bytes)?;
        assert_eq!(error.code, ErrorCode::InvalidReorderInput);
    }
    Ok(())
}

#[tokio::test]
async fn test_reorder_malformed_body_is_bad_request() -> Result<(), String> {
    let storage = Arc::new(MockStorage::new());
    let tenant = TenantId::now_v7();
    let seeded = seed_stage(&storage, tenant, "Lead", 1.0, &[1.0])
        .await
        .map_err(|e| e.to_string())?;
    let app = test_app(storage)?;

    let (status, _) = reorder(
        &app,
        tenant,
        seeded.opportunity_id(0).ok_or("missing")?,
        json!({"prevPosition": "one"}),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_unknown_opportunity_is_not_found() -> Result<(), String> {
    let app = test_app(Arc::new(MockStorage::new()))?;
    let (status, _) = reorder(
        &app,
        TenantId::now_v7(),
        uuid::Uuid::now_v7(),
        json!({"prevPosition": 1.0}),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_invalid_path_id_is_bad_request() -> Result<(), String> {
    let app = test_app(Arc::new(MockStorage::new()))?;
    let (status, _) = reorder(&app, TenantId::now_v7(), "not-a-uuid", json!({"prevPosition": 1.0})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_change_stage_between_neighbors() -> Result<(), String> {
    let storage = Arc::new(MockStorage::new());
    let tenant = TenantId::now_v7();
    let source = seed_stage(&storage, tenant, "A", 1.0, &[1.0, 2.0])
        .await
        .map_err(|e| e.to_string())?;
    let target = seed_stage(&storage, tenant, "B", 2.0, &[5.0, 6.0])
        .await
        .map_err(|e| e.to_string())?;
    let app = test_app(storage)?;
    let moved = source.opportunity_id(0).ok_or("missing")?;

    let uri = format!("/api/v1/opportunities/{}/stage", moved);
    let body = json!({"stageId": target.id(), "prevPosition": 5.0, "nextPosition": 6.0});
    let (status, bytes) = send(&app, api_request(Method::PATCH, &uri, tenant, Some(body))?).await?;
    assert_eq!(status, StatusCode::OK);
    let response: OpportunityResponse = parse(&bytes)?;
    assert_eq!(response.stage_id, target.id());
    assert_eq!(response.position, 5.5);

    let uri = format!("/api/v1/pipeline-stages/{}/opportunities", source.id());
    let (_, bytes) = send(&app, api_request(Method::GET, &uri, tenant, None)?).await?;
    let remaining: ListOpportunitiesResponse = parse(&bytes)?;
    assert_eq!(remaining.total, 1);
    assert_eq!(remaining.opportunities[0].position, 2.0);
    Ok(())
}

#[tokio::test]
async fn test_change_stage_appends_without_neighbors() -> Result<(), String> {
    let storage = Arc::new(MockStorage::new());
    let tenant = TenantId::now_v7();
    let source = seed_stage(&storage, tenant, "A", 1.0, &[1.0])
        .await
        .map_err(|e| e.to_string())?;
    let empty = seed_stage(&storage, tenant, "Empty", 2.0, &[])
        .await
        .map_err(|e| e.to_string())?;
    let app = test_app(storage)?;

    // snake_case key is accepted too
    let uri = format!(
        "/api/v1/opportunities/{}/stage",
        source.opportunity_id(0).ok_or("missing")?
    );
    let body = json!({"stage_id": empty.id()});
    let (status, bytes) = send(&app, api_request(Method::PATCH, &uri, tenant, Some(body))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse::<OpportunityResponse>(&bytes)?.position, 1.0);
    Ok(())
}

#[tokio::test]
async fn test_stage_lifecycle_and_reorder() -> Result<(), String> {
    let app = test_app(Arc::new(MockStorage::new()))?;
    let tenant = TenantId::now_v7();

    let mut ids = Vec::new();
    for name in ["Lead", "Qualified", "Won"] {
        let body = json!({"name": name});
        let (status, bytes) =
            send(&app, api_request(Method::POST, "/api/v1/pipeline-stages", tenant, Some(body))?).await?;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(parse::<PipelineStageResponse>(&bytes)?);
    }
    assert_eq!(
        ids.iter().map(|s| s.position).collect::<Vec<_>>(),
        vec![1.0, 2.0, 3.0]
    );

    let uri = format!("/api/v1/pipeline-stages/{}/reorder", ids[2].id);
    let body = json!({"nextPosition": 1.0});
    let (status, bytes) = send(&app, api_request(Method::POST, &uri, tenant, Some(body))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse::<PipelineStageResponse>(&bytes)?.position, 0.5);

    let (_, bytes) = send(&app, api_request(Method::GET, "/api/v1/pipeline-stages", tenant, None)?).await?;
    let list: crm_api::ListPipelineStagesResponse = parse(&bytes)?;
    assert_eq!(list.stages[0].name, "Won");

    let (status, bytes) = send(
        &app,
        api_request(Method::POST, "/api/v1/pipeline-stages/rebalance", tenant, None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let rebalanced: crm_api::RebalanceResponse = parse(&bytes)?;
    assert_eq!(rebalanced.total, 3);
    assert_eq!(rebalanced.assignments[0].id, ids[2].id.as_uuid());
    assert_eq!(rebalanced.assignments[0].position, 1.0);
    Ok(())
}

#[tokio::test]
async fn test_create_and_delete_opportunity() -> Result<(), String> {
    let storage = Arc::new(MockStorage::new());
    let tenant = TenantId::now_v7();
    let stage = seed_stage(&storage, tenant, "Lead", 1.0, &[10.0])
        .await
        .map_err(|e| e.to_string())?;
    let app = test_app(storage.clone())?;

    let body = json!({"name": "Acme renewal", "stageId": stage.id(), "amount": 4200.0});
    let (status, bytes) =
        send(&app, api_request(Method::POST, "/api/v1/opportunities", tenant, Some(body))?).await?;
    assert_eq!(status, StatusCode::CREATED);
    let created: OpportunityResponse = parse(&bytes)?;
    assert_eq!(created.position, 11.0);

    let uri = format!("/api/v1/opportunities/{}", created.id);
    let (status, _) = send(&app, api_request(Method::DELETE, &uri, tenant, None)?).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, api_request(Method::GET, &uri, tenant, None)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(storage.opportunity_count().map_err(|e| e.to_string())?, 1);
    Ok(())
}

#[tokio::test]
async fn test_write_failure_is_server_error() -> Result<(), String> {
    let storage = Arc::new(MockStorage::new());
    let tenant = TenantId::now_v7();
    let seeded = seed_stage(&storage, tenant, "Lead", 1.0, &[1.0, 2.0])
        .await
        .map_err(|e| e.to_string())?;
    storage.fail_writes(true);
    let app = test_app(storage)?;

    let (status, bytes) = reorder(
        &app,
        tenant,
        seeded.opportunity_id(1).ok_or("missing")?,
        json!({"nextPosition": 1.0}),
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error: ApiError = parse(&bytes)?;
    assert_eq!(error.code, ErrorCode::DatabaseError);
    Ok(())
}
