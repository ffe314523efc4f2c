//! Pipeline Stage Service
//!
//! Stage creation (appended), tenant-checked reads, stage reordering and
//! explicit rebalancing.

use chrono::Utc;
use crm_core::{
    append_position, CrmError, CrmResult, EntityIdType, EntityType, Neighbors, Opportunity,
    PartitionKey, PipelineStage, Position, StageId, StorageError, TenantId, ValidationError,
};
use crm_storage::{PositionStore, PositionTarget, PositionUpdate};
use uuid::Uuid;

use super::{authorize, resolve_position, Moved};
use crate::telemetry::metrics::{with_metrics, ReorderOutcome};

fn stage_not_found(id: StageId) -> CrmError {
    StorageError::NotFound {
        entity_type: EntityType::PipelineStage,
        id: id.as_uuid(),
    }
    .into()
}

/// Create a stage at the end of the tenant's pipeline.
pub async fn create_stage(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    name: &str,
) -> CrmResult<PipelineStage> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        }
        .into());
    }

    let max = store.max_position(PartitionKey::stages(tenant_id)).await?;
    let now = Utc::now();
    let stage = PipelineStage {
        stage_id: StageId::now_v7(),
        tenant_id,
        name: name.to_string(),
        position: append_position(max),
        created_at: now,
        updated_at: now,
    };
    store.stage_insert(&stage).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        stage_id = %stage.stage_id,
        position = stage.position,
        "Pipeline stage created"
    );
    Ok(stage)
}

/// Fetch a stage owned by `tenant_id`: 404 when missing, 403 when foreign.
pub async fn get_stage(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    stage_id: StageId,
) -> CrmResult<PipelineStage> {
    let stage = store
        .stage_get(stage_id)
        .await?
        .ok_or_else(|| stage_not_found(stage_id))?;
    authorize(&stage, tenant_id)?;
    Ok(stage)
}

pub async fn list_stages(
    store: &dyn PositionStore,
    tenant_id: TenantId,
) -> CrmResult<Vec<PipelineStage>> {
    store.stage_list(tenant_id).await
}

/// Opportunities of a stage, ordered by position.
pub async fn list_stage_opportunities(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    stage_id: StageId,
) -> CrmResult<Vec<Opportunity>> {
    get_stage(store, tenant_id, stage_id).await?;
    store.opportunity_list_by_stage(tenant_id, stage_id).await
}

/// Move a stage between the given neighbors of the tenant's stage list.
///
/// Ownership is checked before any position is computed. Exactly one row is
/// written unless the gap was exhausted and the list had to be renumbered.
pub async fn reorder_stage(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    stage_id: StageId,
    neighbors: Neighbors,
) -> CrmResult<Moved<PipelineStage>> {
    let result = reorder_stage_inner(store, tenant_id, stage_id, neighbors).await;
    with_metrics(|m| m.record_reorder(EntityType::PipelineStage, ReorderOutcome::of(&result)));

    match &result {
        Ok(moved) => tracing::info!(
            tenant_id = %tenant_id,
            stage_id = %stage_id,
            position = moved.item.position,
            rebalanced = moved.rebalanced,
            "Pipeline stage reordered"
        ),
        Err(e) => tracing::warn!(
            tenant_id = %tenant_id,
            stage_id = %stage_id,
            prev = ?neighbors.prev,
            next = ?neighbors.next,
            error = %e,
            "Pipeline stage reorder failed"
        ),
    }
    result
}

async fn reorder_stage_inner(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    stage_id: StageId,
    neighbors: Neighbors,
) -> CrmResult<Moved<PipelineStage>> {
    let mut stage = get_stage(store, tenant_id, stage_id).await?;

    let resolved = resolve_position(
        store,
        PartitionKey::stages(tenant_id),
        stage_id.as_uuid(),
        neighbors,
    )
    .await?;

    store
        .set_position(&PositionUpdate {
            tenant_id,
            target: PositionTarget::Stage { id: stage_id },
            position: resolved.position,
        })
        .await?;

    stage.position = resolved.position;
    stage.updated_at = Utc::now();
    Ok(Moved {
        item: stage,
        rebalanced: resolved.rebalanced,
    })
}

/// Renumber the tenant's stages to `1..n`.
pub async fn rebalance_stages(
    store: &dyn PositionStore,
    tenant_id: TenantId,
) -> CrmResult<Vec<(Uuid, Position)>> {
    let assignments = store.rebalance(PartitionKey::stages(tenant_id)).await?;
    with_metrics(|m| m.record_rebalance(EntityType::PipelineStage, "manual", assignments.len()));
    tracing::info!(
        tenant_id = %tenant_id,
        rows = assignments.len(),
        "Pipeline stages rebalanced"
    );
    Ok(assignments)
}

/// Renumber one stage's opportunities to `1..n`.
pub async fn rebalance_stage_opportunities(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    stage_id: StageId,
) -> CrmResult<Vec<(Uuid, Position)>> {
    get_stage(store, tenant_id, stage_id).await?;
    let assignments = store
        .rebalance(PartitionKey::opportunities(tenant_id, stage_id))
        .await?;
    with_metrics(|m| m.record_rebalance(EntityType::Opportunity, "manual", assignments.len()));
    tracing::info!(
        tenant_id = %tenant_id,
        stage_id = %stage_id,
        rows = assignments.len(),
        "Stage opportunities rebalanced"
    );
    Ok(assignments)
}
