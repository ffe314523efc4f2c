//! Opportunity Service
//!
//! Creation (appended to a stage), tenant-checked reads and deletes,
//! same-stage reordering and cross-stage moves.

use chrono::Utc;
use crm_core::{
    append_position, CompanyId, ContactId, CrmError, CrmResult, EntityIdType, EntityType,
    Neighbors, Opportunity, OpportunityId, PartitionKey, StageId, StorageError, TenantId,
    ValidationError,
};
use crm_storage::{PositionStore, PositionTarget, PositionUpdate};

use super::{authorize, get_stage, resolve_position, Moved, Resolved};
use crate::telemetry::metrics::{with_metrics, ReorderOutcome};

/// Fields of an opportunity supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOpportunity {
    pub stage_id: StageId,
    pub name: String,
    pub amount: Option<f64>,
    pub company_id: Option<CompanyId>,
    pub contact_id: Option<ContactId>,
}

fn opportunity_not_found(id: OpportunityId) -> CrmError {
    StorageError::NotFound {
        entity_type: EntityType::Opportunity,
        id: id.as_uuid(),
    }
    .into()
}

/// Create an opportunity at the end of its stage.
pub async fn create_opportunity(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    new: NewOpportunity,
) -> CrmResult<Opportunity> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        }
        .into());
    }
    if let Some(amount) = new.amount {
        if !amount.is_finite() {
            return Err(ValidationError::InvalidValue {
                field: "amount".to_string(),
                reason: "must be a finite number".to_string(),
            }
            .into());
        }
    }

    get_stage(store, tenant_id, new.stage_id).await?;

    let max = store
        .max_position(PartitionKey::opportunities(tenant_id, new.stage_id))
        .await?;
    let now = Utc::now();
    let opportunity = Opportunity {
        opportunity_id: OpportunityId::now_v7(),
        tenant_id,
        stage_id: new.stage_id,
        name: name.to_string(),
        amount: new.amount,
        company_id: new.company_id,
        contact_id: new.contact_id,
        position: append_position(max),
        created_at: now,
        updated_at: now,
    };
    store.opportunity_insert(&opportunity).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        opportunity_id = %opportunity.opportunity_id,
        stage_id = %opportunity.stage_id,
        position = opportunity.position,
        "Opportunity created"
    );
    Ok(opportunity)
}

/// Fetch an opportunity owned by `tenant_id`: 404 when missing, 403 when foreign.
pub async fn get_opportunity(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    opportunity_id: OpportunityId,
) -> CrmResult<Opportunity> {
    let opportunity = store
        .opportunity_get(opportunity_id)
        .await?
        .ok_or_else(|| opportunity_not_found(opportunity_id))?;
    authorize(&opportunity, tenant_id)?;
    Ok(opportunity)
}

pub async fn delete_opportunity(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    opportunity_id: OpportunityId,
) -> CrmResult<()> {
    get_opportunity(store, tenant_id, opportunity_id).await?;
    store.opportunity_delete(tenant_id, opportunity_id).await?;
    tracing::info!(
        tenant_id = %tenant_id,
        opportunity_id = %opportunity_id,
        "Opportunity deleted"
    );
    Ok(())
}

/// Move an opportunity between two neighbors of its current stage.
///
/// At least one neighbor is required.
pub async fn reorder_opportunity(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    opportunity_id: OpportunityId,
    neighbors: Neighbors,
) -> CrmResult<Moved<Opportunity>> {
    let result: CrmResult<Moved<Opportunity>> = async {
        let opportunity = get_opportunity(store, tenant_id, opportunity_id).await?;
        let partition = PartitionKey::opportunities(tenant_id, opportunity.stage_id);
        let resolved =
            resolve_position(store, partition, opportunity_id.as_uuid(), neighbors).await?;
        write_move(store, opportunity, None, resolved).await
    }
    .await;

    log_move(tenant_id, opportunity_id, None, neighbors, &result);
    result
}

/// Move an opportunity into `stage_id`, between the given neighbors of that
/// stage, or to its end when no neighbor is given.
///
/// Stage and position change in the same single-row write. The source
/// stage's remaining opportunities keep their positions.
pub async fn move_opportunity_to_stage(
    store: &dyn PositionStore,
    tenant_id: TenantId,
    opportunity_id: OpportunityId,
    stage_id: StageId,
    neighbors: Neighbors,
) -> CrmResult<Moved<Opportunity>> {
    let result: CrmResult<Moved<Opportunity>> = async {
        let opportunity = get_opportunity(store, tenant_id, opportunity_id).await?;
        get_stage(store, tenant_id, stage_id).await?;

        let partition = PartitionKey::opportunities(tenant_id, stage_id);
        let resolved = if neighbors.is_empty() {
            let max = store.max_position(partition).await?;
            Resolved {
                position: append_position(max),
                rebalanced: false,
            }
        } else {
            resolve_position(store, partition, opportunity_id.as_uuid(), neighbors).await?
        };
        write_move(store, opportunity, Some(stage_id), resolved).await
    }
    .await;

    log_move(tenant_id, opportunity_id, Some(stage_id), neighbors, &result);
    result
}

async fn write_move(
    store: &dyn PositionStore,
    mut opportunity: Opportunity,
    stage_id: Option<StageId>,
    resolved: Resolved,
) -> CrmResult<Moved<Opportunity>> {
    store
        .set_position(&PositionUpdate {
            tenant_id: opportunity.tenant_id,
            target: PositionTarget::Opportunity {
                id: opportunity.opportunity_id,
                stage_id,
            },
            position: resolved.position,
        })
        .await?;

    if let Some(stage_id) = stage_id {
        opportunity.stage_id = stage_id;
    }
    opportunity.position = resolved.position;
    opportunity.updated_at = Utc::now();
    Ok(Moved {
        item: opportunity,
        rebalanced: resolved.rebalanced,
    })
}

fn log_move(
    tenant_id: TenantId,
    opportunity_id: OpportunityId,
    stage_id: Option<StageId>,
    neighbors: Neighbors,
    result: &CrmResult<Moved<Opportunity>>,
) {
    with_metrics(|m| m.record_reorder(EntityType::Opportunity, ReorderOutcome::of(result)));
    match result {
        Ok(moved) => tracing::info!(
            tenant_id = %tenant_id,
            opportunity_id = %opportunity_id,
            stage_id = %moved.item.stage_id,
            position = moved.item.position,
            rebalanced = moved.rebalanced,
            "Opportunity moved"
        ),
        Err(e) => tracing::warn!(
            tenant_id = %tenant_id,
            opportunity_id = %opportunity_id,
            target_stage_id = ?stage_id.map(|s| s.to_string()),
            prev = ?neighbors.prev,
            next = ?neighbors.next,
            error = %e,
            "Opportunity move failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::Position;
    use crm_test_utils::{
        assertions::{
            assert_invalid_reorder, assert_not_found, assert_persistence_failure,
            assert_unauthorized,
        },
        fixtures::{self, SeededStage},
        MockStorage,
    };

    async fn stage_positions(
        store: &MockStorage,
        tenant: TenantId,
        stage: &SeededStage,
    ) -> Result<Vec<(OpportunityId, Position)>, String> {
        Ok(store
            .opportunity_list_by_stage(tenant, stage.id())
            .await
            .map_err(|e| e.to_string())?
            .into_iter()
            .map(|o| (o.opportunity_id, o.position))
            .collect())
    }

    fn new_in(stage_id: StageId, name: &str) -> NewOpportunity {
        NewOpportunity {
            stage_id,
            name: name.to_string(),
            amount: Some(2_500.0),
            company_id: None,
            contact_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_in_empty_stage_gets_one() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let stage = fixtures::seed_stage(&store, tenant, "Lead", 1.0, &[]).await.map_err(|e| e.to_string())?;

        let first = create_opportunity(&store, tenant, new_in(stage.id(), "Acme"))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(first.position, 1.0);

        let second = create_opportunity(&store, tenant, new_in(stage.id(), "Globex"))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(second.position, 2.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_in_foreign_stage_is_unauthorized() -> Result<(), String> {
        let store = MockStorage::new();
        let stage = fixtures::seed_stage(&store, TenantId::now_v7(), "Lead", 1.0, &[])
            .await
            .map_err(|e| e.to_string())?;
        let result = create_opportunity(&store, TenantId::now_v7(), new_in(stage.id(), "Acme")).await;
        assert_unauthorized(&result);
        assert_eq!(store.opportunity_count().map_err(|e| e.to_string())?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_rejects_non_finite_amount() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let stage = fixtures::seed_stage(&store, tenant, "Lead", 1.0, &[]).await.map_err(|e| e.to_string())?;
        let mut new = new_in(stage.id(), "Acme");
        new.amount = Some(f64::NAN);
        let result = create_opportunity(&store, tenant, new).await;
        assert!(matches!(result, Err(CrmError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_reorder_between_first_and_second() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let stage = fixtures::seed_stage(&store, tenant, "Lead", 1.0, &[1.0, 2.0, 3.0])
            .await
            .map_err(|e| e.to_string())?;
        let third = stage.opportunity_id(2).ok_or("missing")?;

        let moved = reorder_opportunity(&store, tenant, third, Neighbors::between(1.0, 2.0))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(moved.item.position, 1.5);

        let listed = stage_positions(&store, tenant, &stage).await?;
        let positions: Vec<Position> = listed.iter().map(|(_, p)| *p).collect();
        assert_eq!(positions, vec![1.0, 1.5, 2.0]);
        assert_eq!(listed[1].0, third);
        Ok(())
    }

    #[tokio::test]
    async fn test_reorder_before_all_and_after_all() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let stage = fixtures::seed_stage(&store, tenant, "Lead", 1.0, &[1.0, 2.0, 3.0])
            .await
            .map_err(|e| e.to_string())?;

        let front = reorder_opportunity(&store, tenant, stage.opportunity_id(1).ok_or("missing")?, Neighbors::before(1.0))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(front.item.position, 0.5);

        let back = reorder_opportunity(&store, tenant, stage.opportunity_id(0).ok_or("missing")?, Neighbors::after(3.0))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(back.item.position, 3.5);
        Ok(())
    }

    #[tokio::test]
    async fn test_reorder_without_neighbors_is_invalid() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let stage = fixtures::seed_stage(&store, tenant, "Lead", 1.0, &[1.0])
            .await
            .map_err(|e| e.to_string())?;
        let result =
            reorder_opportunity(&store, tenant, stage.opportunity_id(0).ok_or("missing")?, Neighbors::default()).await;
        assert_invalid_reorder(&result);
        Ok(())
    }

    #[tokio::test]
    async fn test_reorder_with_equal_neighbors_is_invalid() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let stage = fixtures::seed_stage(&store, tenant, "Lead", 1.0, &[1.0, 2.0])
            .await
            .map_err(|e| e.to_string())?;
        let result = reorder_opportunity(
            &store,
            tenant,
            stage.opportunity_id(0).ok_or("missing")?,
            Neighbors::between(2.0, 2.0),
        )
        .await;
        assert_invalid_reorder(&result);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_between_stages() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let a = fixtures::seed_stage(&store, tenant, "A", 1.0, &[1.0, 2.0]).await.map_err(|e| e.to_string())?;
        let b = fixtures::seed_stage(&store, tenant, "B", 2.0, &[5.0, 6.0]).await.map_err(|e| e.to_string())?;
        let mover = a.opportunity_id(0).ok_or("missing")?;
        let stayer = a.opportunity_id(1).ok_or("missing")?;

        let moved = move_opportunity_to_stage(&store, tenant, mover, b.id(), Neighbors::between(5.0, 6.0))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(moved.item.stage_id, b.id());
        assert_eq!(moved.item.position, 5.5);

        assert_eq!(stage_positions(&store, tenant, &a).await?, vec![(stayer, 2.0)]);
        let in_b = stage_positions(&store, tenant, &b).await?;
        assert_eq!(in_b.len(), 3);
        assert_eq!(in_b[1], (mover, 5.5));
        Ok(())
    }

    #[tokio::test]
    async fn test_move_without_neighbors_appends() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let a = fixtures::seed_stage(&store, tenant, "A", 1.0, &[1.0]).await.map_err(|e| e.to_string())?;
        let b = fixtures::seed_stage(&store, tenant, "B", 2.0, &[4.0, 9.0]).await.map_err(|e| e.to_string())?;
        let empty = fixtures::seed_stage(&store, tenant, "C", 3.0, &[]).await.map_err(|e| e.to_string())?;
        let mover = a.opportunity_id(0).ok_or("missing")?;

        let moved = move_opportunity_to_stage(&store, tenant, mover, b.id(), Neighbors::default())
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(moved.item.position, 10.0);

        let moved = move_opportunity_to_stage(&store, tenant, mover, empty.id(), Neighbors::default())
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(moved.item.position, 1.0);
        assert_eq!(moved.item.stage_id, empty.id());
        Ok(())
    }

    #[tokio::test]
    async fn test_move_to_foreign_stage_is_unauthorized() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let mine = fixtures::seed_stage(&store, tenant, "Mine", 1.0, &[1.0]).await.map_err(|e| e.to_string())?;
        let theirs = fixtures::seed_stage(&store, TenantId::now_v7(), "Theirs", 1.0, &[])
            .await
            .map_err(|e| e.to_string())?;
        let mover = mine.opportunity_id(0).ok_or("missing")?;

        let result = move_opportunity_to_stage(&store, tenant, mover, theirs.id(), Neighbors::default()).await;
        assert_unauthorized(&result);
        assert_eq!(stage_positions(&store, tenant, &mine).await?, vec![(mover, 1.0)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_opportunity_cannot_be_moved_read_or_deleted() -> Result<(), String> {
        let store = MockStorage::new();
        let owner = TenantId::now_v7();
        let intruder = TenantId::now_v7();
        let stage = fixtures::seed_stage(&store, owner, "Lead", 1.0, &[1.0]).await.map_err(|e| e.to_string())?;
        let id = stage.opportunity_id(0).ok_or("missing")?;

        assert_unauthorized(&reorder_opportunity(&store, intruder, id, Neighbors::before(1.0)).await);
        assert_unauthorized(&get_opportunity(&store, intruder, id).await);
        assert_unauthorized(&delete_opportunity(&store, intruder, id).await);
        assert_eq!(store.opportunity_count().map_err(|e| e.to_string())?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let stage = fixtures::seed_stage(&store, tenant, "Lead", 1.0, &[1.0]).await.map_err(|e| e.to_string())?;

        assert_not_found(
            &reorder_opportunity(&store, tenant, OpportunityId::now_v7(), Neighbors::before(1.0)).await,
            EntityType::Opportunity,
        );
        assert_not_found(
            &move_opportunity_to_stage(
                &store,
                tenant,
                stage.opportunity_id(0).ok_or("missing")?,
                StageId::now_v7(),
                Neighbors::default(),
            )
            .await,
            EntityType::PipelineStage,
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_removes_only_target() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let stage = fixtures::seed_stage(&store, tenant, "Lead", 1.0, &[1.0, 2.0]).await.map_err(|e| e.to_string())?;
        let gone = stage.opportunity_id(0).ok_or("missing")?;
        let kept = stage.opportunity_id(1).ok_or("missing")?;

        delete_opportunity(&store, tenant, gone).await.map_err(|e| e.to_string())?;
        assert_eq!(stage_positions(&store, tenant, &stage).await?, vec![(kept, 2.0)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_and_is_not_retried() -> Result<(), String> {
        let store = MockStorage::new();
        let tenant = TenantId::now_v7();
        let stage = fixtures::seed_stage(&store, tenant, "Lead", 1.0, &[1.0, 2.0]).await.map_err(|e| e.to_string())?;
        store.fail_writes(true);
        let result = reorder_opportunity(
            &store,
            tenant,
            stage.opportunity_id(1).ok_or("missing")?,
            Neighbors::before(1.0),
        )
        .await;
        assert_persistence_failure(&result);

        store.fail_writes(false);
        let positions: Vec<Position> = stage_positions(&store, tenant, &stage)
            .await?
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        assert_eq!(positions, vec![1.0, 2.0]);
        Ok(())
    }
}
