//! Async persistence collaborator for ordered pipeline entities.
//!
//! Reads used for authorization (`*_get`) are unscoped so the caller can
//! tell "missing" (404) apart from "owned by someone else" (403). Every
//! write is scoped by tenant.

use ::async_trait::async_trait;
use crm_core::{
    CrmResult, Opportunity, OpportunityId, PartitionKey, PipelineStage, Position, StageId,
    TenantId,
};
use uuid::Uuid;

/// Row whose position is being written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionTarget {
    /// An opportunity. `stage_id` is set when the move also changes stage;
    /// both fields are then written by the same single-row update.
    Opportunity {
        id: OpportunityId,
        stage_id: Option<StageId>,
    },
    /// A pipeline stage.
    Stage { id: StageId },
}

impl PositionTarget {
    pub fn item_id(&self) -> Uuid {
        match self {
            PositionTarget::Opportunity { id, .. } => (*id).into(),
            PositionTarget::Stage { id } => (*id).into(),
        }
    }
}

/// Single-row position write, scoped to the acting tenant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    pub tenant_id: TenantId,
    pub target: PositionTarget,
    pub position: Position,
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    // ========================================================================
    // PIPELINE STAGE OPERATIONS
    // ========================================================================

    /// Insert a new stage.
    async fn stage_insert(&self, stage: &PipelineStage) -> CrmResult<()>;

    /// Get a stage by ID regardless of tenant.
    async fn stage_get(&self, id: StageId) -> CrmResult<Option<PipelineStage>>;

    /// List a tenant's stages ordered by position.
    async fn stage_list(&self, tenant_id: TenantId) -> CrmResult<Vec<PipelineStage>>;

    // ========================================================================
    // OPPORTUNITY OPERATIONS
    // ========================================================================

    /// Insert a new opportunity.
    async fn opportunity_insert(&self, opportunity: &Opportunity) -> CrmResult<()>;

    /// Get an opportunity by ID regardless of tenant.
    async fn opportunity_get(&self, id: OpportunityId) -> CrmResult<Option<Opportunity>>;

    /// List the opportunities of one stage ordered by position.
    async fn opportunity_list_by_stage(
        &self,
        tenant_id: TenantId,
        stage_id: StageId,
    ) -> CrmResult<Vec<Opportunity>>;

    /// Delete an opportunity.
    async fn opportunity_delete(&self, tenant_id: TenantId, id: OpportunityId) -> CrmResult<()>;

    // ========================================================================
    // POSITION OPERATIONS
    // ========================================================================

    /// Largest position in the partition, `None` when it is empty.
    async fn max_position(&self, partition: PartitionKey) -> CrmResult<Option<Position>>;

    /// Item ids and positions of a partition, ordered by position.
    async fn partition_positions(&self, partition: PartitionKey) -> CrmResult<Vec<(Uuid, Position)>>;

    /// Atomic single-row write of a position (and stage, for opportunity moves).
    ///
    /// Fails with `StorageError::NotFound` when no row matches both the id
    /// and the tenant.
    async fn set_position(&self, update: &PositionUpdate) -> CrmResult<()>;

    /// Renumber a partition to `1..n` in current order as one atomic step.
    /// Returns the applied assignments.
    async fn rebalance(&self, partition: PartitionKey) -> CrmResult<Vec<(Uuid, Position)>>;

    /// Backend liveness check used by readiness probes.
    async fn ping(&self) -> CrmResult<()> {
        Ok(())
    }
}
