//! CRM Storage - Position Store Trait and Mock Implementation
//!
//! Defines the persistence collaborator the reorder services talk to. The
//! PostgreSQL implementation lives in crm-api.

pub mod position_store;

pub use position_store::{PositionStore, PositionTarget, PositionUpdate};

use ::async_trait::async_trait;
use crm_core::{
    rebalance_plan, CrmError, CrmResult, EntityType, Opportunity, OpportunityId, OrderableItem,
    PartitionKey, PipelineStage, Position, StageId, StorageError, TenantId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

// ============================================================================
// MOCK STORAGE
// ============================================================================

/// In-memory storage for tests and local development.
///
/// Each trait call holds one lock for its whole duration, which gives the
/// same single-row atomicity the database provides.
#[derive(Debug, Default, Clone)]
pub struct MockStorage {
    stages: Arc<RwLock<HashMap<StageId, PipelineStage>>>,
    opportunities: Arc<RwLock<HashMap<OpportunityId, Opportunity>>>,
    fail_writes: Arc<AtomicBool>,
}

fn poisoned<T>(_: T) -> CrmError {
    CrmError::Storage(StorageError::LockPoisoned)
}

fn sort_by_position<T: OrderableItem>(items: &mut [T]) {
    items.sort_by(|a, b| {
        a.position()
            .total_cmp(&b.position())
            .then_with(|| a.item_id().cmp(&b.item_id()))
    });
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> CrmResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CrmError::Storage(StorageError::Backend {
                reason: "writes disabled".to_string(),
            }));
        }
        Ok(())
    }

    /// Get count of stored opportunities.
    pub fn opportunity_count(&self) -> CrmResult<usize> {
        Ok(self.opportunities.read().map_err(poisoned)?.len())
    }

    fn positions_of(&self, partition: PartitionKey) -> CrmResult<Vec<(Uuid, Position)>> {
        match partition {
            PartitionKey::Stages { tenant_id } => {
                let stages = self.stages.read().map_err(poisoned)?;
                let mut rows: Vec<PipelineStage> = stages
                    .values()
                    .filter(|s| s.tenant_id == tenant_id)
                    .cloned()
                    .collect();
                sort_by_position(&mut rows);
                Ok(rows.iter().map(|s| (s.item_id(), s.position)).collect())
            }
            PartitionKey::Opportunities {
                tenant_id,
                stage_id,
            } => {
                let opportunities = self.opportunities.read().map_err(poisoned)?;
                let mut rows: Vec<Opportunity> = opportunities
                    .values()
                    .filter(|o| o.tenant_id == tenant_id && o.stage_id == stage_id)
                    .cloned()
                    .collect();
                sort_by_position(&mut rows);
                Ok(rows.iter().map(|o| (o.item_id(), o.position)).collect())
            }
        }
    }
}

#[async_trait]
impl PositionStore for MockStorage {
    async fn stage_insert(&self, stage: &PipelineStage) -> CrmResult<()> {
        self.check_writable()?;
        let mut stages = self.stages.write().map_err(poisoned)?;
        if stages.contains_key(&stage.stage_id) {
            return Err(CrmError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::PipelineStage,
                reason: "already exists".to_string(),
            }));
        }
        stages.insert(stage.stage_id, stage.clone());
        Ok(())
    }

    async fn stage_get(&self, id: StageId) -> CrmResult<Option<PipelineStage>> {
        let stages = self.stages.read().map_err(poisoned)?;
        Ok(stages.get(&id).cloned())
    }

    async fn stage_list(&self, tenant_id: TenantId) -> CrmResult<Vec<PipelineStage>> {
        let stages = self.stages.read().map_err(poisoned)?;
        let mut rows: Vec<PipelineStage> = stages
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect();
        sort_by_position(&mut rows);
        Ok(rows)
    }

    async fn opportunity_insert(&self, opportunity: &Opportunity) -> CrmResult<()> {
        self.check_writable()?;
        let mut opportunities = self.opportunities.write().map_err(poisoned)?;
        if opportunities.contains_key(&opportunity.opportunity_id) {
            return Err(CrmError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Opportunity,
                reason: "already exists".to_string(),
            }));
        }
        opportunities.insert(opportunity.opportunity_id, opportunity.clone());
        Ok(())
    }

    async fn opportunity_get(&self, id: OpportunityId) -> CrmResult<Option<Opportunity>> {
        let opportunities = self.opportunities.read().map_err(poisoned)?;
        Ok(opportunities.get(&id).cloned())
    }

    async fn opportunity_list_by_stage(
        &self,
        tenant_id: TenantId,
        stage_id: StageId,
    ) -> CrmResult<Vec<Opportunity>> {
        let opportunities = self.opportunities.read().map_err(poisoned)?;
        let mut rows: Vec<Opportunity> = opportunities
            .values()
            .filter(|o| o.tenant_id == tenant_id && o.stage_id == stage_id)
            .cloned()
            .collect();
        sort_by_position(&mut rows);
        Ok(rows)
    }

    async fn opportunity_delete(&self, tenant_id: TenantId, id: OpportunityId) -> CrmResult<()> {
        self.check_writable()?;
        let mut opportunities = self.opportunities.write().map_err(poisoned)?;
        match opportunities.get(&id) {
            Some(o) if o.tenant_id == tenant_id => {
                opportunities.remove(&id);
                Ok(())
            }
            _ => Err(CrmError::Storage(StorageError::NotFound {
                entity_type: EntityType::Opportunity,
                id: id.into(),
            })),
        }
    }

    async fn max_position(&self, partition: PartitionKey) -> CrmResult<Option<Position>> {
        Ok(self
            .positions_of(partition)?
            .into_iter()
            .map(|(_, p)| p)
            .max_by(|a, b| a.total_cmp(b)))
    }

    async fn partition_positions(&self, partition: PartitionKey) -> CrmResult<Vec<(Uuid, Position)>> {
        self.positions_of(partition)
    }

    async fn set_position(&self, update: &PositionUpdate) -> CrmResult<()> {
        self.check_writable()?;
        let now = chrono::Utc::now();
        match update.target {
            PositionTarget::Opportunity { id, stage_id } => {
                let mut opportunities = self.opportunities.write().map_err(poisoned)?;
                let row = opportunities
                    .get_mut(&id)
                    .filter(|o| o.tenant_id == update.tenant_id)
                    .ok_or(CrmError::Storage(StorageError::NotFound {
                        entity_type: EntityType::Opportunity,
                        id: id.into(),
                    }))?;
                if let Some(stage_id) = stage_id {
                    row.stage_id = stage_id;
                }
                row.position = update.position;
                row.updated_at = now;
            }
            PositionTarget::Stage { id } => {
                let mut stages = self.stages.write().map_err(poisoned)?;
                let row = stages
                    .get_mut(&id)
                    .filter(|s| s.tenant_id == update.tenant_id)
                    .ok_or(CrmError::Storage(StorageError::NotFound {
                        entity_type: EntityType::PipelineStage,
                        id: id.into(),
                    }))?;
                row.position = update.position;
                row.updated_at = now;
            }
        }
        Ok(())
    }

    async fn rebalance(&self, partition: PartitionKey) -> CrmResult<Vec<(Uuid, Position)>> {
        self.check_writable()?;
        let now = chrono::Utc::now();
        match partition {
            PartitionKey::Stages { tenant_id } => {
                let mut stages = self.stages.write().map_err(poisoned)?;
                let mut rows: Vec<&PipelineStage> =
                    stages.values().filter(|s| s.tenant_id == tenant_id).collect();
                rows.sort_by(|a, b| {
                    a.position
                        .total_cmp(&b.position)
                        .then_with(|| a.stage_id.cmp(&b.stage_id))
                });
                let current: Vec<(Uuid, Position)> =
                    rows.iter().map(|s| (s.item_id(), s.position)).collect();
                let plan = rebalance_plan(&current);
                for (id, position) in &plan {
                    if let Some(row) = stages.get_mut(&StageId::from(*id)) {
                        row.position = *position;
                        row.updated_at = now;
                    }
                }
                Ok(plan)
            }
            PartitionKey::Opportunities {
                tenant_id,
                stage_id,
            } => {
                let mut opportunities = self.opportunities.write().map_err(poisoned)?;
                let mut rows: Vec<&Opportunity> = opportunities
                    .values()
                    .filter(|o| o.tenant_id == tenant_id && o.stage_id == stage_id)
                    .collect();
                rows.sort_by(|a, b| {
                    a.position
                        .total_cmp(&b.position)
                        .then_with(|| a.opportunity_id.cmp(&b.opportunity_id))
                });
                let current: Vec<(Uuid, Position)> =
                    rows.iter().map(|o| (o.item_id(), o.position)).collect();
                let plan = rebalance_plan(&current);
                for (id, position) in &plan {
                    if let Some(row) = opportunities.get_mut(&OpportunityId::from(*id)) {
                        row.position = *position;
                        row.updated_at = now;
                    }
                }
                Ok(plan)
            }
        }
    }

    /// Unready while writes are switched off.
    async fn ping(&self) -> CrmResult<()> {
        drop(self.stages.read().map_err(poisoned)?);
        self.check_writable()
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::Utc;
    use crm_core::EntityIdType;
    use proptest::prelude::*;

    fn test_runtime() -> Result<tokio::runtime::Runtime, TestCaseError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Listing a partition always yields non-decreasing positions.
        #[test]
        fn prop_partition_positions_sorted(positions in proptest::collection::vec(-1.0e6..1.0e6_f64, 0..30)) {
            let rt = test_runtime()?;
            rt.block_on(async {
                let storage = MockStorage::new();
                let tenant = TenantId::now_v7();
                for p in &positions {
                    let stage = PipelineStage {
                        stage_id: StageId::now_v7(),
                        tenant_id: tenant,
                        name: "s".to_string(),
                        position: *p,
                        created_at: Utc::now(),
                        updated_at: Utc::now(),
                    };
                    storage.stage_insert(&stage).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
                }
                let listed = storage
                    .partition_positions(PartitionKey::stages(tenant))
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(listed.len(), positions.len());
                prop_assert!(listed.windows(2).all(|w| w[0].1 <= w[1].1));
                Ok(())
            })?;
        }
    }
}
