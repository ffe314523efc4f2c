//! CRM Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Proptest generators for tenants and positions
//! - Fixtures that seed a `MockStorage` with a pipeline
//! - Assertions for ordering and error classification

// Re-export mock storage from its source crate
pub use crm_storage::{MockStorage, PositionStore, PositionTarget, PositionUpdate};

// Re-export core types for convenience
pub use crm_core::{
    CrmError, CrmResult, EntityIdType, EntityType, Opportunity, OpportunityId, PartitionKey,
    PipelineStage, Position, ReorderError, StageId, StorageError, TenantId, Timestamp,
};

use chrono::Utc;
use uuid::Uuid;

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating CRM entity types.

    use super::*;
    use proptest::prelude::*;

    // === Identity Type Generators ===

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        arb_uuid().prop_map(TenantId::new)
    }

    /// Two distinct tenants.
    pub fn arb_tenant_pair() -> impl Strategy<Value = (TenantId, TenantId)> {
        (arb_tenant_id(), arb_tenant_id()).prop_filter("tenants must differ", |(a, b)| a != b)
    }

    // === Position Generators ===

    /// A finite position in a range where `+/- 0.5` and midpoints stay exact
    /// enough to be strictly ordered.
    pub fn arb_position() -> impl Strategy<Value = Position> {
        -1.0e9..1.0e9_f64
    }

    /// A neighbor pair with `prev < next` and a gap wide enough for a midpoint.
    pub fn arb_neighbor_pair() -> impl Strategy<Value = (Position, Position)> {
        (arb_position(), 1.0e-3..1.0e6_f64).prop_map(|(prev, gap)| (prev, prev + gap))
    }

    /// Distinct positions sorted ascending.
    pub fn arb_sorted_positions(max_len: usize) -> impl Strategy<Value = Vec<Position>> {
        proptest::collection::btree_set(-100_000i64..100_000i64, 0..max_len).prop_map(|set| {
            set.into_iter().map(|v| v as f64 / 4.0).collect()
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities and seeded storage for common scenarios.

    use super::*;

    pub fn stage(tenant_id: TenantId, name: &str, position: Position) -> PipelineStage {
        let now = Utc::now();
        PipelineStage {
            stage_id: StageId::now_v7(),
            tenant_id,
            name: name.to_string(),
            position,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn opportunity(tenant_id: TenantId, stage_id: StageId, position: Position) -> Opportunity {
        let now = Utc::now();
        Opportunity {
            opportunity_id: OpportunityId::now_v7(),
            tenant_id,
            stage_id,
            name: format!("Deal @ {}", position),
            amount: Some(1_000.0),
            company_id: None,
            contact_id: None,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    /// A stage holding one opportunity per given position.
    pub struct SeededStage {
        pub stage: PipelineStage,
        pub opportunities: Vec<Opportunity>,
    }

    impl SeededStage {
        pub fn id(&self) -> StageId {
            self.stage.stage_id
        }

        /// Id of the opportunity seeded at `index`.
        pub fn opportunity_id(&self, index: usize) -> Option<OpportunityId> {
            self.opportunities.get(index).map(|o| o.opportunity_id)
        }
    }

    /// Insert a stage at `stage_position` with opportunities at `positions`.
    pub async fn seed_stage(
        storage: &MockStorage,
        tenant_id: TenantId,
        name: &str,
        stage_position: Position,
        positions: &[Position],
    ) -> CrmResult<SeededStage> {
        let stage = stage(tenant_id, name, stage_position);
        storage.stage_insert(&stage).await?;
        let mut opportunities = Vec::with_capacity(positions.len());
        for position in positions {
            let opp = opportunity(tenant_id, stage.stage_id, *position);
            storage.opportunity_insert(&opp).await?;
            opportunities.push(opp);
        }
        Ok(SeededStage {
            stage,
            opportunities,
        })
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for ordering and error classification.

    use super::*;

    /// Assert that positions are strictly increasing.
    #[track_caller]
    pub fn assert_strictly_ordered(positions: &[Position]) {
        for pair in positions.windows(2) {
            assert!(
                pair[0] < pair[1],
                "positions not strictly ordered: {:?}",
                positions
            );
        }
    }

    /// Assert that a result is `InvalidReorderInput`.
    #[track_caller]
    pub fn assert_invalid_reorder<T: std::fmt::Debug>(result: &CrmResult<T>) {
        match result {
            Err(CrmError::Reorder(ReorderError::InvalidReorderInput { .. })) => {}
            other => panic!("Expected InvalidReorderInput, got: {:?}", other),
        }
    }

    /// Assert that a result is a tenant mismatch.
    #[track_caller]
    pub fn assert_unauthorized<T: std::fmt::Debug>(result: &CrmResult<T>) {
        match result {
            Err(CrmError::Reorder(ReorderError::Unauthorized { .. })) => {}
            other => panic!("Expected Unauthorized, got: {:?}", other),
        }
    }

    /// Assert that a result is a NotFound storage error for `entity_type`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &CrmResult<T>, entity_type: EntityType) {
        match result {
            Err(CrmError::Storage(StorageError::NotFound {
                entity_type: et, ..
            })) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    /// Assert that a result is a persistence failure.
    #[track_caller]
    pub fn assert_persistence_failure<T: std::fmt::Debug>(result: &CrmResult<T>) {
        match result {
            Err(e) if e.is_persistence_failure() => {}
            other => panic!("Expected persistence failure, got: {:?}", other),
        }
    }
}
