//! Property tests for drag-and-drop ordering.
//!
//! For any sequence of drops, the stage's opportunities SHALL come back in
//! exactly the order a plain list model predicts, with strictly increasing
//! positions, including after gaps are exhausted and the stage is
//! renumbered.

use crm_api::services::{move_opportunity_to_stage, reorder_opportunity};
use crm_core::{Neighbors, OpportunityId, StageId, TenantId};
use crm_test_utils::{
    assertions::assert_strictly_ordered, fixtures::seed_stage, generators::arb_tenant_id,
    MockStorage, PositionStore,
};
use proptest::prelude::*;
use tokio::runtime::Runtime;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn fail(e: impl std::fmt::Display) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

/// Neighbors for dropping into `slot` of `rest` (the stage minus the moved item).
async fn neighbors_at(
    storage: &MockStorage,
    tenant: TenantId,
    stage: StageId,
    moved: OpportunityId,
    slot: usize,
) -> Result<Neighbors, TestCaseError> {
    let rest: Vec<f64> = storage
        .opportunity_list_by_stage(tenant, stage)
        .await
        .map_err(fail)?
        .into_iter()
        .filter(|o| o.opportunity_id != moved)
        .map(|o| o.position)
        .collect();
    let slot = slot % (rest.len() + 1);
    let prev = slot.checked_sub(1).and_then(|i| rest.get(i).copied());
    Ok(Neighbors::new(prev, rest.get(slot).copied()))
}

async fn stage_order(
    storage: &MockStorage,
    tenant: TenantId,
    stage: StageId,
) -> Result<(Vec<OpportunityId>, Vec<f64>), TestCaseError> {
    let listed = storage
        .opportunity_list_by_stage(tenant, stage)
        .await
        .map_err(fail)?;
    Ok((
        listed.iter().map(|o| o.opportunity_id).collect(),
        listed.iter().map(|o| o.position).collect(),
    ))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_drops_match_list_model(
        tenant in arb_tenant_id(),
        size in 2usize..10,
        drops in proptest::collection::vec((0usize..10, 0usize..10), 1..40),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let storage = MockStorage::new();
            let initial: Vec<f64> = (1..=size).map(|i| i as f64).collect();
            let seeded = seed_stage(&storage, tenant, "Board", 1.0, &initial)
                .await
                .map_err(fail)?;
            let mut model: Vec<OpportunityId> =
                seeded.opportunities.iter().map(|o| o.opportunity_id).collect();

            for (from, slot) in drops {
                let moved = model[from % model.len()];
                let neighbors = neighbors_at(&storage, tenant, seeded.id(), moved, slot).await?;

                reorder_opportunity(&storage, tenant, moved, neighbors)
                    .await
                    .map_err(fail)?;

                model.retain(|id| *id != moved);
                model.insert(slot % (model.len() + 1), moved);

                let (ids, positions) = stage_order(&storage, tenant, seeded.id()).await?;
                assert_strictly_ordered(&positions);
                prop_assert_eq!(&ids, &model);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Repeatedly dropping onto the same boundary exhausts the gap; the
    /// stage is renumbered and order is still exact.
    #[test]
    fn prop_squeezing_one_gap_stays_ordered(
        tenant in arb_tenant_id(),
        rounds in 60usize..90,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let storage = MockStorage::new();
            let seeded = seed_stage(&storage, tenant, "Squeeze", 1.0, &[1.0, 2.0, 3.0])
                .await
                .map_err(fail)?;
            let first = seeded.opportunity_id(0).ok_or_else(|| fail("missing"))?;
            let mut model: Vec<OpportunityId> =
                seeded.opportunities.iter().map(|o| o.opportunity_id).collect();

            for round in 0..rounds {
                // always drop the last item right after the first one
                let moved = model[model.len() - 1];
                let (ids, positions) = stage_order(&storage, tenant, seeded.id()).await?;
                let first_index = ids.iter().position(|id| *id == first).ok_or_else(|| fail("lost"))?;
                let neighbors = Neighbors::between(positions[first_index], positions[first_index + 1]);

                let result = reorder_opportunity(&storage, tenant, moved, neighbors).await;
                prop_assert!(result.is_ok(), "round {} failed: {:?}", round, result.err());

                model.retain(|id| *id != moved);
                model.insert(1, moved);

                let (ids, positions) = stage_order(&storage, tenant, seeded.id()).await?;
                assert_strictly_ordered(&positions);
                prop_assert_eq!(&ids, &model);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// A cross-stage move removes the item from the source, keeps the
    /// source order, and lands between the chosen destination neighbors.
    #[test]
    fn prop_cross_stage_move(
        tenant in arb_tenant_id(),
        source_size in 1usize..6,
        target_size in 0usize..6,
        from in 0usize..6,
        slot in 0usize..7,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let storage = MockStorage::new();
            let source_positions: Vec<f64> = (1..=source_size).map(|i| i as f64).collect();
            let target_positions: Vec<f64> = (1..=target_size).map(|i| i as f64 * 10.0).collect();
            let source = seed_stage(&storage, tenant, "Source", 1.0, &source_positions)
                .await
                .map_err(fail)?;
            let target = seed_stage(&storage, tenant, "Target", 2.0, &target_positions)
                .await
                .map_err(fail)?;

            let moved = source.opportunities[from % source_size].opportunity_id;
            let slot = slot % (target_size + 1);
            let prev = slot.checked_sub(1).and_then(|i| target_positions.get(i).copied());
            let neighbors = Neighbors::new(prev, target_positions.get(slot).copied());

            let outcome = move_opportunity_to_stage(&storage, tenant, moved, target.id(), neighbors)
                .await
                .map_err(fail)?;
            prop_assert_eq!(outcome.item.stage_id, target.id());

            let (source_ids, source_after) = stage_order(&storage, tenant, source.id()).await?;
            prop_assert!(!source_ids.contains(&moved));
            let expected: Vec<f64> = source_positions
                .iter()
                .copied()
                .enumerate()
                .filter(|(i, _)| *i != from % source_size)
                .map(|(_, p)| p)
                .collect();
            prop_assert_eq!(source_after, expected);

            let (target_ids, target_after) = stage_order(&storage, tenant, target.id()).await?;
            assert_strictly_ordered(&target_after);
            prop_assert_eq!(target_ids.iter().position(|id| *id == moved), Some(slot));
            Ok::<(), TestCaseError>(())
        })?;
    }
}
