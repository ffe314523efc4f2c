//! Position resolution with rebalance-on-exhaustion.

use crm_core::{
    place_between, CrmResult, EntityType, Neighbors, PartitionKey, Placement, Position,
    ReorderError,
};
use crm_storage::PositionStore;
use uuid::Uuid;

use crate::telemetry::metrics::with_metrics;

/// A position ready to be written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub position: Position,
    /// The partition was renumbered to make room.
    pub rebalanced: bool,
}

/// An item after a successful move.
#[derive(Debug, Clone, PartialEq)]
pub struct Moved<T> {
    pub item: T,
    pub rebalanced: bool,
}

/// Compute where `moved` lands between `neighbors` inside `partition`.
///
/// Ordinarily this is the pure calculator. When the gap between the
/// neighbors is too small for an `f64` midpoint, the partition is renumbered
/// to `1..n` in one step, the neighbors are looked up again by item id, and
/// the midpoint is recomputed.
pub async fn resolve_position(
    store: &dyn PositionStore,
    partition: PartitionKey,
    moved: Uuid,
    neighbors: Neighbors,
) -> CrmResult<Resolved> {
    match place_between(neighbors.prev, neighbors.next)? {
        Placement::At(position) => Ok(Resolved {
            position,
            rebalanced: false,
        }),
        Placement::Exhausted => rebalance_and_place(store, partition, moved, neighbors).await,
    }
}

async fn rebalance_and_place(
    store: &dyn PositionStore,
    partition: PartitionKey,
    moved: Uuid,
    neighbors: Neighbors,
) -> CrmResult<Resolved> {
    let snapshot = store.partition_positions(partition).await?;
    let prev_id = neighbors
        .prev
        .map(|p| neighbor_id(&snapshot, moved, p, Side::Prev))
        .transpose()?;
    let next_id = neighbors
        .next
        .map(|p| neighbor_id(&snapshot, moved, p, Side::Next))
        .transpose()?;

    let assignments = store.rebalance(partition).await?;
    let entity_type = partition.entity_type();
    with_metrics(|m| m.record_rebalance(entity_type, "exhausted", assignments.len()));
    tracing::info!(
        tenant_id = %partition.tenant_id(),
        partition = %partition,
        rows = assignments.len(),
        "Position precision exhausted, partition rebalanced"
    );

    let lookup = |id: Uuid| {
        assignments
            .iter()
            .find(|(item, _)| *item == id)
            .map(|(_, position)| *position)
            .ok_or_else(|| stale_neighbors(entity_type))
    };
    let prev = prev_id.map(lookup).transpose()?;
    let next = next_id.map(lookup).transpose()?;

    match place_between(prev, next)? {
        Placement::At(position) => Ok(Resolved {
            position,
            rebalanced: true,
        }),
        Placement::Exhausted => Err(ReorderError::invalid(
            "no room between the given neighbors even after rebalancing",
        )
        .into()),
    }
}

#[derive(Clone, Copy)]
enum Side {
    Prev,
    Next,
}

/// Id of the row currently holding `position`, ignoring the moved row.
/// Among ties the prev neighbor is the last one and the next neighbor the
/// first one, which keeps the moved row between them after renumbering.
fn neighbor_id(
    snapshot: &[(Uuid, Position)],
    moved: Uuid,
    position: Position,
    side: Side,
) -> CrmResult<Uuid> {
    let mut matches = snapshot
        .iter()
        .filter(|(id, p)| *id != moved && *p == position)
        .map(|(id, _)| *id);
    let found = match side {
        Side::Prev => matches.last(),
        Side::Next => matches.next(),
    };
    found.ok_or_else(|| {
        ReorderError::invalid(format!(
            "no item at position {} in the target list; reload and retry",
            position
        ))
        .into()
    })
}

fn stale_neighbors(entity_type: EntityType) -> crm_core::CrmError {
    ReorderError::invalid(format!(
        "{} neighbors changed during rebalance; reload and retry",
        entity_type.as_str()
    ))
    .into()
}
