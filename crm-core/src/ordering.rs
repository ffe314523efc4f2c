//! Fractional-index ordering.
//!
//! Items in a partition carry a real-valued `position`. Moving an item
//! computes one new position from its new neighbors, so no other row is
//! rewritten. Appends go to `max + 1`. When repeated insertion at the same
//! spot exhausts `f64` precision the partition is renumbered to `1..n`.

use crate::ReorderError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordering key. Only relative order inside one partition is meaningful.
pub type Position = f64;

/// Position given to the first item of an empty partition.
pub const FIRST_POSITION: Position = 1.0;

/// Distance between the current maximum and an appended item.
pub const APPEND_STEP: Position = 1.0;

/// Distance from the single neighbor when dropping at either end.
pub const EDGE_OFFSET: Position = 0.5;

/// Positions of the items immediately before and after a drop point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Neighbors {
    pub prev: Option<Position>,
    pub next: Option<Position>,
}

impl Neighbors {
    pub fn new(prev: Option<Position>, next: Option<Position>) -> Self {
        Self { prev, next }
    }

    pub fn between(prev: Position, next: Position) -> Self {
        Self::new(Some(prev), Some(next))
    }

    pub fn before(next: Position) -> Self {
        Self::new(None, Some(next))
    }

    pub fn after(prev: Position) -> Self {
        Self::new(Some(prev), None)
    }

    /// No drop context at all: the caller must take the append path.
    pub fn is_empty(&self) -> bool {
        self.prev.is_none() && self.next.is_none()
    }
}

fn ensure_finite(label: &str, value: Option<Position>) -> Result<(), ReorderError> {
    match value {
        Some(v) if !v.is_finite() => Err(ReorderError::invalid(format!(
            "{} must be a finite number, got {}",
            label, v
        ))),
        _ => Ok(()),
    }
}

/// Compute the position of an item dropped between `prev` and `next`.
///
/// - only `next`: `next - 0.5`
/// - only `prev`: `prev + 0.5`
/// - both: the midpoint
///
/// Fails with `InvalidReorderInput` when both are absent, when either is not
/// finite, or when `prev >= next`.
pub fn calculate_position(
    prev: Option<Position>,
    next: Option<Position>,
) -> Result<Position, ReorderError> {
    ensure_finite("prevPosition", prev)?;
    ensure_finite("nextPosition", next)?;

    match (prev, next) {
        (None, None) => Err(ReorderError::invalid(
            "at least one of prevPosition or nextPosition is required",
        )),
        (None, Some(next)) => Ok(next - EDGE_OFFSET),
        (Some(prev), None) => Ok(prev + EDGE_OFFSET),
        (Some(prev), Some(next)) => {
            if prev >= next {
                return Err(ReorderError::invalid(format!(
                    "prevPosition ({}) must be less than nextPosition ({})",
                    prev, next
                )));
            }
            let mid = (prev + next) / 2.0;
            if mid.is_finite() {
                Ok(mid)
            } else {
                // prev + next overflowed
                Ok(prev / 2.0 + next / 2.0)
            }
        }
    }
}

/// Position for an item appended to a partition whose current maximum is `max`.
pub fn append_position(max: Option<Position>) -> Position {
    match max {
        Some(max) => max + APPEND_STEP,
        None => FIRST_POSITION,
    }
}

/// True when `candidate` sorts strictly after `prev` and strictly before `next`.
pub fn is_strictly_between(
    candidate: Position,
    prev: Option<Position>,
    next: Option<Position>,
) -> bool {
    prev.map_or(true, |p| p < candidate) && next.map_or(true, |n| candidate < n)
}

/// Result of placing an item between two neighbors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// The computed key sorts strictly between the neighbors.
    At(Position),
    /// Floating-point headroom is gone; the partition must be renumbered.
    Exhausted,
}

/// Like [`calculate_position`], but reports precision exhaustion instead of
/// returning a key equal to one of the neighbors.
pub fn place_between(prev: Option<Position>, next: Option<Position>) -> Result<Placement, ReorderError> {
    let candidate = calculate_position(prev, next)?;
    if is_strictly_between(candidate, prev, next) {
        Ok(Placement::At(candidate))
    } else {
        Ok(Placement::Exhausted)
    }
}

/// Renumber a partition to `1..n`, keeping the current relative order.
///
/// Ties keep their input order (stable sort).
pub fn rebalance_plan(items: &[(Uuid, Position)]) -> Vec<(Uuid, Position)> {
    let mut sorted: Vec<(Uuid, Position)> = items.to_vec();
    sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
    sorted
        .into_iter()
        .enumerate()
        .map(|(idx, (id, _))| (id, FIRST_POSITION + idx as Position * APPEND_STEP))
        .collect()
}
