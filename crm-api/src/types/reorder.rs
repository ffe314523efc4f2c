//! Reorder and stage-change request bodies.

use crm_core::{Neighbors, Position, StageId};
use serde::{Deserialize, Serialize};

/// Drop point inside the current partition.
///
/// At least one neighbor is required; an empty body is rejected with 400.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    /// Position of the item that will sit just before the moved item
    #[serde(default)]
    pub prev_position: Option<Position>,
    /// Position of the item that will sit just after the moved item
    #[serde(default)]
    pub next_position: Option<Position>,
}

impl ReorderRequest {
    pub fn neighbors(&self) -> Neighbors {
        Neighbors::new(self.prev_position, self.next_position)
    }
}

/// Move an opportunity to another stage (or within its own).
///
/// Without neighbors the opportunity is appended to the end of the
/// destination stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ChangeStageRequest {
    #[serde(alias = "stage_id")]
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub stage_id: StageId,
    #[serde(default)]
    pub prev_position: Option<Position>,
    #[serde(default)]
    pub next_position: Option<Position>,
}

impl ChangeStageRequest {
    pub fn neighbors(&self) -> Neighbors {
        Neighbors::new(self.prev_position, self.next_position)
    }
}
