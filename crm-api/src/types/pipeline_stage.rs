//! Pipeline stage API types

use crm_core::{PipelineStage, Position, StageId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CreatePipelineStageRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PipelineStageResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: StageId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    pub name: String,
    pub position: Position,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl From<PipelineStage> for PipelineStageResponse {
    fn from(s: PipelineStage) -> Self {
        Self {
            id: s.stage_id,
            tenant_id: s.tenant_id,
            name: s.name,
            position: s.position,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ListPipelineStagesResponse {
    pub stages: Vec<PipelineStageResponse>,
    pub total: usize,
}

impl From<Vec<PipelineStage>> for ListPipelineStagesResponse {
    fn from(stages: Vec<PipelineStage>) -> Self {
        let stages: Vec<PipelineStageResponse> = stages.into_iter().map(Into::into).collect();
        Self {
            total: stages.len(),
            stages,
        }
    }
}

/// One renumbered row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PositionAssignment {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: Uuid,
    pub position: Position,
}

/// Result of renumbering a partition to `1..n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RebalanceResponse {
    /// "pipeline_stage" or "opportunity"
    pub entity_type: String,
    pub assignments: Vec<PositionAssignment>,
    pub total: usize,
}

impl RebalanceResponse {
    pub fn new(entity_type: &str, assignments: Vec<(Uuid, Position)>) -> Self {
        let assignments: Vec<PositionAssignment> = assignments
            .into_iter()
            .map(|(id, position)| PositionAssignment { id, position })
            .collect();
        Self {
            entity_type: entity_type.to_string(),
            total: assignments.len(),
            assignments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crm_core::EntityIdType;

    #[test]
    fn test_stage_response_uses_camel_case() -> Result<(), String> {
        let now = Utc::now();
        let response = PipelineStageResponse::from(PipelineStage {
            stage_id: StageId::now_v7(),
            tenant_id: TenantId::now_v7(),
            name: "Proposal".to_string(),
            position: 2.5,
            created_at: now,
            updated_at: now,
        });
        let json = serde_json::to_string(&response).map_err(|e| e.to_string())?;
        assert!(json.contains("\"tenantId\""));
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"position\":2.5"));
        Ok(())
    }

    #[test]
    fn test_rebalance_response_totals() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let response = RebalanceResponse::new("opportunity", vec![(a, 1.0), (b, 2.0)]);
        assert_eq!(response.total, 2);
        assert_eq!(response.assignments[1], PositionAssignment { id: b, position: 2.0 });
    }
}
