//! Core entity structures

use crate::{
    CompanyId, ContactId, OpportunityId, PartitionKey, Position, StageId, TenantId, Timestamp,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity type discriminator used in errors, logs and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Opportunity,
    PipelineStage,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Opportunity => "opportunity",
            EntityType::PipelineStage => "pipeline_stage",
        }
    }
}

/// An entity that lives in a manually ordered list.
///
/// The partition is the only scope in which `position` values are compared.
pub trait OrderableItem {
    const ENTITY_TYPE: EntityType;

    fn item_id(&self) -> Uuid;
    fn tenant_id(&self) -> TenantId;
    fn position(&self) -> Position;
    fn partition(&self) -> PartitionKey;
}

/// Sales opportunity, always inside exactly one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Opportunity {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub opportunity_id: OpportunityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub stage_id: StageId,
    pub name: String,
    pub amount: Option<f64>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub company_id: Option<CompanyId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub contact_id: Option<ContactId>,
    pub position: Position,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl OrderableItem for Opportunity {
    const ENTITY_TYPE: EntityType = EntityType::Opportunity;

    fn item_id(&self) -> Uuid {
        self.opportunity_id.into()
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn position(&self) -> Position {
        self.position
    }

    fn partition(&self) -> PartitionKey {
        PartitionKey::Opportunities {
            tenant_id: self.tenant_id,
            stage_id: self.stage_id,
        }
    }
}

/// Named column of the tenant's sales pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PipelineStage {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub stage_id: StageId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    pub name: String,
    pub position: Position,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl OrderableItem for PipelineStage {
    const ENTITY_TYPE: EntityType = EntityType::PipelineStage;

    fn item_id(&self) -> Uuid {
        self.stage_id.into()
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn position(&self) -> Position {
        self.position
    }

    fn partition(&self) -> PartitionKey {
        PartitionKey::Stages {
            tenant_id: self.tenant_id,
        }
    }
}
