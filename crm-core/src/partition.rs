//! Partition keys: the scopes inside which positions are totally ordered.

use crate::{EntityType, StageId, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scope of a position namespace.
///
/// Positions from different partitions are never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionKey {
    /// The stage columns of one tenant's pipeline.
    Stages { tenant_id: TenantId },
    /// The opportunities inside one stage.
    Opportunities {
        tenant_id: TenantId,
        stage_id: StageId,
    },
}

impl PartitionKey {
    pub fn stages(tenant_id: TenantId) -> Self {
        PartitionKey::Stages { tenant_id }
    }

    pub fn opportunities(tenant_id: TenantId, stage_id: StageId) -> Self {
        PartitionKey::Opportunities {
            tenant_id,
            stage_id,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            PartitionKey::Stages { tenant_id } => *tenant_id,
            PartitionKey::Opportunities { tenant_id, .. } => *tenant_id,
        }
    }

    /// Entity kind whose positions live in this partition.
    pub fn entity_type(&self) -> EntityType {
        match self {
            PartitionKey::Stages { .. } => EntityType::PipelineStage,
            PartitionKey::Opportunities { .. } => EntityType::Opportunity,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Stages { tenant_id } => write!(f, "stages[{}]", tenant_id),
            PartitionKey::Opportunities {
                tenant_id,
                stage_id,
            } => write!(f, "opportunities[{}/{}]", tenant_id, stage_id),
        }
    }
}
