//! Opportunity API types

use crm_core::{CompanyId, ContactId, Opportunity, OpportunityId, Position, StageId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};

/// Request to create an opportunity at the end of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CreateOpportunityRequest {
    pub name: String,
    #[serde(alias = "stage_id")]
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub stage_id: StageId,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub company_id: Option<CompanyId>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub contact_id: Option<ContactId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct OpportunityResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: OpportunityId,
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

impl From<Opportunity> for OpportunityResponse {
    fn from(o: Opportunity) -> Self {
        Self {
            id: o.opportunity_id,
            tenant_id: o.tenant_id,
            stage_id: o.stage_id,
            name: o.name,
            amount: o.amount,
            company_id: o.company_id,
            contact_id: o.contact_id,
            position: o.position,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

/// Opportunities of one stage, ordered by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ListOpportunitiesResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub stage_id: StageId,
    pub opportunities: Vec<OpportunityResponse>,
    pub total: usize,
}

impl ListOpportunitiesResponse {
    pub fn new(stage_id: StageId, opportunities: Vec<Opportunity>) -> Self {
        let opportunities: Vec<OpportunityResponse> =
            opportunities.into_iter().map(Into::into).collect();
        Self {
            stage_id,
            total: opportunities.len(),
            opportunities,
        }
    }
}
