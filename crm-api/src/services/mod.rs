//! Service Layer
//!
//! Pipeline operations shared by the route handlers. Every function takes
//! the store and the acting tenant explicitly and returns `CrmResult`, so the
//! same code runs against PostgreSQL and `MockStorage`.

pub mod opportunity_service;
pub mod pipeline_stage_service;
pub mod placement;

pub use opportunity_service::{
    create_opportunity, delete_opportunity, get_opportunity, move_opportunity_to_stage,
    reorder_opportunity, NewOpportunity,
};
pub use pipeline_stage_service::{
    create_stage, get_stage, list_stage_opportunities, list_stages, rebalance_stage_opportunities,
    rebalance_stages, reorder_stage,
};
pub use placement::{resolve_position, Moved, Resolved};

use crm_core::{CrmResult, OrderableItem, ReorderError, TenantId};

/// Reject access to an item owned by another tenant.
pub fn authorize<T: OrderableItem>(item: &T, acting: TenantId) -> CrmResult<()> {
    let owner = item.tenant_id();
    if owner != acting {
        return Err(ReorderError::Unauthorized {
            entity_type: T::ENTITY_TYPE,
            acting,
            owner,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::{EntityIdType, StageId};
    use crm_test_utils::{assertions::assert_unauthorized, fixtures};

    #[test]
    fn test_authorize_same_tenant() {
        let tenant = TenantId::now_v7();
        let stage = fixtures::stage(tenant, "Lead", 1.0);
        assert!(authorize(&stage, tenant).is_ok());
    }

    #[test]
    fn test_authorize_other_tenant() {
        let owner = TenantId::now_v7();
        let opp = fixtures::opportunity(owner, StageId::now_v7(), 1.0);
        assert_unauthorized(&authorize(&opp, TenantId::now_v7()));
    }
}
