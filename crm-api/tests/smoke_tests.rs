//! End-to-end smoke tests against PostgreSQL.
//!
//! Needs a database with `sql/schema.sql` applied and the `CRM_DB_*`
//! variables set; run with `--features db-tests`.

#![cfg(feature = "db-tests")]

use crm_api::services::{
    create_opportunity, create_stage, list_stage_opportunities, move_opportunity_to_stage,
    rebalance_stage_opportunities, reorder_opportunity, NewOpportunity,
};
use crm_api::{ApiResult, DbClient, DbConfig};
use crm_core::{EntityIdType, Neighbors, TenantId};
use crm_test_utils::assertions::{assert_not_found, assert_strictly_ordered, assert_unauthorized};
use crm_test_utils::{EntityType, OpportunityId, PositionStore};

fn test_db() -> ApiResult<DbClient> {
    let config = DbConfig::from_env();
    DbClient::from_config(&config)
}

fn new_opportunity(stage_id: crm_core::StageId, name: &str) -> NewOpportunity {
    NewOpportunity {
        stage_id,
        name: name.to_string(),
        amount: Some(1_000.0),
        company_id: None,
        contact_id: None,
    }
}

#[tokio::test]
async fn smoke_test_reorder_chain() -> Result<(), String> {
    let db = test_db().map_err(|e| e.message)?;
    db.ping().await.map_err(|e| e.to_string())?;
    let tenant = TenantId::now_v7();

    let lead = create_stage(&db, tenant, "Lead").await.map_err(|e| e.to_string())?;
    let won = create_stage(&db, tenant, "Won").await.map_err(|e| e.to_string())?;
    assert!(lead.position < won.position);

    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let opp = create_opportunity(&db, tenant, new_opportunity(lead.stage_id, name))
            .await
            .map_err(|e| e.to_string())?;
        ids.push(opp);
    }
    assert_eq!(
        ids.iter().map(|o| o.position).collect::<Vec<_>>(),
        vec![1.0, 2.0, 3.0]
    );

    let moved = reorder_opportunity(&db, tenant, ids[2].opportunity_id, Neighbors::between(1.0, 2.0))
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(moved.item.position, 1.5);

    let moved = move_opportunity_to_stage(
        &db,
        tenant,
        ids[0].opportunity_id,
        won.stage_id,
        Neighbors::default(),
    )
    .await
    .map_err(|e| e.to_string())?;
    assert_eq!(moved.item.stage_id, won.stage_id);
    assert_eq!(moved.item.position, 1.0);

    let remaining = list_stage_opportunities(&db, tenant, lead.stage_id)
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(remaining.len(), 2);

    let assignments = rebalance_stage_opportunities(&db, tenant, lead.stage_id)
        .await
        .map_err(|e| e.to_string())?;
    let positions: Vec<f64> = assignments.iter().map(|(_, p)| *p).collect();
    assert_eq!(positions, vec![1.0, 2.0]);
    assert_strictly_ordered(&positions);
    Ok(())
}

#[tokio::test]
async fn smoke_test_tenant_and_missing_rows() -> Result<(), String> {
    let db = test_db().map_err(|e| e.message)?;
    let owner = TenantId::now_v7();
    let intruder = TenantId::now_v7();

    let stage = create_stage(&db, owner, "Owner").await.map_err(|e| e.to_string())?;
    let opp = create_opportunity(&db, owner, new_opportunity(stage.stage_id, "deal"))
        .await
        .map_err(|e| e.to_string())?;

    let result =
        reorder_opportunity(&db, intruder, opp.opportunity_id, Neighbors::after(5.0)).await;
    assert_unauthorized(&result);

    let result =
        reorder_opportunity(&db, owner, OpportunityId::now_v7(), Neighbors::after(5.0)).await;
    assert_not_found(&result, EntityType::Opportunity);
    Ok(())
}
