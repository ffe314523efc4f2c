//! Database Connection Pool Module
//!
//! PostgreSQL-backed `PositionStore` over a deadpool-postgres pool. Moves are
//! single-row `UPDATE ... WHERE id AND tenant_id` statements; rebalancing is
//! the only multi-row write and runs in one transaction.

use ::async_trait::async_trait;
use chrono::Utc;
use crm_core::{
    rebalance_plan, CompanyId, ContactId, CrmError, CrmResult, EntityIdType, EntityType,
    Opportunity, OpportunityId, PartitionKey, PipelineStage, Position, StageId, StorageError,
    TenantId, Timestamp,
};
use crm_storage::{PositionStore, PositionTarget, PositionUpdate};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::telemetry::metrics::with_metrics;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: SecretString,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create timeout for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "crm".to_string(),
            user: "postgres".to_string(),
            password: SecretString::from(String::new()),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Read `CRM_DB_HOST`, `CRM_DB_PORT`, `CRM_DB_NAME`, `CRM_DB_USER`,
    /// `CRM_DB_PASSWORD`, `CRM_DB_POOL_SIZE` and `CRM_DB_TIMEOUT` (seconds).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("CRM_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("CRM_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("CRM_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("CRM_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("CRM_DB_PASSWORD")
                .map(SecretString::from)
                .unwrap_or(defaults.password),
            max_size: std::env::var("CRM_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("CRM_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.expose_secret().to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn backend(e: impl std::fmt::Display) -> CrmError {
    StorageError::Backend {
        reason: e.to_string(),
    }
    .into()
}

fn column<'a, T: tokio_postgres::types::FromSql<'a>>(row: &'a Row, name: &str) -> CrmResult<T> {
    row.try_get(name).map_err(backend)
}

fn stage_from_row(row: &Row) -> CrmResult<PipelineStage> {
    Ok(PipelineStage {
        stage_id: StageId::new(column(row, "id")?),
        tenant_id: TenantId::new(column(row, "tenant_id")?),
        name: column(row, "name")?,
        position: column(row, "position")?,
        created_at: column::<Timestamp>(row, "created_at")?,
        updated_at: column::<Timestamp>(row, "updated_at")?,
    })
}

fn opportunity_from_row(row: &Row) -> CrmResult<Opportunity> {
    Ok(Opportunity {
        opportunity_id: OpportunityId::new(column(row, "id")?),
        tenant_id: TenantId::new(column(row, "tenant_id")?),
        stage_id: StageId::new(column(row, "stage_id")?),
        name: column(row, "name")?,
        amount: column(row, "amount")?,
        company_id: column::<Option<Uuid>>(row, "company_id")?.map(CompanyId::new),
        contact_id: column::<Option<Uuid>>(row, "contact_id")?.map(ContactId::new),
        position: column(row, "position")?,
        created_at: column::<Timestamp>(row, "created_at")?,
        updated_at: column::<Timestamp>(row, "updated_at")?,
    })
}

const STAGE_COLUMNS: &str = "id, tenant_id, name, position, created_at, updated_at";
const OPPORTUNITY_COLUMNS: &str =
    "id, tenant_id, stage_id, name, amount, company_id, contact_id, position, created_at, updated_at";

/// Table, extra filter column and bind values for one partition.
fn partition_scope(partition: &PartitionKey) -> (&'static str, Uuid, Option<Uuid>) {
    match partition {
        PartitionKey::Stages { tenant_id } => ("pipeline_stages", tenant_id.as_uuid(), None),
        PartitionKey::Opportunities {
            tenant_id,
            stage_id,
        } => ("opportunities", tenant_id.as_uuid(), Some(stage_id.as_uuid())),
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> CrmResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to acquire database connection");
            backend(e)
        })
    }

    /// Time `fut` and record it under `operation`/`entity`.
    async fn observe<T>(
        operation: &'static str,
        entity: EntityType,
        fut: impl Future<Output = CrmResult<T>>,
    ) -> CrmResult<T> {
        let start = Instant::now();
        let result = fut.await;
        with_metrics(|m| {
            m.record_db_operation(
                operation,
                entity.as_str(),
                result.is_ok(),
                start.elapsed().as_secs_f64(),
            )
        });
        if let Err(e) = &result {
            if e.is_persistence_failure() {
                tracing::error!(operation, entity = entity.as_str(), error = %e, "Database operation failed");
            }
        }
        result
    }

    async fn rebalance_in_tx(&self, partition: PartitionKey) -> CrmResult<Vec<(Uuid, Position)>> {
        let (table, tenant, stage) = partition_scope(&partition);
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(|e| {
            CrmError::from(StorageError::TransactionFailed {
                reason: e.to_string(),
            })
        })?;

        let select = match stage {
            Some(_) => format!(
                "SELECT id, position FROM {} WHERE tenant_id = $1 AND stage_id = $2 \
                 ORDER BY position, id FOR UPDATE",
                table
            ),
            None => format!(
                "SELECT id, position FROM {} WHERE tenant_id = $1 ORDER BY position, id FOR UPDATE",
                table
            ),
        };
        let rows = match &stage {
            Some(stage) => tx.query(select.as_str(), &[&tenant, stage]).await,
            None => tx.query(select.as_str(), &[&tenant]).await,
        }
        .map_err(backend)?;

        let current = rows
            .iter()
            .map(|row| Ok((column::<Uuid>(row, "id")?, column::<f64>(row, "position")?)))
            .collect::<CrmResult<Vec<(Uuid, Position)>>>()?;
        let plan = rebalance_plan(&current);

        let ids: Vec<Uuid> = plan.iter().map(|(id, _)| *id).collect();
        let positions: Vec<f64> = plan.iter().map(|(_, p)| *p).collect();
        let update = format!(
            "UPDATE {} AS t SET position = v.position, updated_at = now() \
             FROM unnest($1::uuid[], $2::float8[]) AS v(id, position) \
             WHERE t.id = v.id AND t.tenant_id = $3",
            table
        );
        tx.execute(update.as_str(), &[&ids, &positions, &tenant])
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(|e| {
            CrmError::from(StorageError::TransactionFailed {
                reason: e.to_string(),
            })
        })?;
        Ok(plan)
    }
}

#[async_trait]
impl PositionStore for DbClient {
    // ========================================================================
    // PIPELINE STAGE OPERATIONS
    // ========================================================================

    async fn stage_insert(&self, stage: &PipelineStage) -> CrmResult<()> {
        Self::observe("insert", EntityType::PipelineStage, async {
            let conn = self.get_conn().await?;
            conn.execute(
                "INSERT INTO pipeline_stages (id, tenant_id, name, position, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &stage.stage_id.as_uuid(),
                    &stage.tenant_id.as_uuid(),
                    &stage.name,
                    &stage.position,
                    &stage.created_at,
                    &stage.updated_at,
                ],
            )
            .await
            .map_err(|e| StorageError::InsertFailed {
                entity_type: EntityType::PipelineStage,
                reason: e.to_string(),
            })?;
            Ok(())
        })
        .await
    }

    async fn stage_get(&self, id: StageId) -> CrmResult<Option<PipelineStage>> {
        Self::observe("get", EntityType::PipelineStage, async {
            let conn = self.get_conn().await?;
            let sql = format!("SELECT {} FROM pipeline_stages WHERE id = $1", STAGE_COLUMNS);
            let row = conn
                .query_opt(sql.as_str(), &[&id.as_uuid()])
                .await
                .map_err(backend)?;
            row.as_ref().map(stage_from_row).transpose()
        })
        .await
    }

    async fn stage_list(&self, tenant_id: TenantId) -> CrmResult<Vec<PipelineStage>> {
        Self::observe("list", EntityType::PipelineStage, async {
            let conn = self.get_conn().await?;
            let sql = format!(
                "SELECT {} FROM pipeline_stages WHERE tenant_id = $1 ORDER BY position, id",
                STAGE_COLUMNS
            );
            let rows = conn
                .query(sql.as_str(), &[&tenant_id.as_uuid()])
                .await
                .map_err(backend)?;
            rows.iter().map(stage_from_row).collect()
        })
        .await
    }

    // ========================================================================
    // OPPORTUNITY OPERATIONS
    // ========================================================================

    async fn opportunity_insert(&self, opportunity: &Opportunity) -> CrmResult<()> {
        Self::observe("insert", EntityType::Opportunity, async {
            let conn = self.get_conn().await?;
            conn.execute(
                "INSERT INTO opportunities \
                 (id, tenant_id, stage_id, name, amount, company_id, contact_id, position, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                &[
                    &opportunity.opportunity_id.as_uuid(),
                    &opportunity.tenant_id.as_uuid(),
                    &opportunity.stage_id.as_uuid(),
                    &opportunity.name,
                    &opportunity.amount,
                    &opportunity.company_id.map(|c| c.as_uuid()),
                    &opportunity.contact_id.map(|c| c.as_uuid()),
                    &opportunity.position,
                    &opportunity.created_at,
                    &opportunity.updated_at,
                ],
            )
            .await
            .map_err(|e| StorageError::InsertFailed {
                entity_type: EntityType::Opportunity,
                reason: e.to_string(),
            })?;
            Ok(())
        })
        .await
    }

    async fn opportunity_get(&self, id: OpportunityId) -> CrmResult<Option<Opportunity>> {
        Self::observe("get", EntityType::Opportunity, async {
            let conn = self.get_conn().await?;
            let sql = format!("SELECT {} FROM opportunities WHERE id = $1", OPPORTUNITY_COLUMNS);
            let row = conn
                .query_opt(sql.as_str(), &[&id.as_uuid()])
                .await
                .map_err(backend)?;
            row.as_ref().map(opportunity_from_row).transpose()
        })
        .await
    }

    async fn opportunity_list_by_stage(
        &self,
        tenant_id: TenantId,
        stage_id: StageId,
    ) -> CrmResult<Vec<Opportunity>> {
        Self::observe("list", EntityType::Opportunity, async {
            let conn = self.get_conn().await?;
            let sql = format!(
                "SELECT {} FROM opportunities WHERE tenant_id = $1 AND stage_id = $2 \
                 ORDER BY position, id",
                OPPORTUNITY_COLUMNS
            );
            let rows = conn
                .query(sql.as_str(), &[&tenant_id.as_uuid(), &stage_id.as_uuid()])
                .await
                .map_err(backend)?;
            rows.iter().map(opportunity_from_row).collect()
        })
        .await
    }

    async fn opportunity_delete(&self, tenant_id: TenantId, id: OpportunityId) -> CrmResult<()> {
        Self::observe("delete", EntityType::Opportunity, async {
            let conn = self.get_conn().await?;
            let affected = conn
                .execute(
                    "DELETE FROM opportunities WHERE id = $1 AND tenant_id = $2",
                    &[&id.as_uuid(), &tenant_id.as_uuid()],
                )
                .await
                .map_err(|e| StorageError::DeleteFailed {
                    entity_type: EntityType::Opportunity,
                    id: id.as_uuid(),
                    reason: e.to_string(),
                })?;
            if affected == 0 {
                return Err(StorageError::NotFound {
                    entity_type: EntityType::Opportunity,
                    id: id.as_uuid(),
                }
                .into());
            }
            Ok(())
        })
        .await
    }

    // ========================================================================
    // POSITION OPERATIONS
    // ========================================================================

    async fn max_position(&self, partition: PartitionKey) -> CrmResult<Option<Position>> {
        Self::observe("max_position", partition.entity_type(), async {
            let (table, tenant, stage) = partition_scope(&partition);
            let conn = self.get_conn().await?;
            let row = match &stage {
                Some(stage) => {
                    let sql = format!(
                        "SELECT MAX(position) AS max FROM {} WHERE tenant_id = $1 AND stage_id = $2",
                        table
                    );
                    conn.query_one(sql.as_str(), &[&tenant, stage]).await
                }
                None => {
                    let sql = format!("SELECT MAX(position) AS max FROM {} WHERE tenant_id = $1", table);
                    conn.query_one(sql.as_str(), &[&tenant]).await
                }
            }
            .map_err(backend)?;
            column::<Option<f64>>(&row, "max")
        })
        .await
    }

    async fn partition_positions(&self, partition: PartitionKey) -> CrmResult<Vec<(Uuid, Position)>> {
        Self::observe("partition_positions", partition.entity_type(), async {
            let (table, tenant, stage) = partition_scope(&partition);
            let conn = self.get_conn().await?;
            let rows = match &stage {
                Some(stage) => {
                    let sql = format!(
                        "SELECT id, position FROM {} WHERE tenant_id = $1 AND stage_id = $2 \
                         ORDER BY position, id",
                        table
                    );
                    conn.query(sql.as_str(), &[&tenant, stage]).await
                }
                None => {
                    let sql = format!(
                        "SELECT id, position FROM {} WHERE tenant_id = $1 ORDER BY position, id",
                        table
                    );
                    conn.query(sql.as_str(), &[&tenant]).await
                }
            }
            .map_err(backend)?;
            rows.iter()
                .map(|row| Ok((column::<Uuid>(row, "id")?, column::<f64>(row, "position")?)))
                .collect()
        })
        .await
    }

    async fn set_position(&self, update: &PositionUpdate) -> CrmResult<()> {
        let entity_type = match update.target {
            PositionTarget::Opportunity { .. } => EntityType::Opportunity,
            PositionTarget::Stage { .. } => EntityType::PipelineStage,
        };
        Self::observe("set_position", entity_type, async {
            let conn = self.get_conn().await?;
            let tenant = update.tenant_id.as_uuid();
            let now = Utc::now();
            let affected = match update.target {
                PositionTarget::Opportunity { id, stage_id } => {
                    conn.execute(
                        "UPDATE opportunities \
                         SET position = $1, stage_id = COALESCE($2::uuid, stage_id), updated_at = $3 \
                         WHERE id = $4 AND tenant_id = $5",
                        &[
                            &update.position,
                            &stage_id.map(|s| s.as_uuid()),
                            &now,
                            &id.as_uuid(),
                            &tenant,
                        ],
                    )
                    .await
                }
                PositionTarget::Stage { id } => {
                    conn.execute(
                        "UPDATE pipeline_stages SET position = $1, updated_at = $2 \
                         WHERE id = $3 AND tenant_id = $4",
                        &[&update.position, &now, &id.as_uuid(), &tenant],
                    )
                    .await
                }
            }
            .map_err(|e| StorageError::UpdateFailed {
                entity_type,
                id: update.target.item_id(),
                reason: e.to_string(),
            })?;

            if affected == 0 {
                return Err(StorageError::NotFound {
                    entity_type,
                    id: update.target.item_id(),
                }
                .into());
            }
            Ok(())
        })
        .await
    }

    async fn rebalance(&self, partition: PartitionKey) -> CrmResult<Vec<(Uuid, Position)>> {
        Self::observe("rebalance", partition.entity_type(), self.rebalance_in_tx(partition)).await
    }

    async fn ping(&self) -> CrmResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(backend)?;
        Ok(())
    }
}
