//! Call flow repository implementation
//!
//! `state_count` is derived from the length of the `destinations` JSON array.

use callsign_core::{models::CallFlow, traits::CallFlowRepository, AppError, AppResult};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of CallFlowRepository
pub struct PgCallFlowRepository {
    pool: PgPool,
}

impl PgCallFlowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallFlowRepository for PgCallFlowRepository {
    #[instrument(skip(self))]
    async fn find_for_code(
        &self,
        tenant_id: i64,
        code: &str,
        extension: Option<String>,
    ) -> AppResult<Option<CallFlow>> {
        let row = sqlx::query_as::<sqlx::Postgres, CallFlowRow>(
            r#"
            SELECT
                id, tenant_id, name, extension, feature_code, current_state,
                COALESCE(jsonb_array_length(destinations), 0) AS state_count,
                enabled
            FROM call_flows
            WHERE tenant_id = $1
              AND enabled = true AND deleted_at IS NULL
              AND CASE WHEN $3::text IS NULL THEN feature_code = $2 ELSE extension = $3 END
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(code)
        .bind(extension)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding call flow for {}: {}", code, e);
            AppError::Database(format!("Failed to find call flow: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_domain(&self, domain: &str, user: &str) -> AppResult<Option<CallFlow>> {
        let row = sqlx::query_as::<sqlx::Postgres, CallFlowRow>(
            r#"
            SELECT
                cf.id, cf.tenant_id, cf.name, cf.extension, cf.feature_code, cf.current_state,
                COALESCE(jsonb_array_length(cf.destinations), 0) AS state_count,
                cf.enabled
            FROM call_flows cf
            JOIN tenants t ON t.id = cf.tenant_id
            WHERE t.domain = $1
              AND (cf.extension = $2 OR cf.feature_code = $2)
              AND cf.enabled = true AND cf.deleted_at IS NULL
            ORDER BY cf.id ASC
            LIMIT 1
            "#,
        )
        .bind(domain)
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding call flow {}@{}: {}", user, domain, e);
            AppError::Database(format!("Failed to find call flow: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn set_state(&self, id: i64, state: i32) -> AppResult<()> {
        debug!("Call flow {} -> state {}", id, state);

        let result = sqlx::query(
            "UPDATE call_flows SET current_state = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating call flow {}: {}", id, e);
            AppError::Database(format!("Failed to update call flow: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Call flow {}", id)));
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CallFlowRow {
    id: i64,
    tenant_id: i64,
    name: String,
    extension: Option<String>,
    feature_code: Option<String>,
    current_state: i32,
    state_count: i32,
    enabled: bool,
}

impl From<CallFlowRow> for CallFlow {
    fn from(row: CallFlowRow) -> Self {
        CallFlow {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            extension: row.extension.filter(|e| !e.is_empty()),
            feature_code: row.feature_code.filter(|c| !c.is_empty()),
            current_state: row.current_state,
            state_count: row.state_count,
            enabled: row.enabled,
        }
    }
}
