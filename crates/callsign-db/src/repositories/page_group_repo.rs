//! Page group repository implementation

use callsign_core::{models::PageGroup, traits::PageGroupRepository, AppError, AppResult};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, instrument};

/// PostgreSQL implementation of PageGroupRepository
pub struct PgPageGroupRepository {
    pool: PgPool,
}

impl PgPageGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PageGroupRepository for PgPageGroupRepository {
    /// Members are the enabled extensions behind the group's destinations
    #[instrument(skip(self))]
    async fn find(&self, tenant_id: i64, group_id: i64) -> AppResult<Option<PageGroup>> {
        let row = sqlx::query_as::<sqlx::Postgres, PageGroupRow>(
            r#"
            SELECT
                g.id, g.tenant_id, g.name,
                COALESCE(
                    array_agg(e.extension::text ORDER BY e.extension)
                        FILTER (WHERE e.extension IS NOT NULL),
                    '{}'
                ) AS extensions
            FROM page_groups g
            LEFT JOIN page_group_destinations d
                   ON d.page_group_id = g.id AND d.deleted_at IS NULL
            LEFT JOIN extensions e
                   ON e.id = d.extension_id AND e.enabled = true AND e.deleted_at IS NULL
            WHERE g.id = $1 AND g.tenant_id = $2 AND g.deleted_at IS NULL
            GROUP BY g.id, g.tenant_id, g.name
            "#,
        )
        .bind(group_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding page group {}: {}", group_id, e);
            AppError::Database(format!("Failed to find page group: {}", e))
        })?;

        Ok(row.map(|r| PageGroup {
            id: r.id,
            tenant_id: r.tenant_id,
            name: r.name,
            extensions: r.extensions,
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PageGroupRow {
    id: i64,
    tenant_id: i64,
    name: String,
    extensions: Vec<String>,
}
