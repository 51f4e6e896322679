//! Presence repository implementation

use callsign_core::{
    models::{ExtensionPresence, PresenceState},
    traits::PresenceRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};

/// PostgreSQL implementation of PresenceRepository
pub struct PgPresenceRepository {
    pool: PgPool,
}

impl PgPresenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceRepository for PgPresenceRepository {
    #[instrument(skip(self))]
    async fn find(&self, domain: &str, user: &str) -> AppResult<Option<ExtensionPresence>> {
        let row = sqlx::query_as::<sqlx::Postgres, PresenceRow>(
            r#"
            SELECT p.tenant_id, p.extension, t.domain, p.state, p.updated_at
            FROM extension_presences p
            JOIN tenants t ON t.id = p.tenant_id
            WHERE t.domain = $1 AND p.extension = $2
            LIMIT 1
            "#,
        )
        .bind(domain)
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding presence of {}@{}: {}", user, domain, e);
            AppError::Database(format!("Failed to find presence: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    /// Upsert keyed by the extension row, so the first state change creates it
    #[instrument(skip(self))]
    async fn update(
        &self,
        tenant_id: i64,
        extension: &str,
        state: PresenceState,
    ) -> AppResult<()> {
        debug!("Presence of {} is now {}", extension, state);

        let result = sqlx::query(
            r#"
            INSERT INTO extension_presences (tenant_id, extension_id, extension, state, dnd, updated_at)
            SELECT e.tenant_id, e.id, e.extension, $3, $4, NOW()
            FROM extensions e
            WHERE e.tenant_id = $1 AND e.extension = $2 AND e.deleted_at IS NULL
            ON CONFLICT (extension_id) DO UPDATE
            SET state = EXCLUDED.state, dnd = EXCLUDED.dnd, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(extension)
        .bind(state.to_string())
        .bind(state == PresenceState::Dnd)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating presence of {}: {}", extension, e);
            AppError::Database(format!("Failed to update presence: {}", e))
        })?;

        if result.rows_affected() == 0 {
            warn!(tenant_id, extension, "Presence update for unknown extension");
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PresenceRow {
    tenant_id: i64,
    extension: String,
    domain: String,
    state: String,
    updated_at: DateTime<Utc>,
}

impl From<PresenceRow> for ExtensionPresence {
    fn from(row: PresenceRow) -> Self {
        ExtensionPresence {
            tenant_id: row.tenant_id,
            extension: row.extension,
            domain: row.domain,
            state: PresenceState::from_str(&row.state).unwrap_or_default(),
            updated_at: row.updated_at,
        }
    }
}
