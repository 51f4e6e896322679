//! Extension repository implementation
//!
//! Directory lookups resolve the domain through `tenants`; the user-feature
//! writes (forward, DND, recording) touch only the flag columns.

use callsign_core::{
    models::Extension, traits::ExtensionRepository, AppError, AppResult,
};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of ExtensionRepository
pub struct PgExtensionRepository {
    pool: PgPool,
}

impl PgExtensionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// An UPDATE that matched nothing means the extension does not exist
fn ensure_updated(rows: u64, tenant_id: i64, extension: &str) -> AppResult<()> {
    if rows == 0 {
        return Err(AppError::NotFound(format!(
            "Extension {} (tenant {})",
            extension, tenant_id
        )));
    }
    Ok(())
}

#[async_trait]
impl ExtensionRepository for PgExtensionRepository {
    #[instrument(skip(self))]
    async fn find_by_user(&self, domain: &str, user: &str) -> AppResult<Option<Extension>> {
        debug!("Finding extension {}@{}", user, domain);

        let row = sqlx::query_as::<sqlx::Postgres, ExtensionRow>(
            r#"
            SELECT
                e.id, e.uuid, e.tenant_id, e.extension, e.number_alias,
                t.domain, e.password, e.enabled, e.voicemail_enabled, e.user_context,
                e.effective_caller_id_name, e.effective_caller_id_number,
                e.outbound_caller_id_name, e.outbound_caller_id_number,
                e.call_timeout, e.max_registrations, e.do_not_disturb,
                e.forward_all_enabled, e.forward_all_destination,
                e.record_inbound, e.record_outbound
            FROM extensions e
            JOIN tenants t ON t.id = e.tenant_id
            WHERE t.domain = $1
              AND (e.extension = $2 OR e.number_alias = $2)
              AND e.enabled = true
              AND e.deleted_at IS NULL
              AND t.deleted_at IS NULL
            ORDER BY (e.extension = $2) DESC, e.id ASC
            LIMIT 1
            "#,
        )
        .bind(domain)
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding extension {}@{}: {}", user, domain, e);
            AppError::Database(format!("Failed to find extension: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn set_forward(
        &self,
        tenant_id: i64,
        extension: &str,
        enabled: bool,
        destination: Option<String>,
    ) -> AppResult<()> {
        debug!("Setting call forward for {} to {}", extension, enabled);

        let result = sqlx::query(
            r#"
            UPDATE extensions
            SET forward_all_enabled = $3,
                forward_all_destination = COALESCE($4, forward_all_destination),
                updated_at = NOW()
            WHERE tenant_id = $1 AND extension = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(tenant_id)
        .bind(extension)
        .bind(enabled)
        .bind(destination)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating call forward for {}: {}", extension, e);
            AppError::Database(format!("Failed to update call forward: {}", e))
        })?;

        ensure_updated(result.rows_affected(), tenant_id, extension)
    }

    #[instrument(skip(self))]
    async fn set_dnd(&self, tenant_id: i64, extension: &str, enabled: bool) -> AppResult<()> {
        debug!("Setting DND for {} to {}", extension, enabled);

        let result = sqlx::query(
            r#"
            UPDATE extensions
            SET do_not_disturb = $3, updated_at = NOW()
            WHERE tenant_id = $1 AND extension = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(tenant_id)
        .bind(extension)
        .bind(enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating do not disturb for {}: {}", extension, e);
            AppError::Database(format!("Failed to update do not disturb: {}", e))
        })?;

        ensure_updated(result.rows_affected(), tenant_id, extension)
    }

    #[instrument(skip(self))]
    async fn enable_recording(&self, tenant_id: i64, extension: &str) -> AppResult<()> {
        debug!("Enabling call recording for {}", extension);

        let result = sqlx::query(
            r#"
            UPDATE extensions
            SET record_inbound = true, record_outbound = true, updated_at = NOW()
            WHERE tenant_id = $1 AND extension = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(tenant_id)
        .bind(extension)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating call recording for {}: {}", extension, e);
            AppError::Database(format!("Failed to update call recording: {}", e))
        })?;

        ensure_updated(result.rows_affected(), tenant_id, extension)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExtensionRow {
    id: i64,
    uuid: Uuid,
    tenant_id: i64,
    extension: String,
    number_alias: Option<String>,
    domain: String,
    password: Option<String>,
    enabled: bool,
    voicemail_enabled: bool,
    user_context: Option<String>,
    effective_caller_id_name: Option<String>,
    effective_caller_id_number: Option<String>,
    outbound_caller_id_name: Option<String>,
    outbound_caller_id_number: Option<String>,
    call_timeout: Option<i32>,
    max_registrations: Option<i32>,
    do_not_disturb: bool,
    forward_all_enabled: bool,
    forward_all_destination: Option<String>,
    record_inbound: bool,
    record_outbound: bool,
}

impl From<ExtensionRow> for Extension {
    fn from(row: ExtensionRow) -> Self {
        Extension {
            id: row.id,
            uuid: row.uuid,
            tenant_id: row.tenant_id,
            extension: row.extension,
            number_alias: row.number_alias.filter(|a| !a.is_empty()),
            domain: row.domain,
            password: row.password.unwrap_or_default(),
            enabled: row.enabled,
            voicemail_enabled: row.voicemail_enabled,
            user_context: row.user_context,
            effective_caller_id_name: row.effective_caller_id_name,
            effective_caller_id_number: row.effective_caller_id_number,
            outbound_caller_id_name: row.outbound_caller_id_name,
            outbound_caller_id_number: row.outbound_caller_id_number,
            call_timeout: row.call_timeout.unwrap_or(30),
            max_registrations: row.max_registrations.unwrap_or(1),
            do_not_disturb: row.do_not_disturb,
            forward_all_enabled: row.forward_all_enabled,
            forward_all_destination: row.forward_all_destination,
            record_inbound: row.record_inbound,
            record_outbound: row.record_outbound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_defaults() {
        let row = ExtensionRow {
            id: 1,
            uuid: Uuid::nil(),
            tenant_id: 42,
            extension: "1001".to_string(),
            number_alias: Some(String::new()),
            domain: "acme.example.com".to_string(),
            password: None,
            enabled: true,
            voicemail_enabled: true,
            user_context: None,
            effective_caller_id_name: None,
            effective_caller_id_number: None,
            outbound_caller_id_name: None,
            outbound_caller_id_number: None,
            call_timeout: None,
            max_registrations: None,
            do_not_disturb: false,
            forward_all_enabled: false,
            forward_all_destination: None,
            record_inbound: false,
            record_outbound: false,
        };

        let ext: Extension = row.into();
        assert_eq!(ext.number_alias, None);
        assert_eq!(ext.password, "");
        assert_eq!(ext.call_timeout, 30);
        assert_eq!(ext.max_registrations, 1);
        assert_eq!(ext.context(), "acme.example.com");
    }
}
