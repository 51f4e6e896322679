//! Feature code repository implementation
//!
//! Candidates come back in evaluation order: ascending `order`, and on a tie
//! the tenant's own code before a global one. Soft-deleted and disabled rows
//! never leave the database.

use callsign_core::{
    models::{FeatureAction, FeatureCode},
    traits::FeatureCodeRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

const CANDIDATE_COLUMNS: &str = r#"
    fc.id, fc.uuid, fc.tenant_id, fc.code, fc.code_regex, fc.name, fc.description,
    fc.action, fc.extension, fc."order" AS sort_order, fc.is_global, fc.context,
    fc.action_data, fc.action_params, fc.park_lot_name, fc.park_timeout,
    fc.park_announce, fc.webhook_url, fc.webhook_method, fc.lua_script,
    fc.transfer_dest, fc.transfer_context, fc.group_id, fc.blf_hint, fc.enabled
"#;

const CANDIDATE_ORDER: &str = r#"ORDER BY fc."order" ASC, (fc.tenant_id IS NULL) ASC, fc.id ASC"#;

/// PostgreSQL implementation of FeatureCodeRepository
pub struct PgFeatureCodeRepository {
    pool: PgPool,
}

impl PgFeatureCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeatureCodeRepository for PgFeatureCodeRepository {
    #[instrument(skip(self))]
    async fn find_candidates(&self, tenant_id: i64) -> AppResult<Vec<FeatureCode>> {
        debug!("Loading feature codes for tenant {}", tenant_id);

        let sql = format!(
            r#"
            SELECT {CANDIDATE_COLUMNS}
            FROM feature_codes fc
            WHERE fc.enabled = true
              AND fc.deleted_at IS NULL
              AND (fc.tenant_id = $1 OR fc.tenant_id IS NULL OR fc.is_global = true)
            {CANDIDATE_ORDER}
            "#
        );
        let rows = sqlx::query_as::<sqlx::Postgres, FeatureCodeRow>(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error loading feature codes for tenant {}: {}", tenant_id, e);
                AppError::Database(format!("Failed to load feature codes: {}", e))
            })?;

        Ok(into_candidates(rows))
    }

    #[instrument(skip(self))]
    async fn find_candidates_for_domain(&self, domain: &str) -> AppResult<Vec<FeatureCode>> {
        debug!("Loading feature codes for domain {}", domain);

        let sql = format!(
            r#"
            SELECT {CANDIDATE_COLUMNS}
            FROM feature_codes fc
            WHERE fc.enabled = true
              AND fc.deleted_at IS NULL
              AND (
                fc.tenant_id = (
                    SELECT t.id FROM tenants t
                    WHERE t.domain = $1 AND t.deleted_at IS NULL
                    LIMIT 1
                )
                OR fc.tenant_id IS NULL
                OR fc.is_global = true
              )
            {CANDIDATE_ORDER}
            "#
        );
        let rows = sqlx::query_as::<sqlx::Postgres, FeatureCodeRow>(&sql)
            .bind(domain)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error loading feature codes for {}: {}", domain, e);
                AppError::Database(format!("Failed to load feature codes: {}", e))
            })?;

        Ok(into_candidates(rows))
    }
}

/// Rows with an action this build does not know are skipped, not fatal
fn into_candidates(rows: Vec<FeatureCodeRow>) -> Vec<FeatureCode> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            let code = FeatureCode::try_from(row);
            if let Err(ref action) = code {
                warn!(id, action = %action, "Skipping feature code with unknown action");
            }
            code.ok()
        })
        .collect()
}

/// `action_params` is stored as a JSON object of strings
fn parse_params(raw: Option<&str>) -> HashMap<String, String> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return HashMap::new();
    };
    match serde_json::from_str::<HashMap<String, serde_json::Value>>(raw) {
        Ok(map) => map
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed action_params");
            HashMap::new()
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FeatureCodeRow {
    id: i64,
    uuid: Uuid,
    tenant_id: Option<i64>,
    code: String,
    code_regex: Option<String>,
    name: String,
    description: Option<String>,
    action: String,
    extension: Option<String>,
    sort_order: i32,
    is_global: bool,
    context: Option<String>,
    action_data: Option<String>,
    action_params: Option<String>,
    park_lot_name: Option<String>,
    park_timeout: Option<i32>,
    park_announce: Option<bool>,
    webhook_url: Option<String>,
    webhook_method: Option<String>,
    lua_script: Option<String>,
    transfer_dest: Option<String>,
    transfer_context: Option<String>,
    group_id: Option<i64>,
    blf_hint: Option<String>,
    enabled: bool,
}

impl TryFrom<FeatureCodeRow> for FeatureCode {
    /// The unrecognized action name
    type Error = String;

    fn try_from(row: FeatureCodeRow) -> Result<Self, Self::Error> {
        let action = FeatureAction::from_str(&row.action).ok_or_else(|| row.action.clone())?;
        let defaults = FeatureCode::default();
        Ok(FeatureCode {
            id: row.id,
            uuid: row.uuid,
            tenant_id: row.tenant_id,
            code: row.code,
            code_regex: row.code_regex,
            name: row.name,
            description: row.description,
            action,
            extension: row.extension,
            order: row.sort_order,
            is_global: row.is_global,
            context: row.context,
            action_data: row.action_data,
            action_params: parse_params(row.action_params.as_deref()),
            park_lot_name: row.park_lot_name,
            park_timeout: row.park_timeout.unwrap_or(defaults.park_timeout),
            park_announce: row.park_announce.unwrap_or(defaults.park_announce),
            webhook_url: row.webhook_url,
            webhook_method: row.webhook_method,
            lua_script: row.lua_script,
            transfer_dest: row.transfer_dest,
            transfer_context: row.transfer_context,
            group_id: row.group_id,
            blf_hint: row.blf_hint,
            enabled: row.enabled,
        })
    }
}
