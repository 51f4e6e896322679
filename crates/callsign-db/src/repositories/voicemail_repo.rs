//! Voicemail repository implementation
//!
//! Saving a message and bumping the box counter happen in one transaction.

use callsign_core::{
    models::{NewVoicemailMessage, VoicemailBox},
    traits::VoicemailRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of VoicemailRepository
pub struct PgVoicemailRepository {
    pool: PgPool,
}

impl PgVoicemailRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoicemailRepository for PgVoicemailRepository {
    #[instrument(skip(self))]
    async fn find_box(&self, tenant_id: i64, extension: &str) -> AppResult<Option<VoicemailBox>> {
        debug!("Finding voicemail box {} for tenant {}", extension, tenant_id);

        let row = sqlx::query_as::<sqlx::Postgres, VoicemailBoxRow>(
            r#"
            SELECT
                id, tenant_id, extension, enabled, greeting_path,
                max_messages, max_message_secs, skip_instructions,
                new_messages, saved_messages
            FROM voicemail_boxes
            WHERE tenant_id = $1 AND extension = $2
              AND enabled = true AND deleted_at IS NULL
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(extension)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding voicemail box {}: {}", extension, e);
            AppError::Database(format!("Failed to find voicemail box: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn unread_count(&self, domain: &str, user: &str) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(m.id)
            FROM voicemail_messages m
            JOIN voicemail_boxes b ON b.id = m.box_id
            JOIN tenants t ON t.id = b.tenant_id
            WHERE t.domain = $1 AND b.extension = $2
              AND m.is_new = true
              AND m.deleted_at IS NULL AND b.deleted_at IS NULL
            "#,
        )
        .bind(domain)
        .bind(user)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting voicemail for {}@{}: {}", user, domain, e);
            AppError::Database(format!("Failed to count voicemail: {}", e))
        })?;

        Ok(count.0)
    }

    #[instrument(skip(self, message), fields(box_id = message.box_id))]
    async fn save_message(&self, message: &NewVoicemailMessage) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin voicemail transaction: {}", e);
            AppError::Database(format!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO voicemail_messages (
                uuid, box_id, tenant_id, caller_id_name, caller_id_number,
                duration, file_path, file_size, recorded_at, is_new,
                channel_uuid, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, true, $10, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(message.box_id)
        .bind(message.tenant_id)
        .bind(&message.caller_id_name)
        .bind(&message.caller_id_number)
        .bind(message.duration_secs)
        .bind(&message.file_path)
        .bind(message.file_size)
        .bind(message.recorded_at)
        .bind(&message.channel_uuid)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error saving voicemail message: {}", e);
            AppError::Database(format!("Failed to save voicemail message: {}", e))
        })?;

        sqlx::query(
            r#"
            UPDATE voicemail_boxes
            SET new_messages = new_messages + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(message.box_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error bumping voicemail counter: {}", e);
            AppError::Database(format!("Failed to update voicemail box: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit voicemail transaction: {}", e);
            AppError::Database(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            box_id = message.box_id,
            duration = message.duration_secs,
            "Voicemail message saved"
        );
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VoicemailBoxRow {
    id: i64,
    tenant_id: i64,
    extension: String,
    enabled: bool,
    greeting_path: Option<String>,
    max_messages: i32,
    max_message_secs: i32,
    skip_instructions: bool,
    new_messages: i32,
    saved_messages: i32,
}

impl From<VoicemailBoxRow> for VoicemailBox {
    fn from(row: VoicemailBoxRow) -> Self {
        VoicemailBox {
            id: row.id,
            tenant_id: row.tenant_id,
            extension: row.extension,
            enabled: row.enabled,
            greeting_path: row.greeting_path.filter(|p| !p.is_empty()),
            max_messages: row.max_messages,
            max_message_secs: row.max_message_secs,
            skip_instructions: row.skip_instructions,
            new_messages: row.new_messages,
            saved_messages: row.saved_messages,
        }
    }
}
