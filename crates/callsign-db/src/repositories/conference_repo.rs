//! Conference session repository implementation
//!
//! Session counters (`member_count`, `max_members`, `total_joins`) are kept in
//! step with the participant rows inside the same transaction.

use callsign_core::{
    models::{ConferenceParticipant, ConferenceSession, ParticipantFlag},
    traits::ConferenceRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of ConferenceRepository
pub struct PgConferenceRepository {
    pool: PgPool,
}

impl PgConferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| {
            error!("Failed to begin conference transaction: {}", e);
            AppError::Database(format!("Failed to begin transaction: {}", e))
        })
    }
}

/// Room number inside a `domain-number@profile` conference name
fn room_number(conference_name: &str) -> Option<&str> {
    let room = conference_name
        .split_once('@')
        .map_or(conference_name, |(room, _)| room);
    room.rsplit_once('-').map(|(_, number)| number)
}

/// Recount active participants and fold the result into the session row
async fn sync_member_count(
    tx: &mut Transaction<'static, Postgres>,
    session_id: i64,
    joined: bool,
) -> AppResult<i64> {
    let (active,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM conference_participants
        WHERE session_id = $1 AND leave_time IS NULL
        "#,
    )
    .bind(session_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        error!("Database error counting participants of {}: {}", session_id, e);
        AppError::Database(format!("Failed to count participants: {}", e))
    })?;

    sqlx::query(
        r#"
        UPDATE conference_sessions
        SET member_count = $2,
            max_members = GREATEST(max_members, $2),
            total_joins = total_joins + $3,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(active as i32)
    .bind(i32::from(joined))
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        error!("Database error updating session {}: {}", session_id, e);
        AppError::Database(format!("Failed to update conference session: {}", e))
    })?;

    Ok(active)
}

#[async_trait]
impl ConferenceRepository for PgConferenceRepository {
    #[instrument(skip(self, session), fields(conference = %session.conference_name))]
    async fn create_session(&self, session: &ConferenceSession) -> AppResult<ConferenceSession> {
        debug!("Opening conference session");

        let row = sqlx::query_as::<sqlx::Postgres, ConferenceSessionRow>(
            r#"
            INSERT INTO conference_sessions (
                uuid, conference_id, tenant_id, conference_name, start_time,
                member_count, max_members, total_joins, locked, recording,
                created_at, updated_at
            )
            VALUES (
                $1,
                COALESCE((
                    SELECT c.id FROM conferences c
                    WHERE c.tenant_id = $2 AND c.extension = $4 AND c.deleted_at IS NULL
                    LIMIT 1
                ), 0),
                $2, $3, $5, 0, 0, 0, false, false, NOW(), NOW()
            )
            RETURNING
                id, tenant_id, conference_name, start_time, end_time,
                member_count, max_members, total_joins, locked, recording, recording_path
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session.tenant_id)
        .bind(&session.conference_name)
        .bind(room_number(&session.conference_name))
        .bind(session.start_time)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating conference session: {}", e);
            AppError::Database(format!("Failed to create conference session: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, participant), fields(session_id = participant.session_id, uuid = %participant.uuid))]
    async fn add_participant(&self, participant: &ConferenceParticipant) -> AppResult<i64> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO conference_participants (
                session_id, tenant_id, member_id, uuid, caller_id_name, caller_id_number,
                join_time, muted, talking, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            "#,
        )
        .bind(participant.session_id)
        .bind(participant.tenant_id)
        .bind(participant.member_id)
        .bind(&participant.uuid)
        .bind(&participant.caller_id_name)
        .bind(&participant.caller_id_number)
        .bind(participant.join_time)
        .bind(participant.muted)
        .bind(participant.talking)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error adding participant: {}", e);
            AppError::Database(format!("Failed to add participant: {}", e))
        })?;

        let active = sync_member_count(&mut tx, participant.session_id, true).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit participant join: {}", e);
            AppError::Database(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(active)
    }

    #[instrument(skip(self))]
    async fn participant_left(&self, session_id: i64, uuid: &str) -> AppResult<i64> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            UPDATE conference_participants
            SET leave_time = NOW(), talking = false, updated_at = NOW()
            WHERE session_id = $1 AND uuid = $2 AND leave_time IS NULL
            "#,
        )
        .bind(session_id)
        .bind(uuid)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error marking participant {} gone: {}", uuid, e);
            AppError::Database(format!("Failed to update participant: {}", e))
        })?;

        let active = sync_member_count(&mut tx, session_id, false).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit participant leave: {}", e);
            AppError::Database(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(active)
    }

    #[instrument(skip(self))]
    async fn set_participant_flag(
        &self,
        session_id: i64,
        uuid: &str,
        flag: ParticipantFlag,
        value: bool,
    ) -> AppResult<()> {
        let sql = format!(
            r#"
            UPDATE conference_participants
            SET {} = $3, updated_at = NOW()
            WHERE session_id = $1 AND uuid = $2 AND leave_time IS NULL
            "#,
            flag.column()
        );
        sqlx::query(&sql)
            .bind(session_id)
            .bind(uuid)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error setting {} on {}: {}", flag.column(), uuid, e);
                AppError::Database(format!("Failed to update participant: {}", e))
            })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_locked(&self, session_id: i64, locked: bool) -> AppResult<()> {
        sqlx::query("UPDATE conference_sessions SET locked = $2, updated_at = NOW() WHERE id = $1")
            .bind(session_id)
            .bind(locked)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error locking session {}: {}", session_id, e);
                AppError::Database(format!("Failed to update conference session: {}", e))
            })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_recording(
        &self,
        session_id: i64,
        recording: bool,
        path: Option<String>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE conference_sessions
            SET recording = $2,
                recording_path = COALESCE($3, recording_path),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(recording)
        .bind(path)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating recording of {}: {}", session_id, e);
            AppError::Database(format!("Failed to update conference session: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn end_session(&self, session_id: i64) -> AppResult<()> {
        debug!("Closing conference session {}", session_id);

        sqlx::query(
            r#"
            UPDATE conference_sessions
            SET end_time = NOW(), member_count = 0, recording = false, updated_at = NOW()
            WHERE id = $1 AND end_time IS NULL
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error ending session {}: {}", session_id, e);
            AppError::Database(format!("Failed to end conference session: {}", e))
        })?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConferenceSessionRow {
    id: i64,
    tenant_id: i64,
    conference_name: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    member_count: i32,
    max_members: i32,
    total_joins: i32,
    locked: bool,
    recording: bool,
    recording_path: Option<String>,
}

impl From<ConferenceSessionRow> for ConferenceSession {
    fn from(row: ConferenceSessionRow) -> Self {
        ConferenceSession {
            id: row.id,
            tenant_id: row.tenant_id,
            conference_name: row.conference_name,
            start_time: row.start_time,
            end_time: row.end_time,
            member_count: row.member_count,
            max_members: row.max_members,
            total_joins: row.total_joins,
            locked: row.locked,
            recording: row.recording,
            recording_path: row.recording_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_number() {
        assert_eq!(room_number("acme.example.com-3000@default"), Some("3000"));
        assert_eq!(room_number("my-tenant.example.com-42@wideband"), Some("42"));
        assert_eq!(room_number("lobby"), None);
    }
}
