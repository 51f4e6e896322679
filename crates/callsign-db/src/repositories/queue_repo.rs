//! Queue repository implementation

use callsign_core::{
    models::{AgentStatus, Queue, QueueAgent},
    traits::QueueRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};

/// PostgreSQL implementation of QueueRepository
pub struct PgQueueRepository {
    pool: PgPool,
}

impl PgQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueRepository for PgQueueRepository {
    #[instrument(skip(self))]
    async fn find_queue(&self, tenant_id: i64, name_or_ext: &str) -> AppResult<Option<Queue>> {
        let row = sqlx::query_as::<sqlx::Postgres, QueueRow>(
            r#"
            SELECT id, tenant_id, name, extension, strategy, announce_sound, enabled
            FROM queues
            WHERE tenant_id = $1 AND (name = $2 OR extension = $2)
              AND enabled = true AND deleted_at IS NULL
            ORDER BY (name = $2) DESC, id ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(name_or_ext)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding queue {}: {}", name_or_ext, e);
            AppError::Database(format!("Failed to find queue: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_queue_by_id(&self, id: i64) -> AppResult<Option<Queue>> {
        let row = sqlx::query_as::<sqlx::Postgres, QueueRow>(
            r#"
            SELECT id, tenant_id, name, extension, strategy, announce_sound, enabled
            FROM queues
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding queue {}: {}", id, e);
            AppError::Database(format!("Failed to find queue: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn all_agents(&self) -> AppResult<Vec<QueueAgent>> {
        let rows = sqlx::query_as::<sqlx::Postgres, QueueAgentRow>(
            r#"
            SELECT id, queue_id, tenant_id, agent_name, contact, tier_level, tier_position, status
            FROM queue_agents
            WHERE deleted_at IS NULL
            ORDER BY queue_id ASC, tier_level ASC, tier_position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error loading queue agents: {}", e);
            AppError::Database(format!("Failed to load queue agents: {}", e))
        })?;

        debug!("Loaded {} queue agents", rows.len());
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_agent(&self, id: i64) -> AppResult<Option<QueueAgent>> {
        let row = sqlx::query_as::<sqlx::Postgres, QueueAgentRow>(
            r#"
            SELECT id, queue_id, tenant_id, agent_name, contact, tier_level, tier_position, status
            FROM queue_agents
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding queue agent {}: {}", id, e);
            AppError::Database(format!("Failed to find queue agent: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, agent), fields(queue_id = agent.queue_id, agent = %agent.agent_name))]
    async fn create_agent(&self, agent: &QueueAgent) -> AppResult<QueueAgent> {
        let row = sqlx::query_as::<sqlx::Postgres, QueueAgentRow>(
            r#"
            INSERT INTO queue_agents (
                queue_id, tenant_id, agent_name, contact, tier_level, tier_position,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            RETURNING id, queue_id, tenant_id, agent_name, contact, tier_level, tier_position, status
            "#,
        )
        .bind(agent.queue_id)
        .bind(agent.tenant_id)
        .bind(&agent.agent_name)
        .bind(&agent.contact)
        .bind(agent.tier_level)
        .bind(agent.tier_position)
        .bind(agent.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating queue agent: {}", e);
            AppError::Database(format!("Failed to create queue agent: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn set_agent_status(&self, id: i64, status: AgentStatus) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE queue_agents SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating agent {}: {}", id, e);
            AppError::Database(format!("Failed to update agent status: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Queue agent {}", id)));
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: i64,
    tenant_id: i64,
    name: String,
    extension: Option<String>,
    strategy: Option<String>,
    announce_sound: Option<String>,
    enabled: bool,
}

impl From<QueueRow> for Queue {
    fn from(row: QueueRow) -> Self {
        Queue {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            extension: row.extension,
            strategy: row
                .strategy
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "longest-idle-agent".to_string()),
            announce_sound: row.announce_sound.filter(|s| !s.is_empty()),
            enabled: row.enabled,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QueueAgentRow {
    id: i64,
    queue_id: i64,
    tenant_id: i64,
    agent_name: String,
    contact: Option<String>,
    tier_level: i32,
    tier_position: i32,
    status: Option<String>,
}

impl From<QueueAgentRow> for QueueAgent {
    fn from(row: QueueAgentRow) -> Self {
        let status = match row.status.as_deref() {
            None | Some("") => AgentStatus::default(),
            Some(raw) => AgentStatus::from_str(raw).unwrap_or_else(|| {
                warn!(agent_id = row.id, status = raw, "Unknown agent status, treating as logged out");
                AgentStatus::default()
            }),
        };
        QueueAgent {
            id: row.id,
            queue_id: row.queue_id,
            tenant_id: row.tenant_id,
            agent_name: row.agent_name,
            contact: row.contact.filter(|c| !c.is_empty()),
            tier_level: row.tier_level,
            tier_position: row.tier_position,
            status,
        }
    }
}
