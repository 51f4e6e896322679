//! Parking slot repository implementation

use callsign_core::{models::ParkingSlot, traits::ParkingRepository, AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const SLOT_COLUMNS: &str = r#"
    id, tenant_id, domain, lot_name, slot_number, is_occupied, call_uuid,
    caller_id_number, caller_id_name, parked_by, parked_at
"#;

/// PostgreSQL implementation of ParkingRepository
pub struct PgParkingRepository {
    pool: PgPool,
}

impl PgParkingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParkingRepository for PgParkingRepository {
    #[instrument(skip(self))]
    async fn first_free(&self, tenant_id: i64, lot: &str) -> AppResult<Option<ParkingSlot>> {
        let sql = format!(
            r#"
            SELECT {SLOT_COLUMNS}
            FROM park_slots
            WHERE tenant_id = $1 AND lot_name = $2
              AND is_occupied = false AND deleted_at IS NULL
            ORDER BY slot_number ASC
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<sqlx::Postgres, ParkingSlotRow>(&sql)
            .bind(tenant_id)
            .bind(lot)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding free slot in {}: {}", lot, e);
                AppError::Database(format!("Failed to find parking slot: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_slot(
        &self,
        tenant_id: i64,
        lot: &str,
        number: i32,
    ) -> AppResult<Option<ParkingSlot>> {
        let sql = format!(
            r#"
            SELECT {SLOT_COLUMNS}
            FROM park_slots
            WHERE tenant_id = $1 AND lot_name = $2 AND slot_number = $3
              AND deleted_at IS NULL
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<sqlx::Postgres, ParkingSlotRow>(&sql)
            .bind(tenant_id)
            .bind(lot)
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding slot {} in {}: {}", number, lot, e);
                AppError::Database(format!("Failed to find parking slot: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, slot), fields(lot = %slot.lot_name, number = slot.slot_number))]
    async fn create_slot(&self, slot: &ParkingSlot) -> AppResult<ParkingSlot> {
        debug!("Creating parking slot on demand");

        let sql = format!(
            r#"
            INSERT INTO park_slots (
                tenant_id, domain, lot_name, slot_number, is_occupied, blf_state,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, false, 'terminated', NOW(), NOW())
            RETURNING {SLOT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<sqlx::Postgres, ParkingSlotRow>(&sql)
            .bind(slot.tenant_id)
            .bind(&slot.domain)
            .bind(&slot.lot_name)
            .bind(slot.slot_number)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating parking slot: {}", e);
                AppError::Database(format!("Failed to create parking slot: {}", e))
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn occupy(
        &self,
        slot_id: i64,
        call_uuid: &str,
        caller_id: &str,
        caller_name: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE park_slots
            SET is_occupied = true, call_uuid = $2,
                caller_id_number = $3, caller_id_name = $4, parked_by = $3,
                parked_at = NOW(), blf_state = 'confirmed', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(slot_id)
        .bind(call_uuid)
        .bind(caller_id)
        .bind(caller_name)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error occupying slot {}: {}", slot_id, e);
            AppError::Database(format!("Failed to occupy parking slot: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn release(&self, slot_id: i64) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE park_slots
            SET is_occupied = false, call_uuid = NULL,
                caller_id_number = NULL, caller_id_name = NULL, parked_by = NULL,
                parked_at = NULL, blf_state = 'terminated', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(slot_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error releasing slot {}: {}", slot_id, e);
            AppError::Database(format!("Failed to release parking slot: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn release_held(&self, slot_id: i64, call_uuid: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE park_slots
            SET is_occupied = false, call_uuid = NULL,
                caller_id_number = NULL, caller_id_name = NULL, parked_by = NULL,
                parked_at = NULL, blf_state = 'terminated', updated_at = NOW()
            WHERE id = $1 AND call_uuid = $2
            "#,
        )
        .bind(slot_id)
        .bind(call_uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error releasing slot {}: {}", slot_id, e);
            AppError::Database(format!("Failed to release parking slot: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ParkingSlotRow {
    id: i64,
    tenant_id: i64,
    domain: Option<String>,
    lot_name: String,
    slot_number: i32,
    is_occupied: bool,
    call_uuid: Option<String>,
    caller_id_number: Option<String>,
    caller_id_name: Option<String>,
    parked_by: Option<String>,
    parked_at: Option<DateTime<Utc>>,
}

impl From<ParkingSlotRow> for ParkingSlot {
    fn from(row: ParkingSlotRow) -> Self {
        ParkingSlot {
            id: row.id,
            tenant_id: row.tenant_id,
            domain: row.domain.unwrap_or_default(),
            lot_name: row.lot_name,
            slot_number: row.slot_number,
            is_occupied: row.is_occupied,
            parked_uuid: row.call_uuid,
            parked_caller_id: row.caller_id_number,
            parked_caller_name: row.caller_id_name,
            parked_by: row.parked_by,
            parked_at: row.parked_at,
        }
    }
}
