use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use aba_common::AppError;

use crate::domain::AvailabilitySlot;
use crate::models::AvailabilitySlotRow;

#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn find_by_rbt(&self, rbt_id: Uuid) -> Result<Vec<AvailabilitySlot>, AppError>;
}

pub struct PgAvailabilityRepository {
    pool: PgPool,
}

impl PgAvailabilityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AvailabilityRepository for PgAvailabilityRepository {
    async fn find_by_rbt(&self, rbt_id: Uuid) -> Result<Vec<AvailabilitySlot>, AppError> {
        let rows = sqlx::query_as::<_, AvailabilitySlotRow>(
            "SELECT * FROM availability_slots WHERE rbt_id = $1 AND active = true ORDER BY day_of_week, start_time",
        )
        .bind(rbt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(AvailabilitySlot::from).collect())
    }
}
