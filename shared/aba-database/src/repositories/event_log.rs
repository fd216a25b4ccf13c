use async_trait::async_trait;
use sqlx::PgPool;

use aba_common::AppError;

use crate::domain::{EventLogFilter, NewScheduleEvent, ScheduleEvent};
use crate::models::ScheduleEventRow;

/// Persistence port for the append-only schedule-event log (spec §4.11).
/// Writes are idempotent by caller-supplied `event_id`: a duplicate insert
/// is rejected rather than silently accepted, so callers can retry a failed
/// append without double-logging.
#[async_trait]
pub trait EventLogRepository: Send + Sync {
    async fn append(&self, event: NewScheduleEvent) -> Result<ScheduleEvent, AppError>;

    async fn query(&self, filter: EventLogFilter) -> Result<Vec<ScheduleEvent>, AppError>;
}

pub struct PgEventLogRepository {
    pool: PgPool,
}

impl PgEventLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLogRepository for PgEventLogRepository {
    async fn append(&self, event: NewScheduleEvent) -> Result<ScheduleEvent, AppError> {
        let existing: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM schedule_events WHERE event_id = $1)",
        )
        .bind(event.event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if existing {
            return Err(AppError::Conflict(format!(
                "event {} already appended",
                event.event_id
            )));
        }

        let row = sqlx::query_as::<_, ScheduleEventRow>(
            r#"
            INSERT INTO schedule_events (
                event_id, event_type, session_id, rbt_id, client_id,
                old_values, new_values, reason, metadata, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(event.event_id)
        .bind(event.event_type.to_string())
        .bind(event.session_id)
        .bind(event.rbt_id)
        .bind(event.client_id)
        .bind(&event.old_values)
        .bind(&event.new_values)
        .bind(&event.reason)
        .bind(&event.metadata)
        .bind(event.created_by)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        ScheduleEvent::try_from(row)
    }

    async fn query(&self, filter: EventLogFilter) -> Result<Vec<ScheduleEvent>, AppError> {
        let rows = sqlx::query_as::<_, ScheduleEventRow>(
            r#"
            SELECT * FROM schedule_events
            WHERE ($1::text IS NULL OR event_type = $1)
              AND ($2::uuid IS NULL OR session_id = $2)
              AND ($3::uuid IS NULL OR rbt_id = $3)
              AND ($4::uuid IS NULL OR client_id = $4)
              AND ($5::timestamptz IS NULL OR created_at >= $5)
              AND ($6::timestamptz IS NULL OR created_at <= $6)
            ORDER BY created_at
            "#,
        )
        .bind(filter.event_type.map(|t| t.to_string()))
        .bind(filter.session_id)
        .bind(filter.rbt_id)
        .bind(filter.client_id)
        .bind(filter.since)
        .bind(filter.until)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(ScheduleEvent::try_from).collect()
    }
}
