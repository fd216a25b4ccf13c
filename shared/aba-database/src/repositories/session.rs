use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use aba_common::AppError;

use crate::domain::{Session, SessionPatch};
use crate::models::SessionRow;

/// Persistence port for sessions (spec §4.2). Each operation is
/// transactional at the boundary — callers that need a placement and its
/// conflict check to be atomic use `create_checking_conflicts`, which opens
/// its own transaction, grounded in the `docpat` appointment service's
/// `self.pool.begin()` / `check_conflicts(&mut tx, ...)` pattern.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, AppError>;

    async fn find_by_client_id(&self, client_id: Uuid) -> Result<Vec<Session>, AppError>;

    async fn find_by_rbt_id(&self, rbt_id: Uuid) -> Result<Vec<Session>, AppError>;

    async fn find_active_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, AppError>;

    /// Checks for overlapping non-cancelled sessions for either party and,
    /// if none are found, inserts the new session in the same transaction —
    /// the database-level guard against the race described in spec §5.
    async fn create_checking_conflicts(&self, session: Session) -> Result<Session, AppError>;

    async fn update(&self, id: Uuid, patch: SessionPatch) -> Result<Session, AppError>;

    async fn check_conflicts(
        &self,
        client_id: Uuid,
        rbt_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_session_id: Option<Uuid>,
    ) -> Result<Vec<Session>, AppError>;
}

pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE session_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        row.map(Session::try_from).transpose()
    }

    async fn find_by_client_id(&self, client_id: Uuid) -> Result<Vec<Session>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE client_id = $1 ORDER BY start_time",
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn find_by_rbt_id(&self, rbt_id: Uuid) -> Result<Vec<Session>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE rbt_id = $1 ORDER BY start_time",
        )
        .bind(rbt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn find_active_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT * FROM sessions
            WHERE start_time < $2 AND end_time > $1
              AND status NOT IN ('cancelled', 'no_show')
            ORDER BY start_time
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn create_checking_conflicts(&self, session: Session) -> Result<Session, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let conflicts: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sessions
            WHERE (rbt_id = $1 OR client_id = $2)
              AND status NOT IN ('cancelled', 'no_show')
              AND start_time < $4 AND end_time > $3
            "#,
        )
        .bind(session.rbt_id)
        .bind(session.client_id)
        .bind(session.start_time)
        .bind(session.end_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        if conflicts > 0 {
            return Err(AppError::Conflict(
                "rbt or client already has a session overlapping this time".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO sessions (
                session_id, client_id, rbt_id, start_time, end_time, status,
                location, notes, created_by, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(session.session_id)
        .bind(session.client_id)
        .bind(session.rbt_id)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.status.to_string())
        .bind(&session.location)
        .bind(&session.notes)
        .bind(session.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        Session::try_from(row)
    }

    async fn update(&self, id: Uuid, patch: SessionPatch) -> Result<Session, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            UPDATE sessions SET
                start_time = COALESCE($2, start_time),
                end_time = COALESCE($3, end_time),
                rbt_id = COALESCE($4, rbt_id),
                status = COALESCE($5, status),
                notes = COALESCE($6, notes),
                cancellation_reason = COALESCE($7, cancellation_reason),
                completion_notes = COALESCE($8, completion_notes),
                updated_by = $9,
                updated_at = NOW()
            WHERE session_id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.start_time)
        .bind(patch.end_time)
        .bind(patch.rbt_id)
        .bind(patch.status.map(|s| s.to_string()))
        .bind(patch.notes)
        .bind(patch.cancellation_reason)
        .bind(patch.completion_notes)
        .bind(patch.updated_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;

        Session::try_from(row)
    }

    async fn check_conflicts(
        &self,
        client_id: Uuid,
        rbt_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_session_id: Option<Uuid>,
    ) -> Result<Vec<Session>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT * FROM sessions
            WHERE (rbt_id = $1 OR client_id = $2)
              AND status NOT IN ('cancelled', 'no_show')
              AND start_time < $4 AND end_time > $3
              AND ($5::uuid IS NULL OR session_id != $5)
            "#,
        )
        .bind(rbt_id)
        .bind(client_id)
        .bind(start)
        .bind(end)
        .bind(exclude_session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(Session::try_from).collect()
    }
}
