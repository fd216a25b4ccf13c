use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use aba_common::AppError;

use crate::domain::Rbt;
use crate::models::{RbtProfileRow, UserRow};

#[async_trait]
pub trait RbtRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Rbt>, AppError>;

    async fn find_active(&self) -> Result<Vec<Rbt>, AppError>;

    async fn find_by_qualification(&self, qualification: &str) -> Result<Vec<Rbt>, AppError>;

    /// Intersects active employment, active availability on the slot's
    /// weekday, and absence of session conflicts (spec §4.2 guarantee).
    async fn find_available_for_time_slot(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_ids: &[Uuid],
    ) -> Result<Vec<Rbt>, AppError>;
}

pub struct PgRbtRepository {
    pool: PgPool,
}

impl PgRbtRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn join_row(&self, user: UserRow) -> Result<Option<Rbt>, AppError> {
        let profile = sqlx::query_as::<_, RbtProfileRow>(
            "SELECT * FROM rbt_profiles WHERE user_id = $1",
        )
        .bind(user.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(profile.map(|p| Rbt::from_rows(user, p)))
    }
}

#[async_trait]
impl RbtRepository for PgRbtRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Rbt>, AppError> {
        let user = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE user_id = $1 AND role = 'rbt'",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        match user {
            Some(u) => self.join_row(u).await,
            None => Ok(None),
        }
    }

    async fn find_active(&self) -> Result<Vec<Rbt>, AppError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE role = 'rbt' AND active = true",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let mut rbts = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(rbt) = self.join_row(row).await? {
                rbts.push(rbt);
            }
        }
        Ok(rbts)
    }

    async fn find_by_qualification(&self, qualification: &str) -> Result<Vec<Rbt>, AppError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.* FROM users u
            JOIN rbt_profiles p ON p.user_id = u.user_id
            WHERE u.role = 'rbt' AND u.active = true AND $1 = ANY(p.qualifications)
            "#,
        )
        .bind(qualification)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let mut rbts = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(rbt) = self.join_row(row).await? {
                rbts.push(rbt);
            }
        }
        Ok(rbts)
    }

    async fn find_available_for_time_slot(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_ids: &[Uuid],
    ) -> Result<Vec<Rbt>, AppError> {
        let weekday = start.format("%u").to_string().parse::<i16>().unwrap_or(1);

        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT DISTINCT u.* FROM users u
            JOIN rbt_profiles p ON p.user_id = u.user_id
            JOIN availability_slots a ON a.rbt_id = u.user_id
            WHERE u.role = 'rbt' AND u.active = true AND p.termination_date IS NULL
              AND a.active = true AND a.day_of_week = $1
              AND a.start_time <= $2::time AND a.end_time >= $3::time
              AND NOT (u.user_id = ANY($4))
              AND NOT EXISTS (
                  SELECT 1 FROM sessions s
                  WHERE s.rbt_id = u.user_id
                    AND s.status NOT IN ('cancelled', 'no_show')
                    AND s.start_time < $6 AND s.end_time > $5
              )
            "#,
        )
        .bind(weekday)
        .bind(start.time())
        .bind(end.time())
        .bind(exclude_ids)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let mut rbts = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(rbt) = self.join_row(row).await? {
                rbts.push(rbt);
            }
        }
        Ok(rbts)
    }
}
