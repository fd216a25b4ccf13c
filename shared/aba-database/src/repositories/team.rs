use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use aba_common::AppError;

use crate::domain::Team;
use crate::models::TeamRow;

#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Team>, AppError>;

    async fn find_active_by_client_id(&self, client_id: Uuid) -> Result<Option<Team>, AppError>;

    async fn find_by_rbt_id(&self, rbt_id: Uuid) -> Result<Vec<Team>, AppError>;

    async fn find_by_primary_rbt_id(&self, rbt_id: Uuid) -> Result<Vec<Team>, AppError>;

    async fn create(
        &self,
        client_id: Uuid,
        rbt_ids: Vec<Uuid>,
        primary_rbt_id: Uuid,
        effective_date: DateTime<Utc>,
    ) -> Result<Team, AppError>;

    async fn update(&self, team: Team) -> Result<Team, AppError>;

    async fn end_team(&self, team_id: Uuid, end_date: DateTime<Utc>) -> Result<Team, AppError>;

    async fn add_rbt(&self, team_id: Uuid, rbt_id: Uuid) -> Result<Team, AppError>;

    async fn remove_rbt(&self, team_id: Uuid, rbt_id: Uuid) -> Result<Team, AppError>;

    async fn change_primary_rbt(&self, team_id: Uuid, rbt_id: Uuid) -> Result<Team, AppError>;
}

pub struct PgTeamRepository {
    pool: PgPool,
}

impl PgTeamRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, team_id: Uuid) -> Result<Team, AppError> {
        let row = sqlx::query_as::<_, TeamRow>("SELECT * FROM teams WHERE team_id = $1")
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound(format!("team {team_id} not found")))?;

        Ok(row.into())
    }
}

#[async_trait]
impl TeamRepository for PgTeamRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Team>, AppError> {
        let row = sqlx::query_as::<_, TeamRow>("SELECT * FROM teams WHERE team_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row.map(Team::from))
    }

    async fn find_active_by_client_id(&self, client_id: Uuid) -> Result<Option<Team>, AppError> {
        let row = sqlx::query_as::<_, TeamRow>(
            "SELECT * FROM teams WHERE client_id = $1 AND active = true",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(Team::from))
    }

    async fn find_by_rbt_id(&self, rbt_id: Uuid) -> Result<Vec<Team>, AppError> {
        let rows = sqlx::query_as::<_, TeamRow>(
            "SELECT * FROM teams WHERE $1 = ANY(rbt_ids)",
        )
        .bind(rbt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(Team::from).collect())
    }

    async fn find_by_primary_rbt_id(&self, rbt_id: Uuid) -> Result<Vec<Team>, AppError> {
        let rows = sqlx::query_as::<_, TeamRow>("SELECT * FROM teams WHERE primary_rbt_id = $1")
            .bind(rbt_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(Team::from).collect())
    }

    async fn create(
        &self,
        client_id: Uuid,
        rbt_ids: Vec<Uuid>,
        primary_rbt_id: Uuid,
        effective_date: DateTime<Utc>,
    ) -> Result<Team, AppError> {
        let row = sqlx::query_as::<_, TeamRow>(
            r#"
            INSERT INTO teams (team_id, client_id, rbt_ids, primary_rbt_id, effective_date, active)
            VALUES ($1, $2, $3, $4, $5, true)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(&rbt_ids)
        .bind(primary_rbt_id)
        .bind(effective_date)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.into())
    }

    async fn update(&self, team: Team) -> Result<Team, AppError> {
        let row = sqlx::query_as::<_, TeamRow>(
            r#"
            UPDATE teams SET
                rbt_ids = $2, primary_rbt_id = $3, active = $4, end_date = $5, updated_at = NOW()
            WHERE team_id = $1
            RETURNING *
            "#,
        )
        .bind(team.team_id)
        .bind(&team.rbt_ids)
        .bind(team.primary_rbt_id)
        .bind(team.active)
        .bind(team.end_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("team {} not found", team.team_id)))?;

        Ok(row.into())
    }

    async fn end_team(&self, team_id: Uuid, end_date: DateTime<Utc>) -> Result<Team, AppError> {
        let row = sqlx::query_as::<_, TeamRow>(
            r#"
            UPDATE teams SET end_date = $2, active = false, updated_at = NOW()
            WHERE team_id = $1
            RETURNING *
            "#,
        )
        .bind(team_id)
        .bind(end_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("team {team_id} not found")))?;

        Ok(row.into())
    }

    async fn add_rbt(&self, team_id: Uuid, rbt_id: Uuid) -> Result<Team, AppError> {
        let mut team = self.fetch(team_id).await?;
        if team.rbt_ids.contains(&rbt_id) {
            return Err(AppError::Conflict(format!(
                "rbt {rbt_id} is already a member of team {team_id}"
            )));
        }
        team.rbt_ids.push(rbt_id);
        self.update(team).await
    }

    async fn remove_rbt(&self, team_id: Uuid, rbt_id: Uuid) -> Result<Team, AppError> {
        let mut team = self.fetch(team_id).await?;
        if team.primary_rbt_id == rbt_id {
            return Err(AppError::Conflict(
                "cannot remove the primary rbt from a team".to_string(),
            ));
        }
        team.rbt_ids.retain(|id| *id != rbt_id);
        self.update(team).await
    }

    async fn change_primary_rbt(&self, team_id: Uuid, rbt_id: Uuid) -> Result<Team, AppError> {
        let mut team = self.fetch(team_id).await?;
        if !team.rbt_ids.contains(&rbt_id) {
            return Err(AppError::Conflict(format!(
                "rbt {rbt_id} must already be a member before becoming primary"
            )));
        }
        team.primary_rbt_id = rbt_id;
        self.update(team).await
    }
}
