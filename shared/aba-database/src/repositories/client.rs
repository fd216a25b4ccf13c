use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use aba_common::AppError;

use crate::domain::Client;
use crate::models::{ClientProfileRow, UserRow};

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Client>, AppError>;
}

pub struct PgClientRepository {
    pool: PgPool,
}

impl PgClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Client>, AppError> {
        let user = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE user_id = $1 AND role = 'client_family'",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let Some(user) = user else {
            return Ok(None);
        };

        let profile = sqlx::query_as::<_, ClientProfileRow>(
            "SELECT * FROM client_profiles WHERE user_id = $1",
        )
        .bind(user.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(profile.map(|p| Client::from_rows(user, p)))
    }
}
