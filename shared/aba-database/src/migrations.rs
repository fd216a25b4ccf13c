use sqlx::PgPool;
use uuid::Uuid;
use aba_common::AppError;

pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_all_migrations(&self) -> Result<(), AppError> {
        tracing::info!("Starting database migrations...");
        
        let migrator = sqlx::migrate!("./migrations");
        migrator.run(&self.pool)
            .await
            .map_err(AppError::Database)?;
        
        tracing::info!("All migrations completed successfully");
        Ok(())
    }

    pub async fn check_migration_status(&self) -> Result<MigrationStatus, AppError> {
        let migrator = sqlx::migrate!("./migrations");
        let applied = migrator.get_applied_migrations(&self.pool)
            .await
            .map_err(AppError::Database)?;
        
        let total_migrations = migrator.migrations.len();
        let applied_count = applied.len();
        let pending_count = total_migrations - applied_count;

        Ok(MigrationStatus {
            total: total_migrations,
            applied: applied_count,
            pending: pending_count,
            is_up_to_date: pending_count == 0,
        })
    }

    pub async fn create_readonly_permissions(&self) -> Result<(), AppError> {
        // Grant read-only permissions to the reporting role
        let queries = vec![
            "GRANT USAGE ON SCHEMA public TO aba_readonly;",
            "GRANT SELECT ON ALL TABLES IN SCHEMA public TO aba_readonly;",
            "ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT SELECT ON TABLES TO aba_readonly;",
        ];

        for query in queries {
            sqlx::query(query)
                .execute(&self.pool)
                .await
                .map_err(AppError::Database)?;
        }

        tracing::info!("Read-only permissions granted");
        Ok(())
    }

    /// Seeds the first admin user. Credentials are issued out of band by
    /// whatever identity provider fronts this service (out of scope, spec
    /// §1) — this only creates the row the scheduling core needs to
    /// attribute bootstrap actions to.
    pub async fn seed_initial_data(&self) -> Result<(), AppError> {
        let admin_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)"
        )
        .bind("admin@aba-scheduling.local")
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if !admin_exists {
            sqlx::query(
                r#"
                INSERT INTO users (user_id, email, given_name, family_name, role, active)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#
            )
            .bind(Uuid::new_v4())
            .bind("admin@aba-scheduling.local")
            .bind("System")
            .bind("Administrator")
            .bind("admin")
            .bind(true)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

            tracing::info!("Admin user created");
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct MigrationStatus {
    pub total: usize,
    pub applied: usize,
    pub pending: usize,
    pub is_up_to_date: bool,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Migrations: {}/{} applied, {} pending",
            self.applied, self.total, self.pending
        )
    }
}