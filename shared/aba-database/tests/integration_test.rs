use aba_common::DatabaseConfig;
use aba_database::{create_pool, run_migrations};
use sqlx::Row;

#[tokio::test]
async fn test_database_connection_and_migrations() {
    if std::env::var("DATABASE_URL").is_err() {
        println!("Skipping database test - DATABASE_URL not set");
        return;
    }

    let config = DatabaseConfig {
        host: "localhost".to_string(),
        port: 5432,
        username: "aba_scheduling_user".to_string(),
        password: "aba_scheduling_password".to_string(),
        database: "aba_scheduling_test".to_string(),
        max_connections: 5,
    };

    let admin_config = DatabaseConfig {
        database: "postgres".to_string(),
        ..config.clone()
    };

    let admin_pool = create_pool(&admin_config).await.expect("failed to connect to admin database");

    sqlx::query(&format!("DROP DATABASE IF EXISTS {}", config.database))
        .execute(&admin_pool)
        .await
        .expect("failed to drop test database");

    sqlx::query(&format!("CREATE DATABASE {}", config.database))
        .execute(&admin_pool)
        .await
        .expect("failed to create test database");

    let pool = create_pool(&config).await.expect("failed to connect to test database");

    run_migrations(&pool).await.expect("failed to run migrations");

    let table_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'public'",
    )
    .fetch_one(&pool)
    .await
    .expect("failed to count tables");

    assert!(table_count > 0, "no tables were created");

    let user_id = uuid::Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (user_id, email, given_name, family_name, role, active) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(user_id)
    .bind("test.rbt@example.com")
    .bind("Test")
    .bind("Rbt")
    .bind("rbt")
    .bind(true)
    .execute(&pool)
    .await
    .expect("failed to insert test user");

    let row = sqlx::query("SELECT given_name FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .expect("failed to query test user");

    let given_name: String = row.get("given_name");
    assert_eq!(given_name, "Test");

    drop(pool);
    sqlx::query(&format!("DROP DATABASE {}", config.database))
        .execute(&admin_pool)
        .await
        .expect("failed to clean up test database");
}
