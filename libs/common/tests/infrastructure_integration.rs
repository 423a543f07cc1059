//! Integration tests for the infrastructure components
//!
//! These tests verify that PostgreSQL is reachable, that the embedded
//! migrations apply cleanly, and that constraint violations are classified.
//! They need a live database and are ignored by default:
//! `DATABASE_URL=... cargo test -p common -- --ignored`

use common::{
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
    error::DatabaseError,
};
use sqlx::Row;

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await?, "Database health check failed");

    run_migrations(&pool).await?;

    let row = sqlx::query("SELECT COUNT(*) AS tables FROM information_schema.tables WHERE table_name IN ('users', 'categories', 'products')")
        .fetch_one(&pool)
        .await?;
    let tables: i64 = row.get("tables");
    assert_eq!(tables, 3, "Marketplace tables were not created");

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_unique_violation_is_classified() -> Result<(), Box<dyn std::error::Error>> {
    let pool = init_pool(&DatabaseConfig::from_env()?).await?;
    run_migrations(&pool).await?;

    let name = format!("infra-{}", std::process::id());
    let insert = "INSERT INTO categories (id, name, description, slug) VALUES (gen_random_uuid(), $1, '', $2)";

    sqlx::query(insert)
        .bind(&name)
        .bind(format!("{}-a", name))
        .execute(&pool)
        .await?;

    let duplicate = sqlx::query(insert)
        .bind(&name)
        .bind(format!("{}-b", name))
        .execute(&pool)
        .await
        .map_err(DatabaseError::from);

    assert!(matches!(duplicate, Err(ref e) if e.is_unique_violation()));

    sqlx::query("DELETE FROM categories WHERE name = $1")
        .bind(&name)
        .execute(&pool)
        .await?;

    Ok(())
}
