use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use auth::{
    AppState,
    jwt::{JwtConfig, JwtService},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    routes,
};
use common::database;
use marketplace::{IdentityStore, repositories::PgUserRepository};

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init()?;

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool).await?;

    let jwt_service = JwtService::new(JwtConfig::from_env()?);
    let identity = IdentityStore::new(Arc::new(PgUserRepository::new(pool)));
    let rate_limiter = RateLimiter::new(RateLimiterConfig::from_env());

    let app_state = AppState {
        identity,
        jwt: jwt_service,
        rate_limiter,
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let bind_addr = std::env::var("AUTH_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Authentication service listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
