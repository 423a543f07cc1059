use anyhow::Result;
use tracing::info;

use api::{AppState, routes};
use auth::{
    jwt::{JwtConfig, JwtService},
    middleware::AuthState,
};
use common::database::{self, DatabaseConfig, init_pool};
use marketplace::{
    Marketplace,
    notifier::{NotifierConfig, SinkConfig},
};

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init()?;

    info!("Starting API service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool).await?;

    // Notification engine and dispatch sink
    let sink = SinkConfig::from_env().build()?;
    let notifier_config = NotifierConfig::from_env();
    info!(
        throttle_seconds = notifier_config.throttle.num_seconds(),
        delivery = ?notifier_config.delivery,
        "Notification engine configured"
    );

    let market = Marketplace::postgres(pool, sink, notifier_config);
    let auth = AuthState {
        jwt: JwtService::new(JwtConfig::from_env()?),
        identity: market.identity.clone(),
    };

    let app_state = AppState { market, auth };

    info!("API service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let bind_addr = std::env::var("API_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("API service listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
