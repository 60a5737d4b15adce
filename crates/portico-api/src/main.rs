//! Portico API Server
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use portico_api::{
    create_router, email::LettreMailer, init_tracing, state::AppState, state::Stores,
};
use portico_core::config::{AppConfig, DatabaseBackend};
use portico_core::PgStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration: optional TOML file, then environment
    let config = match std::env::var("PORTICO_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    init_tracing(&config.logging);

    let stores = match config.database.backend {
        DatabaseBackend::Postgres => {
            let store = PgStore::connect(
                &config.database.postgres_url,
                config.database.postgres_pool_size,
            )
            .await
            .context("Failed to connect to PostgreSQL")?;
            store.migrate().await.context("Failed to run migrations")?;
            tracing::info!("Connected to PostgreSQL, migrations applied");
            Stores::postgres(store)
        }
        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory store - data is lost on restart");
            Stores::memory()
        }
    };

    let mailer = LettreMailer::new(&config.email).context("Failed to configure email")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, stores, Arc::new(mailer))?);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Portico API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
