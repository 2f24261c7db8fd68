//! SMR API Server
//!
//! REST API server for soon-my-room user accounts and sessions.

use anyhow::Context;
use smr_api::{create_router, state::AppState};
use smr_core::config::{AppConfig, LoggingConfig, StoreBackend};
use smr_core::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
use std::sync::Arc;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("smr_api={},smr_core={},tower_http=debug", logging.level, logging.level).into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    match config.database.backend {
        StoreBackend::Postgres => {
            let store = PgCredentialStore::new(
                &config.database.postgres_url,
                config.database.max_connections,
            )
            .await
            .context("Failed to connect to PostgreSQL")?;
            store
                .ensure_schema()
                .await
                .context("Failed to prepare users table")?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory credential store; accounts are lost on restart");
            Ok(Arc::new(InMemoryCredentialStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration; a missing signing secret is fatal
    let config = match std::env::var("CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override(),
        Err(_) => AppConfig::from_env(),
    }
    .context("Invalid configuration")?;
    init_tracing(&config.logging);
    config.validate().context("Invalid configuration")?;

    let addr = config.server.bind_addr();

    // Create application state
    let store = open_store(&config).await?;
    tracing::info!(store = store.name(), "Credential store ready");
    let state = Arc::new(AppState::new(config, store).context("Failed to build metrics")?);

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("SMR API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
