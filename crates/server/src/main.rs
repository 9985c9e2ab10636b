use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thirdlogin_server::handoff::MemoryKvStore;
use thirdlogin_server::{AppConfig, AppState, build_router, storage};

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thirdlogin_server=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!("data directory: {}", config.data_dir.display());

    if config.jwt_secret.is_empty() {
        tracing::warn!("JWT_SECRET not set, third-party logins will fail to issue sessions");
    }
    if config.oauth_providers.is_empty() {
        tracing::warn!("no identity provider configured");
    }

    let db = storage::init_db(&config.data_dir)?;
    tracing::info!("database initialized");

    let store = MemoryKvStore::new();
    store.spawn_janitor(JANITOR_INTERVAL);

    let port = config.port;
    let base_url = config.base_url.clone();
    let app = build_router(AppState::new(config, db, Arc::new(store)));

    tracing::info!("starting server at {base_url}");

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
