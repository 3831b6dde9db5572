use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use config::ConfigStore;
use notes_server::logging::init_logging;
use notes_server::rest::create_router;
use notes_server::state::AppState;
use notes_service::NoteService;
use provider_openai::OpenAiCompatibleClient;
use storage_sqlite::SqliteStorage;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let data_dir = config::default_data_dir()?;
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to prepare data dir {}", data_dir.display()))?;
    let _log_guard = init_logging(&data_dir.join("logs"));

    let config_store = ConfigStore::from_dir(&data_dir);
    let mut app_config = config_store.load_or_init()?;
    app_config.apply_env_overrides(|key| std::env::var(key).ok());

    let database_path = app_config.database_path(&data_dir);
    let storage = SqliteStorage::connect(&database_path).await?;
    info!(path = %database_path.display(), "storage ready");

    let api_key = match app_config.resolve_api_key(|key| std::env::var(key).ok()) {
        Ok(key) => key,
        Err(err) => {
            warn!("{err:#}; note generation and translation will fail");
            String::new()
        }
    };
    let client = OpenAiCompatibleClient::new(app_config.provider.clone(), api_key)?;
    info!(
        base_url = %app_config.provider.base_url,
        model = client.model(),
        "language model client ready"
    );

    let service = NoteService::new(Arc::new(storage), Arc::new(client));
    let router = create_router(Arc::new(AppState::new(Arc::new(service))));

    let listener = tokio::net::TcpListener::bind(&app_config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", app_config.server.bind_addr))?;
    info!(addr = %app_config.server.bind_addr, "notes server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
    }
    info!("shutting down");
}
