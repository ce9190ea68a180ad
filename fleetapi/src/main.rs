use anyhow::Context;
use fleetapi::{
    api,
    core::prelude::*,
    service::IngestionService,
    store::{FleetStore, MemoryStore, Seed},
    stream::{heartbeat, rooms::Rooms, synthetic},
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fleetapi=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn FleetStore> = match &config.seed_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading seed fixture");
            Arc::new(MemoryStore::from_seed(Seed::from_file(path)?))
        }
        None => Arc::new(MemoryStore::new()),
    };

    let rooms = Rooms::new(config.broadcast_buffer_size);
    let ingestion = Arc::new(IngestionService::new(store, rooms));
    let (heartbeat_tx, _) = heartbeat::channel(config.heartbeat_interval);

    if config.synthetic_enabled {
        tracing::info!(period = ?config.synthetic_interval, "starting synthetic telemetry");
        synthetic::spawn(ingestion.clone(), config.synthetic_interval);
    }

    let state = AppState::new(ingestion, heartbeat_tx, config.auth.clone());
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
