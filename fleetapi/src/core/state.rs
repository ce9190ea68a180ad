use crate::core::config::AuthConfig;
use crate::domain::prelude::*;
use crate::service::IngestionService;
use crate::stream::rooms::Rooms;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    /// Telemetry entry point shared by the HTTP API and the generator.
    pub ingestion: Arc<IngestionService>,

    /// Per-tenant live channels.
    /// Each websocket joins exactly one of them.
    pub rooms: Rooms,

    /// The sender for the heartbeat channel.
    /// Used to broadcast heartbeats to the websocket clients.
    pub heartbeat_tx: broadcast::Sender<Heartbeat>,

    /// Settings used to verify caller credentials.
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(
        ingestion: Arc<IngestionService>,
        heartbeat_tx: broadcast::Sender<Heartbeat>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            rooms: ingestion.rooms().clone(),
            ingestion,
            heartbeat_tx,
            auth: Arc::new(auth),
        }
    }
}
