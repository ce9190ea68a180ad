pub mod auth;
pub mod rest;
pub mod ws;

use crate::core::prelude::AppState;
use axum::{routing::get, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(rest::health))
        .route("/v1/live", get(ws::endpoint))
        .route(
            "/v1/vehicles/{vehicle_id}/telemetry",
            get(rest::history).post(rest::ingest),
        )
        .with_state(state)
}
