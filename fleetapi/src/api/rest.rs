use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::auth::CallerIdentity;
use crate::core::prelude::*;
use crate::domain::prelude::*;

#[derive(Debug, Deserialize, Default)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// `POST /v1/vehicles/{vehicle_id}/telemetry`
///
/// Ingests a device sample for a vehicle of the caller's tenant.
///
pub async fn ingest(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(vehicle_id): Path<VehicleId>,
    Json(sample): Json<TelemetrySample>,
) -> Result<(StatusCode, Json<TelemetryRecord>)> {
    let record = state
        .ingestion
        .ingest(&caller.tenant_id, vehicle_id, sample, RecordSource::Device)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /v1/vehicles/{vehicle_id}/telemetry?limit=N`
///
/// Most recent records for the vehicle, newest first.
///
pub async fn history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(vehicle_id): Path<VehicleId>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<TelemetryRecord>>> {
    let records = state
        .ingestion
        .history(&caller.tenant_id, vehicle_id, params.limit)
        .await?;
    Ok(Json(records))
}

pub async fn health() -> &'static str {
    "ok"
}
