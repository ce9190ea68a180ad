use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::core::error::{Error, Result};
use crate::domain::prelude::*;
use crate::geo::deviation;
use crate::store::{FleetStore, IngestUnit, KeyLocker};
use crate::stream::rooms::Rooms;

/// Default number of records returned by a history query.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const MAX_HISTORY_LIMIT: usize = 1_000;

/// The single entry point for telemetry, whether it comes from a device or
/// from the synthetic generator.
///
/// Ingestions for different vehicles run in parallel; ingestions for the
/// same vehicle are serialized so the live snapshot only moves forward.
///
pub struct IngestionService {
    store: Arc<dyn FleetStore>,
    rooms: Rooms,
    locks: KeyLocker,
}

impl IngestionService {
    pub fn new(store: Arc<dyn FleetStore>, rooms: Rooms) -> Self {
        Self {
            store,
            rooms,
            locks: KeyLocker::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn FleetStore> {
        &self.store
    }

    pub fn rooms(&self) -> &Rooms {
        &self.rooms
    }

    /// Accepts a sample for a vehicle of `tenant_id`.
    ///
    /// The history record, the journey's deviation flag and the vehicle
    /// snapshot are committed as one unit; the live update is published to
    /// the tenant's room only after that commit succeeds. A sample older than
    /// the current snapshot is kept in history but changes nothing else.
    ///
    /// # Errors
    ///
    /// * `Validation` - the sample is malformed; nothing is written.
    /// * `NotFound` - the vehicle is unknown to this tenant; nothing is
    ///   written.
    /// * `Store` - the commit failed; nothing is written and the call can be
    ///   retried.
    ///
    pub async fn ingest(
        &self,
        tenant_id: &TenantId,
        vehicle_id: VehicleId,
        sample: TelemetrySample,
        source: RecordSource,
    ) -> Result<TelemetryRecord> {
        sample.validate()?;

        let _guard = self.locks.lock(vehicle_id).await;

        let mut vehicle = self
            .store
            .vehicle(tenant_id, vehicle_id)
            .await?
            .ok_or_else(|| Error::not_found("vehicle", vehicle_id))?;

        let sampled_at = sample.timestamp.unwrap_or_else(Utc::now);
        let record = TelemetryRecord::new(vehicle_id, tenant_id.clone(), &sample, source, sampled_at);

        if vehicle.is_stale(sampled_at) {
            debug!(%vehicle_id, %sampled_at, "out-of-order sample, history only");
            self.store
                .commit(IngestUnit {
                    record: record.clone(),
                    journey_flag: None,
                    live: None,
                })
                .await?;
            return Ok(record);
        }

        let journey = self.store.active_journey(tenant_id, vehicle_id).await?;
        let geofences = self.store.geofences(tenant_id).await?;
        let result = deviation::evaluate(sample.position(), journey.as_ref(), &geofences);
        if !result.geofences.is_empty() {
            debug!(%vehicle_id, geofences = ?result.geofences, "inside geofences");
        }

        // a journey without a usable route keeps whatever flag it has
        let is_deviated = match (&journey, result.distance_m) {
            (Some(_), Some(_)) => result.is_deviated,
            (Some(j), None) => j.is_deviated,
            (None, _) => false,
        };
        let journey_flag = journey
            .as_ref()
            .filter(|j| j.is_deviated != is_deviated)
            .map(|j| (j.id, is_deviated));

        vehicle.apply(&sample, sampled_at);

        self.store
            .commit(IngestUnit {
                record: record.clone(),
                journey_flag,
                live: Some(vehicle.live_state()),
            })
            .await?;

        if let Some((journey_id, flag)) = journey_flag {
            debug!(%journey_id, is_deviated = flag, distance_m = ?result.distance_m, "deviation changed");
        }

        let update = LiveUpdate::new(&vehicle, &record, is_deviated);
        let observers = self.rooms.publish(tenant_id, update);
        debug!(
            %vehicle_id,
            room = %tenant_id.room_key(),
            observers,
            ?source,
            "telemetry ingested"
        );

        Ok(record)
    }

    /// Most recent records for a vehicle of `tenant_id`, newest first.
    ///
    /// `limit` defaults to [`DEFAULT_HISTORY_LIMIT`] and is capped at
    /// [`MAX_HISTORY_LIMIT`]. A limit of zero is a `Validation` error.
    ///
    pub async fn history(
        &self,
        tenant_id: &TenantId,
        vehicle_id: VehicleId,
        limit: Option<usize>,
    ) -> Result<Vec<TelemetryRecord>> {
        let limit = match limit {
            Some(0) => return Err(Error::Validation("limit must be at least 1".to_string())),
            Some(limit) => limit.min(MAX_HISTORY_LIMIT),
            None => DEFAULT_HISTORY_LIMIT,
        };

        if self.store.vehicle(tenant_id, vehicle_id).await?.is_none() {
            return Err(Error::not_found("vehicle", vehicle_id));
        }

        self.store
            .history(tenant_id, vehicle_id, limit)
            .await
            .inspect_err(|e| warn!(%vehicle_id, error = %e, "history query failed"))
    }
}
