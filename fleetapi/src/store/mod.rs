//! Persistence collaborators consumed by the pipeline.
//!
//! Vehicles, journeys and geofences are owned by the surrounding CRUD
//! system; the pipeline only needs the lookups below plus one atomic write
//! primitive. Every tenant-scoped read takes the tenant explicitly.

mod locks;
mod memory;

pub use locks::{KeyLockGuard, KeyLocker};
pub use memory::{MemoryStore, Seed};

use crate::core::error::Result;
use crate::domain::prelude::*;
use async_trait::async_trait;

/// The writes produced by one ingestion, committed all-or-nothing.
#[derive(Debug, Clone)]
pub struct IngestUnit {
    pub record: TelemetryRecord,
    /// New `is_deviated` value, only when it changed.
    pub journey_flag: Option<(JourneyId, bool)>,
    /// New live fields for the vehicle. `None` for out-of-order samples,
    /// which only extend the history. Other vehicle fields are never
    /// written by a commit.
    pub live: Option<LiveState>,
}

#[async_trait]
pub trait FleetStore: Send + Sync {
    /// Vehicle by id, only if it belongs to `tenant_id`.
    async fn vehicle(&self, tenant_id: &TenantId, id: VehicleId) -> Result<Option<Vehicle>>;

    /// The vehicle's journey with status `IN_PROGRESS`, if any.
    async fn active_journey(
        &self,
        tenant_id: &TenantId,
        vehicle_id: VehicleId,
    ) -> Result<Option<Journey>>;

    /// Every `IN_PROGRESS` journey across tenants.
    async fn active_journeys(&self) -> Result<Vec<Journey>>;

    async fn geofences(&self, tenant_id: &TenantId) -> Result<Vec<Geofence>>;

    /// The record with the newest `sampled_at`, whatever order records
    /// arrived in.
    async fn latest_record(&self, vehicle_id: VehicleId) -> Result<Option<TelemetryRecord>>;

    /// Most recent records first.
    async fn history(
        &self,
        tenant_id: &TenantId,
        vehicle_id: VehicleId,
        limit: usize,
    ) -> Result<Vec<TelemetryRecord>>;

    /// Applies every write in `unit` atomically.
    async fn commit(&self, unit: IngestUnit) -> Result<()>;
}
