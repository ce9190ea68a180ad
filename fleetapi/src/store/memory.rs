use std::collections::HashMap;
use std::path::Path;

use super::{FleetStore, IngestUnit};
use crate::core::error::{Error, Result};
use crate::domain::prelude::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Fixture used to populate a [`MemoryStore`].
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Seed {
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub journeys: Vec<Journey>,
    #[serde(default)]
    pub geofences: Vec<Geofence>,
}

impl Seed {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Default)]
struct Tables {
    vehicles: HashMap<VehicleId, Vehicle>,
    journeys: HashMap<JourneyId, Journey>,
    geofences: Vec<Geofence>,
    /// Append-only, oldest first.
    records: HashMap<VehicleId, Vec<TelemetryRecord>>,
}

/// In-process store. A single lock over all tables makes every commit
/// atomic with respect to readers.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        let tables = Tables {
            vehicles: seed.vehicles.into_iter().map(|v| (v.id, v)).collect(),
            journeys: seed.journeys.into_iter().map(|j| (j.id, j)).collect(),
            geofences: seed.geofences,
            records: HashMap::new(),
        };
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub async fn insert_vehicle(&self, vehicle: Vehicle) {
        self.tables.write().await.vehicles.insert(vehicle.id, vehicle);
    }

    pub async fn insert_journey(&self, journey: Journey) {
        self.tables.write().await.journeys.insert(journey.id, journey);
    }

    pub async fn insert_geofence(&self, geofence: Geofence) {
        self.tables.write().await.geofences.push(geofence);
    }

    pub async fn journey(&self, id: JourneyId) -> Option<Journey> {
        self.tables.read().await.journeys.get(&id).cloned()
    }

    pub async fn record_count(&self, vehicle_id: VehicleId) -> usize {
        self.tables
            .read()
            .await
            .records
            .get(&vehicle_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl FleetStore for MemoryStore {
    async fn vehicle(&self, tenant_id: &TenantId, id: VehicleId) -> Result<Option<Vehicle>> {
        let tables = self.tables.read().await;
        Ok(tables
            .vehicles
            .get(&id)
            .filter(|v| &v.tenant_id == tenant_id)
            .cloned())
    }

    async fn active_journey(
        &self,
        tenant_id: &TenantId,
        vehicle_id: VehicleId,
    ) -> Result<Option<Journey>> {
        let tables = self.tables.read().await;
        Ok(tables
            .journeys
            .values()
            .find(|j| &j.tenant_id == tenant_id && j.vehicle_id == vehicle_id && j.is_active())
            .cloned())
    }

    async fn active_journeys(&self) -> Result<Vec<Journey>> {
        let tables = self.tables.read().await;
        Ok(tables
            .journeys
            .values()
            .filter(|j| j.is_active())
            .cloned()
            .collect())
    }

    async fn geofences(&self, tenant_id: &TenantId) -> Result<Vec<Geofence>> {
        let tables = self.tables.read().await;
        Ok(tables
            .geofences
            .iter()
            .filter(|g| &g.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn latest_record(&self, vehicle_id: VehicleId) -> Result<Option<TelemetryRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .get(&vehicle_id)
            // ties go to the later arrival
            .and_then(|records| records.iter().max_by_key(|r| r.sampled_at))
            .cloned())
    }

    async fn history(
        &self,
        tenant_id: &TenantId,
        vehicle_id: VehicleId,
        limit: usize,
    ) -> Result<Vec<TelemetryRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .get(&vehicle_id)
            .map(|records| {
                records
                    .iter()
                    .rev()
                    .filter(|r| &r.tenant_id == tenant_id)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit(&self, unit: IngestUnit) -> Result<()> {
        let mut tables = self.tables.write().await;

        // check everything before the first write so a failure leaves no trace
        let vehicle_id = unit.record.vehicle_id;
        if !tables.vehicles.contains_key(&vehicle_id) {
            return Err(Error::not_found("vehicle", vehicle_id));
        }
        if let Some((journey_id, _)) = unit.journey_flag {
            if !tables.journeys.contains_key(&journey_id) {
                return Err(Error::not_found("journey", journey_id));
            }
        }

        tables
            .records
            .entry(vehicle_id)
            .or_default()
            .push(unit.record);
        if let Some((journey_id, is_deviated)) = unit.journey_flag {
            if let Some(journey) = tables.journeys.get_mut(&journey_id) {
                journey.is_deviated = is_deviated;
            }
        }
        if let Some(live) = unit.live {
            if let Some(vehicle) = tables.vehicles.get_mut(&vehicle_id) {
                vehicle.set_live_state(live);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn record(vehicle: &Vehicle, lat: f64) -> TelemetryRecord {
        TelemetryRecord::new(
            vehicle.id,
            vehicle.tenant_id.clone(),
            &TelemetrySample::at(lat, 0.0),
            RecordSource::Device,
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn vehicles_are_tenant_scoped() {
        let store = MemoryStore::new();
        let vehicle = Vehicle::new("org1".into(), "ABC-1234");
        store.insert_vehicle(vehicle.clone()).await;

        assert!(store.vehicle(&"org1".into(), vehicle.id).await.unwrap().is_some());
        assert!(store.vehicle(&"org2".into(), vehicle.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let store = MemoryStore::new();
        let vehicle = Vehicle::new("org1".into(), "ABC-1234");
        store.insert_vehicle(vehicle.clone()).await;

        for i in 0..5 {
            let unit = IngestUnit {
                record: record(&vehicle, f64::from(i)),
                journey_flag: None,
                live: None,
            };
            store.commit(unit).await.unwrap();
        }

        let history = store.history(&"org1".into(), vehicle.id, 3).await.unwrap();
        let latitudes: Vec<f64> = history.iter().map(|r| r.latitude).collect();
        assert_eq!(latitudes, vec![4.0, 3.0, 2.0]);

        let other = store.history(&"org2".into(), vehicle.id, 3).await.unwrap();
        assert!(other.is_empty());

        let latest = store.latest_record(vehicle.id).await.unwrap().unwrap();
        assert_eq!(latest.latitude, 4.0);
    }

    #[tokio::test]
    async fn failed_commit_writes_nothing() {
        let store = MemoryStore::new();
        let vehicle = Vehicle::new("org1".into(), "ABC-1234");
        store.insert_vehicle(vehicle.clone()).await;

        let mut moved = vehicle.clone();
        moved.current_km = 99;
        let unit = IngestUnit {
            record: record(&vehicle, 1.0),
            journey_flag: Some((Uuid::new_v4(), true)),
            live: Some(moved.live_state()),
        };

        assert!(store.commit(unit).await.is_err());
        assert_eq!(store.record_count(vehicle.id).await, 0);
        let stored = store.vehicle(&"org1".into(), vehicle.id).await.unwrap().unwrap();
        assert_eq!(stored.current_km, 0);
    }

    #[tokio::test]
    async fn latest_record_is_by_sample_time() {
        let store = MemoryStore::new();
        let vehicle = Vehicle::new("org1".into(), "ABC-1234");
        store.insert_vehicle(vehicle.clone()).await;

        let now = chrono::Utc::now();
        for (lat, age) in [(1.0, 0), (2.0, 30)] {
            let mut record = record(&vehicle, lat);
            record.sampled_at = now - chrono::Duration::seconds(age);
            let unit = IngestUnit {
                record,
                journey_flag: None,
                live: None,
            };
            store.commit(unit).await.unwrap();
        }

        let latest = store.latest_record(vehicle.id).await.unwrap().unwrap();
        assert_eq!(latest.latitude, 1.0);
    }

    #[tokio::test]
    async fn commit_only_patches_live_fields() {
        let store = MemoryStore::new();
        let vehicle = Vehicle::new("org1".into(), "ABC-1234");
        store.insert_vehicle(vehicle.clone()).await;

        let mut moved = vehicle.clone();
        moved.apply(&TelemetrySample::at(-19.9, -43.9), chrono::Utc::now());

        // registry edit lands between the read and the commit
        let mut renamed = vehicle.clone();
        renamed.plate = "NEW-0001".into();
        store.insert_vehicle(renamed).await;

        let unit = IngestUnit {
            record: record(&vehicle, -19.9),
            journey_flag: None,
            live: Some(moved.live_state()),
        };
        store.commit(unit).await.unwrap();

        let stored = store.vehicle(&"org1".into(), vehicle.id).await.unwrap().unwrap();
        assert_eq!(stored.plate, "NEW-0001");
        assert_eq!(stored.position(), moved.position());
    }

    #[tokio::test]
    async fn loads_seed_fixture() {
        let seed: Seed = serde_json::from_value(json!({
            "vehicles": [{
                "id": "5d2f3b7e-6c1a-4e0b-9f3d-2a8c7e1b4d60",
                "tenantId": "org1",
                "plate": "ABC-1234",
                "currentKm": 1000,
                "fuelLevel": 50.0
            }],
            "journeys": [{
                "id": "9a0e6d4c-1b2f-4a3e-8c5d-7f6e5d4c3b2a",
                "tenantId": "org1",
                "vehicleId": "5d2f3b7e-6c1a-4e0b-9f3d-2a8c7e1b4d60",
                "status": "IN_PROGRESS",
                "plannedRoute": [[-19.90, -43.90], [-19.92, -43.93]]
            }]
        }))
        .unwrap();
        let store = MemoryStore::from_seed(seed);

        let journeys = store.active_journeys().await.unwrap();
        assert_eq!(journeys.len(), 1);
        assert_eq!(journeys[0].allowed_deviation_meters, None);

        let vehicle_id = journeys[0].vehicle_id;
        let active = store.active_journey(&"org1".into(), vehicle_id).await.unwrap();
        assert_eq!(active.map(|j| j.id), Some(journeys[0].id));
    }

    #[tokio::test]
    async fn bundled_fixture_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/seed.json");
        let store = MemoryStore::from_seed(Seed::from_file(&path).unwrap());

        assert_eq!(store.active_journeys().await.unwrap().len(), 2);
        assert_eq!(store.geofences(&"org1".into()).await.unwrap().len(), 2);
        assert!(store.geofences(&"org2".into()).await.unwrap().is_empty());
    }

    #[test]
    fn missing_fixture_is_a_config_error() {
        let err = Seed::from_file(Path::new("/nonexistent/seed.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
