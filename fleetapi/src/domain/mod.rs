pub mod telemetry;

pub mod prelude {
    pub use super::{
        geofence::{Geofence, GeofenceShape},
        heartbeat::Heartbeat,
        ids::{JourneyId, TenantId, VehicleId},
        journey::{Journey, JourneyStatus},
        live::LiveUpdate,
        telemetry::{RecordSource, TelemetryRecord, TelemetrySample},
        vehicle::{LiveState, Vehicle},
    };
}

pub mod ids {
    use serde::{Deserialize, Serialize};
    use std::fmt;

    pub type VehicleId = uuid::Uuid;
    pub type JourneyId = uuid::Uuid;

    /// Identifier of a tenant (organization), the isolation boundary for
    /// every entity and live channel.
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TenantId(String);

    impl TenantId {
        pub fn new(id: impl Into<String>) -> Self {
            Self(id.into())
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }

        /// Name of the tenant's live channel.
        pub fn room_key(&self) -> String {
            format!("tenant:{}", self.0)
        }
    }

    impl fmt::Display for TenantId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl From<&str> for TenantId {
        fn from(s: &str) -> Self {
            Self(s.to_string())
        }
    }

    impl From<String> for TenantId {
        fn from(s: String) -> Self {
            Self(s)
        }
    }
}

pub mod vehicle {
    use super::{ids::*, telemetry::TelemetrySample};
    use crate::geo::LatLng;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    /// Domain model for a tenant's vehicle and its live snapshot.
    ///
    /// The live fields are only ever written by the ingestion path; every
    /// other subsystem treats them as read-only.
    ///
    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
    #[serde(rename_all = "camelCase")]
    pub struct Vehicle {
        pub id: VehicleId,
        pub tenant_id: TenantId,
        pub plate: String,
        #[serde(default)]
        pub latitude: Option<f64>,
        #[serde(default)]
        pub longitude: Option<f64>,
        #[serde(default)]
        pub speed: Option<f64>,
        #[serde(default)]
        pub current_km: i64,
        #[serde(default)]
        pub fuel_level: Option<f64>,
        #[serde(default)]
        pub engine_on: bool,
        #[serde(default)]
        pub last_updated: Option<DateTime<Utc>>,
    }

    /// The snapshot fields the ingestion path owns.
    #[derive(Debug, Clone, PartialEq)]
    pub struct LiveState {
        pub latitude: Option<f64>,
        pub longitude: Option<f64>,
        pub speed: Option<f64>,
        pub current_km: i64,
        pub fuel_level: Option<f64>,
        pub engine_on: bool,
        pub last_updated: Option<DateTime<Utc>>,
    }

    impl Vehicle {
        pub fn new(tenant_id: TenantId, plate: impl Into<String>) -> Self {
            Self {
                id: uuid::Uuid::new_v4(),
                tenant_id,
                plate: plate.into(),
                latitude: None,
                longitude: None,
                speed: None,
                current_km: 0,
                fuel_level: None,
                engine_on: false,
                last_updated: None,
            }
        }

        pub fn position(&self) -> Option<LatLng> {
            Some(LatLng::new(self.latitude?, self.longitude?))
        }

        /// Whether a sample taken at `at` is older than the current snapshot.
        pub fn is_stale(&self, at: DateTime<Utc>) -> bool {
            self.last_updated.is_some_and(|last| at < last)
        }

        /// Copy of the live fields only.
        pub fn live_state(&self) -> LiveState {
            LiveState {
                latitude: self.latitude,
                longitude: self.longitude,
                speed: self.speed,
                current_km: self.current_km,
                fuel_level: self.fuel_level,
                engine_on: self.engine_on,
                last_updated: self.last_updated,
            }
        }

        /// Replaces the live fields, leaving the rest of the row untouched.
        pub fn set_live_state(&mut self, live: LiveState) {
            self.latitude = live.latitude;
            self.longitude = live.longitude;
            self.speed = live.speed;
            self.current_km = live.current_km;
            self.fuel_level = live.fuel_level;
            self.engine_on = live.engine_on;
            self.last_updated = live.last_updated;
        }

        /// Overwrites the live snapshot with the fields the sample carries.
        ///
        /// Position is always taken from the sample; odometer, fuel, speed and
        /// engine state only when present.
        pub fn apply(&mut self, sample: &TelemetrySample, at: DateTime<Utc>) {
            self.latitude = Some(sample.latitude);
            self.longitude = Some(sample.longitude);
            if let Some(speed) = sample.speed {
                self.speed = Some(speed);
            }
            // validated samples keep the odometer well inside i64
            if let Some(odometer) = sample.odometer {
                self.current_km = odometer.floor() as i64;
            }
            if let Some(fuel) = sample.fuel_level {
                self.fuel_level = Some(fuel);
            }
            if let Some(engine_on) = sample.engine_status {
                self.engine_on = engine_on;
            }
            self.last_updated = Some(at);
        }
    }
}

pub mod journey {
    use super::ids::*;
    use crate::geo::LatLng;
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum JourneyStatus {
        Planned,
        InProgress,
        Completed,
        Cancelled,
    }

    /// A vehicle's journey, owned by the journey subsystem.
    ///
    /// The pipeline reads the planned route and threshold, and writes
    /// `is_deviated`.
    ///
    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
    #[serde(rename_all = "camelCase")]
    pub struct Journey {
        pub id: JourneyId,
        pub tenant_id: TenantId,
        pub vehicle_id: VehicleId,
        pub status: JourneyStatus,
        #[serde(default)]
        pub planned_route: Option<Vec<LatLng>>,
        #[serde(default)]
        pub allowed_deviation_meters: Option<f64>,
        #[serde(default)]
        pub is_deviated: bool,
    }

    impl Journey {
        pub fn is_active(&self) -> bool {
            self.status == JourneyStatus::InProgress
        }
    }
}

pub mod geofence {
    use super::ids::TenantId;
    use crate::geo::{self, LatLng};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
    #[serde(
        tag = "type",
        content = "coordinates",
        rename_all = "SCREAMING_SNAKE_CASE"
    )]
    pub enum GeofenceShape {
        #[serde(rename_all = "camelCase")]
        Circle { center: LatLng, radius_meters: f64 },
        /// Vertices in order, implicitly closed.
        Polygon(Vec<LatLng>),
    }

    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
    #[serde(rename_all = "camelCase")]
    pub struct Geofence {
        pub id: Uuid,
        pub tenant_id: TenantId,
        pub name: String,
        #[serde(default = "active_by_default")]
        pub active: bool,
        pub shape: GeofenceShape,
    }

    fn active_by_default() -> bool {
        true
    }

    impl Geofence {
        pub fn contains(&self, p: LatLng) -> bool {
            match &self.shape {
                GeofenceShape::Circle {
                    center,
                    radius_meters,
                } => geo::point_in_circle(p, *center, *radius_meters),
                GeofenceShape::Polygon(vertices) => geo::point_in_polygon(p, vertices),
            }
        }
    }
}

pub mod live {
    use super::{ids::VehicleId, telemetry::TelemetryRecord, vehicle::Vehicle};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    /// Event published to a tenant's live channel for each applied sample.
    ///
    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
    #[serde(rename_all = "camelCase")]
    pub struct LiveUpdate {
        pub vehicle_id: VehicleId,
        pub plate: String,
        pub latitude: Option<f64>,
        pub longitude: Option<f64>,
        pub speed: Option<f64>,
        pub fuel_level: Option<f64>,
        pub current_km: i64,
        pub engine_status: bool,
        pub is_deviated: bool,
        pub timestamp: DateTime<Utc>,
    }

    impl LiveUpdate {
        /// Builds the event from the post-ingestion snapshot.
        pub fn new(vehicle: &Vehicle, record: &TelemetryRecord, is_deviated: bool) -> Self {
            Self {
                vehicle_id: vehicle.id,
                plate: vehicle.plate.clone(),
                latitude: vehicle.latitude,
                longitude: vehicle.longitude,
                speed: vehicle.speed,
                fuel_level: vehicle.fuel_level,
                current_km: vehicle.current_km,
                engine_status: vehicle.engine_on,
                is_deviated,
                timestamp: record.timestamp,
            }
        }
    }
}

pub mod heartbeat {
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
    pub struct Heartbeat {
        pub status: String,
    }

    impl Heartbeat {
        pub fn ok() -> Self {
            Self {
                status: "ok".to_string(),
            }
        }
    }
}
