//! Telemetry samples as received, and the records persisted from them.

use super::ids::{TenantId, VehicleId};
use crate::core::error::{Error, Result};
use crate::geo::LatLng;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How far past server time a device clock may run.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Upper bound for odometer readings, in km.
pub const MAX_ODOMETER_KM: f64 = 10_000_000.0;

/// A positional/sensor reading submitted for a vehicle.
///
/// Vehicle and tenant are not part of the body: the vehicle comes from the
/// request path and the tenant from the caller's identity.
///
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub odometer: Option<f64>,
    #[serde(default)]
    pub fuel_level: Option<f64>,
    #[serde(default)]
    pub rpm: Option<f64>,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub engine_status: Option<bool>,
    /// When the device took the reading. Defaults to arrival time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TelemetrySample {
    /// A position-only sample.
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Default::default()
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }

    /// Rejects samples that must never reach the store.
    pub fn validate(&self) -> Result<()> {
        if !self.position().is_valid() {
            return Err(Error::Validation(format!(
                "coordinates out of range: [{}, {}]",
                self.latitude, self.longitude
            )));
        }

        let readings = [
            ("speed", self.speed),
            ("odometer", self.odometer),
            ("fuelLevel", self.fuel_level),
            ("rpm", self.rpm),
            ("voltage", self.voltage),
        ];
        for (field, value) in readings {
            match value {
                Some(v) if !v.is_finite() => {
                    return Err(Error::Validation(format!("{field} is not a number")));
                }
                Some(v) if v < 0.0 => {
                    return Err(Error::Validation(format!("{field} must not be negative")));
                }
                _ => {}
            }
        }

        if self.fuel_level.is_some_and(|fuel| fuel > 100.0) {
            return Err(Error::Validation("fuelLevel is a percentage".to_string()));
        }
        if self.odometer.is_some_and(|km| km > MAX_ODOMETER_KM) {
            return Err(Error::Validation(format!(
                "odometer exceeds {MAX_ODOMETER_KM} km"
            )));
        }

        let horizon = Utc::now() + chrono::Duration::seconds(MAX_CLOCK_SKEW_SECS);
        if self.timestamp.is_some_and(|at| at > horizon) {
            return Err(Error::Validation("timestamp is in the future".to_string()));
        }
        Ok(())
    }
}

/// Where a record came from.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Device,
    Synthetic,
}

/// Immutable history entry, one per accepted sample.
///
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub id: Uuid,
    pub vehicle_id: VehicleId,
    pub tenant_id: TenantId,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub odometer: Option<f64>,
    pub fuel_level: Option<f64>,
    pub rpm: Option<f64>,
    pub voltage: Option<f64>,
    pub engine_status: Option<bool>,
    pub source: RecordSource,
    /// Device time of the reading.
    pub sampled_at: DateTime<Utc>,
    /// Server time the record was accepted.
    pub timestamp: DateTime<Utc>,
}

impl TelemetryRecord {
    pub fn new(
        vehicle_id: VehicleId,
        tenant_id: TenantId,
        sample: &TelemetrySample,
        source: RecordSource,
        sampled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            tenant_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            speed: sample.speed,
            odometer: sample.odometer,
            fuel_level: sample.fuel_level,
            rpm: sample.rpm,
            voltage: sample.voltage,
            engine_status: sample.engine_status,
            source,
            sampled_at,
            timestamp: Utc::now(),
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_minimal_body() {
        let sample: TelemetrySample =
            serde_json::from_value(json!({ "latitude": -19.95, "longitude": -44.0 })).unwrap();
        assert!(sample.validate().is_ok());
        assert_eq!(sample.odometer, None);
        assert_eq!(sample.timestamp, None);
    }

    #[test]
    fn reads_camel_case_fields() {
        let sample: TelemetrySample = serde_json::from_value(json!({
            "latitude": -19.95,
            "longitude": -44.0,
            "fuelLevel": 48,
            "engineStatus": true,
            "timestamp": "2026-10-18T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(sample.fuel_level, Some(48.0));
        assert_eq!(sample.engine_status, Some(true));
        assert!(sample.timestamp.is_some());
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        for (lat, lng) in [(90.5, 0.0), (-91.0, 0.0), (0.0, 180.1), (0.0, -200.0)] {
            let err = TelemetrySample::at(lat, lng).validate().unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{lat},{lng}");
        }
    }

    #[test]
    fn rejects_negative_readings() {
        let mut sample = TelemetrySample::at(0.0, 0.0);
        sample.odometer = Some(-1.0);
        assert!(matches!(sample.validate(), Err(Error::Validation(_))));

        let mut sample = TelemetrySample::at(0.0, 0.0);
        sample.fuel_level = Some(-0.5);
        assert!(matches!(sample.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_non_finite_readings() {
        let mut sample = TelemetrySample::at(0.0, 0.0);
        sample.speed = Some(f64::INFINITY);
        assert!(matches!(sample.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_absurd_odometer() {
        let mut sample = TelemetrySample::at(0.0, 0.0);
        sample.odometer = Some(1e300);
        assert!(matches!(sample.validate(), Err(Error::Validation(_))));

        sample.odometer = Some(MAX_ODOMETER_KM);
        assert!(sample.validate().is_ok());
    }

    #[test]
    fn rejects_timestamps_from_the_future() {
        let mut sample = TelemetrySample::at(0.0, 0.0);
        sample.timestamp = Some(Utc::now() + chrono::Duration::days(365 * 50));
        assert!(matches!(sample.validate(), Err(Error::Validation(_))));

        // small device clock drift is tolerated
        sample.timestamp = Some(Utc::now() + chrono::Duration::seconds(30));
        assert!(sample.validate().is_ok());

        sample.timestamp = Some(Utc::now() - chrono::Duration::days(1));
        assert!(sample.validate().is_ok());
    }

    #[test]
    fn rejects_fuel_above_full() {
        let mut sample = TelemetrySample::at(0.0, 0.0);
        sample.fuel_level = Some(100.5);
        assert!(matches!(sample.validate(), Err(Error::Validation(_))));
    }
}
