use futures::{Stream, StreamExt};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::domain::prelude::*;
use crate::geo::LatLng;
use crate::service::IngestionService;

/// Starting point for vehicles with no known position.
pub const DEFAULT_ORIGIN: LatLng = LatLng::new(-19.9167, -43.9345);

/// Largest per-axis drift between two samples, in degrees.
const JITTER_DEG: f64 = 0.0003;

/// Outcome of one generator pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub generated: usize,
    /// Journeys whose vehicle is reporting real telemetry.
    pub skipped: usize,
    pub failed: usize,
}

/// Spawn the synthetic telemetry producer.
///
/// Every `period` it fabricates one sample per in-progress journey whose
/// vehicle has no recent device telemetry, and feeds it through the
/// ingestion service like any external sample.
///
/// Runs never overlap: the next tick is awaited only after the current pass
/// finishes, and ticks missed meanwhile are skipped rather than queued.
///
pub fn spawn(service: Arc<IngestionService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = stream_ticks(period);
        while ticks.next().await.is_some() {
            let report = run_once(&service, period).await;
            info!(
                generated = report.generated,
                skipped = report.skipped,
                failed = report.failed,
                "synthetic telemetry pass"
            );
        }
    })
}

/// A stream that yields once per period, skipping ticks that were missed.
///
fn stream_ticks(period: Duration) -> impl Stream<Item = ()> + Send {
    let start = tokio::time::Instant::now() + period;
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let stream = futures::stream::unfold(interval, |mut interval| async {
        interval.tick().await;
        Some(((), interval))
    });

    Box::pin(stream)
}

/// One generator pass over every in-progress journey, sequentially.
///
/// Journeys whose vehicle received a device record within `quiet` are left
/// alone. A failure on one journey is logged and the pass moves on.
///
pub async fn run_once(service: &IngestionService, quiet: Duration) -> RunReport {
    let mut report = RunReport::default();
    let store = service.store();

    let journeys = match store.active_journeys().await {
        Ok(journeys) => journeys,
        Err(e) => {
            warn!(error = %e, "listing active journeys failed");
            report.failed += 1;
            return report;
        }
    };

    // one sample per vehicle per pass
    let mut seen = HashSet::new();
    for journey in journeys {
        if !seen.insert(journey.vehicle_id) {
            continue;
        }
        let (tenant_id, vehicle_id) = (&journey.tenant_id, journey.vehicle_id);

        let last = match store.latest_record(vehicle_id).await {
            Ok(last) => last,
            Err(e) => {
                warn!(%vehicle_id, error = %e, "fetching last record failed");
                report.failed += 1;
                continue;
            }
        };
        if last.as_ref().is_some_and(|r| has_live_feed(r, quiet)) {
            report.skipped += 1;
            continue;
        }

        let vehicle = match store.vehicle(tenant_id, vehicle_id).await {
            Ok(Some(vehicle)) => vehicle,
            Ok(None) => {
                warn!(%vehicle_id, journey_id = %journey.id, "journey references unknown vehicle");
                report.failed += 1;
                continue;
            }
            Err(e) => {
                warn!(%vehicle_id, error = %e, "fetching vehicle failed");
                report.failed += 1;
                continue;
            }
        };

        let sample = next_sample(&mut rand::rng(), last.as_ref(), &vehicle);
        match service
            .ingest(tenant_id, vehicle_id, sample, RecordSource::Synthetic)
            .await
        {
            Ok(_) => report.generated += 1,
            Err(e) => {
                warn!(%vehicle_id, error = %e, "synthetic ingestion failed");
                report.failed += 1;
            }
        }
    }

    report
}

fn has_live_feed(record: &TelemetryRecord, quiet: Duration) -> bool {
    let age = chrono::Utc::now() - record.timestamp;
    record.source == RecordSource::Device && age.to_std().is_ok_and(|age| age < quiet)
}

/// Fabricates a plausible next sample from the last known state.
///
/// Position drifts by up to ~35 m per axis, the odometer advances 100-300 m,
/// speed sits in a highway range and fuel drops slightly. A record older
/// than the vehicle snapshot is ignored, and the odometer never drops below
/// the snapshot's `current_km`.
///
pub fn next_sample<R: Rng>(
    rng: &mut R,
    last: Option<&TelemetryRecord>,
    vehicle: &Vehicle,
) -> TelemetrySample {
    let last = last.filter(|r| !vehicle.is_stale(r.sampled_at));
    let origin = last
        .map(TelemetryRecord::position)
        .or_else(|| vehicle.position())
        .unwrap_or(DEFAULT_ORIGIN);
    let odometer = last
        .and_then(|r| r.odometer)
        .unwrap_or(vehicle.current_km as f64)
        .max(vehicle.current_km as f64);
    let fuel = last
        .and_then(|r| r.fuel_level)
        .or(vehicle.fuel_level)
        .unwrap_or(100.0);

    let d_lat: f64 = rng.random_range(-JITTER_DEG..=JITTER_DEG);
    let d_lng: f64 = rng.random_range(-JITTER_DEG..=JITTER_DEG);
    let speed: f64 = rng.random_range(60.0..=110.0);
    let distance_km: f64 = rng.random_range(0.1..=0.3);
    let burned: f64 = rng.random_range(0.0..=0.5);

    TelemetrySample {
        latitude: (origin.lat + d_lat).clamp(-90.0, 90.0),
        longitude: (origin.lng + d_lng).clamp(-180.0, 180.0),
        speed: Some(speed),
        odometer: Some(odometer + distance_km),
        fuel_level: Some((fuel - burned).max(0.0)),
        rpm: None,
        voltage: None,
        engine_status: Some(true),
        timestamp: None,
    }
}
