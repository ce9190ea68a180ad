//! Route deviation evaluation.

use super::{distance_point_to_polyline_m, LatLng};
use crate::domain::prelude::*;
use uuid::Uuid;

/// Threshold applied when a journey does not set its own.
pub const DEFAULT_ALLOWED_DEVIATION_M: f64 = 500.0;

/// Result of evaluating a position against a journey and the tenant's
/// geofences.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Deviation {
    pub is_deviated: bool,
    /// Distance to the planned route, when there is one to measure.
    pub distance_m: Option<f64>,
    /// Active geofences containing the position. Informational only, it
    /// does not feed `is_deviated`.
    pub geofences: Vec<Uuid>,
}

/// Decides whether `position` is off the journey's planned route.
///
/// A journey without a route, or no journey at all, is never deviated.
pub fn evaluate(position: LatLng, journey: Option<&Journey>, geofences: &[Geofence]) -> Deviation {
    let geofences = geofences
        .iter()
        .filter(|g| g.active && g.contains(position))
        .map(|g| g.id)
        .collect();

    let distance_m = journey
        .and_then(|j| j.planned_route.as_deref())
        .and_then(|route| distance_point_to_polyline_m(position, route));

    let allowed = journey
        .and_then(|j| j.allowed_deviation_meters)
        .unwrap_or(DEFAULT_ALLOWED_DEVIATION_M);

    Deviation {
        is_deviated: distance_m.is_some_and(|d| d > allowed),
        distance_m,
        geofences,
    }
}
