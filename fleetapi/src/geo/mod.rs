//! Geometry primitives used by the telemetry pipeline.
//!
//! All functions are pure. Coordinates are WGS84 degrees, distances are
//! metres.

pub mod deviation;

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A `[lat, lng]` pair in degrees.
///
/// Serialized as a two element array, which is how routes and geofences are
/// stored and sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether the pair is finite and within the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<[f64; 2]> for LatLng {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

impl From<LatLng> for [f64; 2] {
    fn from(p: LatLng) -> Self {
        [p.lat, p.lng]
    }
}

/// Great-circle distance between two points (haversine).
pub fn great_circle_distance_m(p1: LatLng, p2: LatLng) -> f64 {
    let (phi1, phi2) = (p1.lat.to_radians(), p2.lat.to_radians());
    let dphi = (p2.lat - p1.lat).to_radians();
    let dlambda = (p2.lng - p1.lng).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    // rounding can push `a` a hair above 1 for antipodal points
    2.0 * EARTH_RADIUS_M * a.min(1.0).sqrt().asin()
}

/// Distance from `p` to the segment `a`-`b`.
///
/// The projection parameter is computed treating degrees as planar
/// coordinates, then the great-circle distance to the projected point is
/// measured. This is an approximation that holds for route legs of a few
/// kilometres; it degrades near the poles and across the antimeridian.
pub fn distance_point_to_segment_m(p: LatLng, a: LatLng, b: LatLng) -> f64 {
    let (dx, dy) = (b.lng - a.lng, b.lat - a.lat);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return great_circle_distance_m(p, a);
    }

    let t = (((p.lng - a.lng) * dx + (p.lat - a.lat) * dy) / len_sq).clamp(0.0, 1.0);
    let projected = LatLng::new(a.lat + t * dy, a.lng + t * dx);
    great_circle_distance_m(p, projected)
}

/// Minimum distance from `p` to any leg of `route`.
///
/// Returns `None` when the route has fewer than two points, since there is no
/// line to measure against.
pub fn distance_point_to_polyline_m(p: LatLng, route: &[LatLng]) -> Option<f64> {
    route
        .windows(2)
        .map(|leg| distance_point_to_segment_m(p, leg[0], leg[1]))
        .min_by(f64::total_cmp)
}

pub fn point_in_circle(p: LatLng, center: LatLng, radius_m: f64) -> bool {
    great_circle_distance_m(p, center) <= radius_m
}

/// Even-odd ray casting test. The polygon is implicitly closed and its
/// vertices are treated as planar coordinates, which is fine for
/// geofence-sized areas.
pub fn point_in_polygon(p: LatLng, polygon: &[LatLng]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for (i, vi) in polygon.iter().enumerate() {
        let vj = polygon[j];
        if (vi.lat > p.lat) != (vj.lat > p.lat)
            && p.lng < (vj.lng - vi.lng) * (p.lat - vi.lat) / (vj.lat - vi.lat) + vi.lng
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}
