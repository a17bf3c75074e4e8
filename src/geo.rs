//! Geodesic helpers shared by the prediction engine.
//!
//! All coordinates use WGS84 (lat/lon in degrees) and all distances
//! are in meters.

use serde::{Deserialize, Serialize};

/// A single point of a planned route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lon: f64,
}

impl RoutePoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Earth radius in meters (WGS84 mean).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two points in meters.
pub fn haversine(a: &RoutePoint, b: &RoutePoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial bearing from point A to point B in degrees [0, 360).
pub fn bearing(a: &RoutePoint, b: &RoutePoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    let bearing = y.atan2(x).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Normalize an angle difference to (-180, 180].
///
/// Positive values are right turns, negative values left turns.
pub fn normalize_angle(mut angle: f64) -> f64 {
    while angle > 180.0 {
        angle -= 360.0;
    }
    while angle <= -180.0 {
        angle += 360.0;
    }
    angle
}

/// Length of the route between two indices, following the points.
///
/// Returns 0 when `to <= from`. Indices past the end are clamped.
pub fn path_length(route: &[RoutePoint], from: usize, to: usize) -> f64 {
    if route.is_empty() {
        return 0.0;
    }
    let to = to.min(route.len() - 1);
    if to <= from {
        return 0.0;
    }

    route[from..=to]
        .windows(2)
        .map(|w| haversine(&w[0], &w[1]))
        .sum()
}

/// Distance by road from a free position to a route index.
///
/// The position is first joined to `current_index`, then the route is
/// followed up to `target_index`.
pub fn road_distance(
    position: &RoutePoint,
    current_index: usize,
    target_index: usize,
    route: &[RoutePoint],
) -> f64 {
    match route.get(current_index) {
        Some(anchor) => {
            haversine(position, anchor) + path_length(route, current_index, target_index)
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> RoutePoint {
        RoutePoint::new(lat, lon)
    }

    #[test]
    fn haversine_same_point() {
        let p = pt(48.2082, 16.3738);
        assert!((haversine(&p, &p)).abs() < 0.01);
    }

    #[test]
    fn haversine_known_distance() {
        // Paris to Versailles ~17 km
        let paris = pt(48.8566, 2.3522);
        let versailles = pt(48.8049, 2.1204);
        let dist = haversine(&paris, &versailles);
        assert!(dist > 16_000.0 && dist < 19_000.0,
            "Expected ~17 km, got {:.0} m", dist);
    }

    #[test]
    fn bearing_east() {
        let b = bearing(&pt(0.0, 0.0), &pt(0.0, 1.0));
        assert!((b - 90.0).abs() < 0.1, "Expected ~90, got {b}");
    }

    #[test]
    fn bearing_north() {
        let b = bearing(&pt(0.0, 0.0), &pt(1.0, 0.0));
        assert!(b.abs() < 0.1, "Expected ~0, got {b}");
    }

    #[test]
    fn normalize_wraps_both_ways() {
        assert!((normalize_angle(270.0) + 90.0).abs() < 1e-9);
        assert!((normalize_angle(-270.0) - 90.0).abs() < 1e-9);
        assert!((normalize_angle(180.0) - 180.0).abs() < 1e-9);
        assert!((normalize_angle(-180.0) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn path_length_follows_points() {
        let route = vec![pt(0.0, 0.0), pt(0.0, 0.001), pt(0.0, 0.002)];
        let full = path_length(&route, 0, 2);
        let half = path_length(&route, 1, 2);
        assert!((full - 2.0 * half).abs() < 0.01);
        assert_eq!(path_length(&route, 2, 1), 0.0);
        assert!((path_length(&route, 0, 99) - full).abs() < 1e-9);
    }

    #[test]
    fn road_distance_joins_position_first() {
        let route = vec![pt(0.0, 0.0), pt(0.0, 0.001), pt(0.0, 0.002)];
        let pos = pt(0.0, 0.0005);
        let d = road_distance(&pos, 1, 2, &route);
        let expected = haversine(&pos, &route[1]) + haversine(&route[1], &route[2]);
        assert!((d - expected).abs() < 1e-9);
        assert_eq!(road_distance(&pos, 10, 12, &route), 0.0);
    }
}
