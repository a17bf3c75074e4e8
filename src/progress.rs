//! Route progress tracking.
//!
//! Locates the vehicle on the active route by nearest route point and
//! decides whether it has left the route.

use serde::Serialize;

use crate::config::PredictionSettings;
use crate::geo::{haversine, RoutePoint};

/// Where the vehicle is relative to the route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteProgress {
    /// Index of the nearest route point (earliest on ties).
    pub closest_index: usize,
    /// Distance from the vehicle to that point, in meters.
    pub deviation_m: f64,
}

/// Find the route point closest to `position`.
///
/// Linear scan; ties keep the earliest index so progress never jumps
/// ahead on a route that doubles back on itself.
///
/// Returns None for an empty route.
pub fn find_closest(position: &RoutePoint, route: &[RoutePoint]) -> Option<RouteProgress> {
    let mut best: Option<RouteProgress> = None;

    for (i, point) in route.iter().enumerate() {
        let dist = haversine(position, point);

        let is_better = match &best {
            Some(prev) => dist < prev.deviation_m,
            None => true,
        };

        if is_better {
            best = Some(RouteProgress {
                closest_index: i,
                deviation_m: dist,
            });
        }
    }

    best
}

/// Whether a deviation exceeds the configured off-route threshold.
pub fn is_off_route(deviation_m: f64, settings: &PredictionSettings) -> bool {
    deviation_m > settings.off_route_distance
}
