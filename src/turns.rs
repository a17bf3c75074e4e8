//! The rolling queue of upcoming turns.
//!
//! Turns are discovered incrementally: each cycle only scans the route
//! beyond the furthest turn already known, while the distances of known
//! turns are refreshed from the vehicle position. Turns are dropped once
//! the vehicle is past their end.

use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::advisor;
use crate::config::PredictionSettings;
use crate::curve::{self, CurveInfo};
use crate::decel;
use crate::geo::{haversine, path_length, road_distance, RoutePoint};
use crate::road_data::RoadDataProvider;
use crate::speed_cache::SpeedLimitCache;

/// Maximum number of turns kept in the queue.
pub const MAX_TURNS: usize = 10;

/// An upcoming turn with its advisory values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnPrediction {
    /// Distance by road from the vehicle to the turn start, in meters.
    pub distance: f64,
    /// Total heading change, in degrees.
    pub angle: f64,
    pub position: RoutePoint,
    /// Route index of the turn start.
    pub route_index: usize,
    /// Speed limit at the turn in km/h, if known.
    pub speed_limit: Option<f64>,
    /// Advised speed through the turn, in km/h.
    pub optimal_speed: f64,
    /// Deceleration needed when discovered inside the braking zone.
    pub required_deceleration: Option<f64>,
    pub curve: CurveInfo,
}

pub struct TurnPredictionManager<P> {
    turns: Vec<TurnPrediction>,
    speed_limits: SpeedLimitCache<P>,
}

impl<P: RoadDataProvider> TurnPredictionManager<P> {
    pub fn new(speed_limits: SpeedLimitCache<P>) -> Self {
        Self {
            turns: Vec::with_capacity(MAX_TURNS),
            speed_limits,
        }
    }

    /// Build a manager with its own speed-limit cache over `provider`.
    pub fn with_provider(provider: Arc<P>) -> Self {
        Self::new(SpeedLimitCache::new(provider))
    }

    /// Refresh the road distance of every known turn.
    ///
    /// A turn whose start is at or behind `current_index` is reported at
    /// distance 0 until it is pruned.
    pub fn update_turn_distances(
        &mut self,
        position: &RoutePoint,
        current_index: usize,
        route: &[RoutePoint],
    ) {
        for turn in &mut self.turns {
            turn.distance = if turn.curve.start_index > current_index {
                road_distance(position, current_index, turn.curve.start_index, route)
            } else {
                0.0
            };
        }
    }

    /// Drop turns that end before `current_index`.
    pub fn remove_past_turns(&mut self, current_index: usize) {
        let before = self.turns.len();
        self.turns.retain(|t| t.curve.end_index >= current_index);
        let removed = before - self.turns.len();
        if removed > 0 {
            debug!("Removed {removed} passed turn(s) before index {current_index}");
        }
    }

    /// Index to resume curve discovery from.
    ///
    /// One past the furthest known turn, or `closest_index` when the
    /// queue is empty.
    pub fn resume_index(&self, closest_index: usize) -> usize {
        self.turns
            .iter()
            .map(|t| t.curve.end_index + 1)
            .max()
            .map_or(closest_index, |next| next.max(closest_index))
    }

    /// Scan forward from `start_index` and append newly found turns.
    ///
    /// Stops at the end of the lookahead window, when the queue is full,
    /// or when the route has no further curve. `speed_limit_override`
    /// replaces the per-curve cached speed limit when given.
    ///
    /// Returns the number of turns added.
    #[allow(clippy::too_many_arguments)]
    pub async fn find_new_turns(
        &mut self,
        route: &[RoutePoint],
        start_index: usize,
        current_index: usize,
        position: &RoutePoint,
        settings: &PredictionSettings,
        current_speed: f64,
        speed_limit_override: Option<f64>,
    ) -> usize {
        if start_index >= route.len() {
            return 0;
        }

        // `distance` is measured up to route[anchor]
        let mut anchor = start_index;
        let mut scan_from = start_index;
        let mut distance = if start_index > current_index {
            road_distance(position, current_index, start_index, route)
        } else {
            haversine(position, &route[start_index])
        };
        let mut added = 0;

        debug!(
            "Scanning for curves from index {start_index} at {distance:.0} m (window {} m)",
            settings.prediction_distance
        );

        while distance <= settings.prediction_distance && self.turns.len() < MAX_TURNS {
            let Some(curve) = curve::detect(route, scan_from, settings) else {
                debug!("No further curve after index {scan_from}");
                break;
            };

            distance += path_length(route, anchor, curve.start_index);
            if distance > settings.prediction_distance {
                break;
            }

            let speed_limit = match speed_limit_override {
                Some(limit) => Some(limit),
                None => {
                    self.speed_limits
                        .get(curve.start_point.lat, curve.start_point.lon)
                        .await
                }
            };

            let advice = advisor::advise(
                current_speed,
                distance,
                &curve,
                speed_limit,
                settings.driving_style,
                settings,
            );

            let required_deceleration = if advice.start_braking_in_m <= 0.0 {
                decel::solve(current_speed, advice.optimal_curve_speed, distance)
            } else {
                None
            };

            anchor = curve.end_index;
            scan_from = curve.end_index + 1;
            let curve_length = curve.length_m;

            self.turns.push(TurnPrediction {
                distance,
                angle: curve.apex_angle,
                position: curve.start_point,
                route_index: curve.start_index,
                speed_limit,
                optimal_speed: advice.optimal_curve_speed,
                required_deceleration,
                curve,
            });
            added += 1;

            distance += curve_length;
        }

        debug!("Curve scan done: {added} added, {} queued", self.turns.len());
        added
    }

    /// Order the queue by distance, nearest first.
    pub fn sort_turns(&mut self) {
        self.turns.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }

    pub fn turns(&self) -> &[TurnPrediction] {
        &self.turns
    }

    /// The nearest turn, assuming the queue is sorted.
    pub fn next_turn(&self) -> Option<&TurnPrediction> {
        self.turns.first()
    }

    /// Forget every queued turn. The speed-limit cache is kept.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
