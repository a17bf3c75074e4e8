//! Curve detection on a route polyline.
//!
//! A curve is a run of consecutive route vertices that all turn the
//! same way. The detector walks forward from a start index and returns
//! the first run whose total heading change and arc length fall inside
//! the configured envelope. Callers continue scanning from
//! `end_index + 1`.

use serde::Serialize;

use crate::config::PredictionSettings;
use crate::geo::{bearing, haversine, normalize_angle, RoutePoint};

/// Smallest heading change at a vertex that counts as bending, in degrees.
const BEND_THRESHOLD_DEG: f64 = 2.0;

/// Segments shorter than this have no usable bearing, in meters.
const MIN_SEGMENT_M: f64 = 0.5;

/// Which way a curve turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveDirection {
    Left,
    Right,
}

/// A detected curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveInfo {
    /// Route index where the heading starts to change.
    pub start_index: usize,
    /// Route index where the new heading is established.
    pub end_index: usize,
    /// Vertex with the largest local heading change.
    pub apex_index: usize,
    /// Total heading change over the curve, in degrees (always >= 0).
    pub apex_angle: f64,
    pub direction: CurveDirection,
    /// Arc length from start to end, in meters.
    pub length_m: f64,
    pub start_point: RoutePoint,
}

/// Signed heading change at interior vertex `i`, in degrees.
fn heading_change(route: &[RoutePoint], i: usize) -> f64 {
    let (a, b, c) = (&route[i - 1], &route[i], &route[i + 1]);
    if haversine(a, b) < MIN_SEGMENT_M || haversine(b, c) < MIN_SEGMENT_M {
        return 0.0;
    }
    normalize_angle(bearing(b, c) - bearing(a, b))
}

/// Find the next curve at or after `start_index`.
///
/// Returns None when the route ends before a qualifying curve.
pub fn detect(
    route: &[RoutePoint],
    start_index: usize,
    settings: &PredictionSettings,
) -> Option<CurveInfo> {
    if route.len() < 3 {
        return None;
    }

    let last_vertex = route.len() - 2;
    let mut i = start_index.max(1);

    while i <= last_vertex {
        let delta = heading_change(route, i);
        if delta.abs() < BEND_THRESHOLD_DEG {
            i += 1;
            continue;
        }

        let span = grow_span(route, i, delta, settings);
        if let Some(curve) = span.curve {
            return Some(curve);
        }
        i = span.last_vertex + 1;
    }

    None
}

/// Detect every curve along the route, in route order.
pub fn detect_all(route: &[RoutePoint], settings: &PredictionSettings) -> Vec<CurveInfo> {
    let mut curves = Vec::new();
    let mut next = 0;

    while let Some(curve) = detect(route, next, settings) {
        next = curve.end_index + 1;
        curves.push(curve);
    }

    curves
}

struct Span {
    /// Last bending vertex covered by the span.
    last_vertex: usize,
    /// The span as a curve, if it qualifies.
    curve: Option<CurveInfo>,
}

/// Extend a candidate curve opened at vertex `open`.
fn grow_span(
    route: &[RoutePoint],
    open: usize,
    first_delta: f64,
    settings: &PredictionSettings,
) -> Span {
    let sign = first_delta.signum();
    let mut length = haversine(&route[open], &route[open + 1]);

    if first_delta.abs() > settings.max_turn_angle || length > settings.max_turn_distance {
        return Span { last_vertex: open, curve: None };
    }

    let mut cumulative = first_delta;
    let mut apex = open;
    let mut apex_delta = first_delta.abs();
    let mut last = open;

    for j in open + 1..=route.len() - 2 {
        let delta = heading_change(route, j);
        if delta.abs() < BEND_THRESHOLD_DEG || delta.signum() != sign {
            break;
        }

        let next_cumulative = cumulative + delta;
        let next_length = length + haversine(&route[j], &route[j + 1]);
        if next_cumulative.abs() > settings.max_turn_angle
            || next_length > settings.max_turn_distance
        {
            break;
        }

        cumulative = next_cumulative;
        length = next_length;
        if delta.abs() > apex_delta {
            apex = j;
            apex_delta = delta.abs();
        }
        last = j;
    }

    let angle = cumulative.abs();
    if angle < settings.min_turn_angle || length < settings.min_turn_distance {
        return Span { last_vertex: last, curve: None };
    }

    Span {
        last_vertex: last,
        curve: Some(CurveInfo {
            start_index: open,
            end_index: last + 1,
            apex_index: apex,
            apex_angle: angle,
            direction: if sign > 0.0 { CurveDirection::Right } else { CurveDirection::Left },
            length_m: length,
            start_point: route[open],
        }),
    }
}
