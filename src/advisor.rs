//! Cornering speed and braking advice for a detected curve.

use serde::Serialize;

use crate::config::{DrivingStyle, PredictionSettings};
use crate::curve::CurveInfo;

/// Advice for approaching one curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurveAdvice {
    /// Speed to hold through the curve, in km/h.
    pub optimal_curve_speed: f64,
    /// Distance needed to slow down to the curve speed, in meters.
    pub braking_distance: f64,
    /// Distance left before braking must start, in meters.
    ///
    /// Negative when the vehicle is already inside the braking zone.
    pub start_braking_in_m: f64,
}

/// Lateral grip multiplier applied to the base curve speed.
fn grip(style: DrivingStyle) -> f64 {
    match style {
        DrivingStyle::Prudent => 0.85,
        DrivingStyle::Normal => 1.0,
        DrivingStyle::Sportif => 1.15,
    }
}

/// Comfortable longitudinal deceleration, in m/s².
fn comfort_deceleration(style: DrivingStyle) -> f64 {
    match style {
        DrivingStyle::Prudent => 2.0,
        DrivingStyle::Normal => 2.5,
        DrivingStyle::Sportif => 3.5,
    }
}

/// Speed to hold through a curve of `apex_angle` degrees, in km/h.
///
/// Scales the reference speed by the cosine of half the heading change
/// (a hairpin tends to zero), floors it at the minimum turn speed, then
/// applies the style's grip. The speed limit wins when lower.
pub fn optimal_curve_speed(
    apex_angle: f64,
    speed_limit: Option<f64>,
    style: DrivingStyle,
    settings: &PredictionSettings,
) -> f64 {
    let half = (apex_angle.clamp(0.0, 180.0) / 2.0).to_radians();
    let base = (settings.default_speed * half.cos()).max(settings.min_turn_speed);
    let speed = base * grip(style);

    match speed_limit {
        Some(limit) if limit > 0.0 && limit < speed => limit,
        _ => speed,
    }
}

/// Distance needed to brake from `current_speed` to `target_speed` (km/h).
///
/// Zero when the vehicle is already slow enough.
pub fn braking_distance(current_speed: f64, target_speed: f64, style: DrivingStyle) -> f64 {
    if current_speed <= target_speed {
        return 0.0;
    }
    let v = current_speed / 3.6;
    let v_target = target_speed / 3.6;
    (v * v - v_target * v_target) / (2.0 * comfort_deceleration(style))
}

/// Compute curve speed and braking distance for a curve ahead.
pub fn advise(
    current_speed: f64,
    distance_to_curve: f64,
    curve: &CurveInfo,
    speed_limit: Option<f64>,
    style: DrivingStyle,
    settings: &PredictionSettings,
) -> CurveAdvice {
    let optimal = optimal_curve_speed(curve.apex_angle, speed_limit, style, settings);
    let braking = braking_distance(current_speed, optimal, style);
    CurveAdvice {
        optimal_curve_speed: optimal,
        braking_distance: braking,
        start_braking_in_m: distance_to_curve - braking,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurveDirection;
    use crate::geo::RoutePoint;

    fn curve(angle: f64) -> CurveInfo {
        CurveInfo {
            start_index: 1,
            end_index: 2,
            apex_index: 1,
            apex_angle: angle,
            direction: CurveDirection::Right,
            length_m: 40.0,
            start_point: RoutePoint::new(48.0, 16.0),
        }
    }

    #[test]
    fn sharper_curves_are_slower() {
        let s = PredictionSettings::default();
        let gentle = optimal_curve_speed(30.0, None, DrivingStyle::Normal, &s);
        let sharp = optimal_curve_speed(90.0, None, DrivingStyle::Normal, &s);
        assert!(sharp < gentle, "{sharp} >= {gentle}");
    }

    #[test]
    fn style_ordering_holds() {
        let s = PredictionSettings::default();
        for angle in [20.0, 60.0, 120.0, 180.0] {
            let prudent = optimal_curve_speed(angle, None, DrivingStyle::Prudent, &s);
            let normal = optimal_curve_speed(angle, None, DrivingStyle::Normal, &s);
            let sportif = optimal_curve_speed(angle, None, DrivingStyle::Sportif, &s);
            assert!(prudent < normal && normal < sportif, "angle {angle}");
        }
    }

    #[test]
    fn hairpin_is_floored_at_min_turn_speed() {
        let s = PredictionSettings::default();
        let v = optimal_curve_speed(180.0, None, DrivingStyle::Normal, &s);
        assert!((v - s.min_turn_speed).abs() < 1e-9);
    }

    #[test]
    fn lower_speed_limit_clamps() {
        let s = PredictionSettings::default();
        let v = optimal_curve_speed(20.0, Some(50.0), DrivingStyle::Sportif, &s);
        assert_eq!(v, 50.0);
        let unclamped = optimal_curve_speed(90.0, Some(130.0), DrivingStyle::Normal, &s);
        assert!(unclamped < 130.0);
    }

    #[test]
    fn no_braking_when_already_slow() {
        let advice = advise(20.0, 150.0, &curve(90.0), None, DrivingStyle::Normal,
            &PredictionSettings::default());
        assert_eq!(advice.braking_distance, 0.0);
        assert_eq!(advice.start_braking_in_m, 150.0);
    }

    #[test]
    fn late_approach_is_inside_braking_zone() {
        let advice = advise(110.0, 30.0, &curve(120.0), None, DrivingStyle::Normal,
            &PredictionSettings::default());
        assert!(advice.braking_distance > 30.0);
        assert!(advice.start_braking_in_m < 0.0);
    }

    #[test]
    fn braking_distance_from_kinematics() {
        // 90 km/h -> 54 km/h at 2.5 m/s²: (25² - 15²) / 5 = 80 m
        let d = braking_distance(90.0, 54.0, DrivingStyle::Normal);
        assert!((d - 80.0).abs() < 1e-6, "got {d}");
        assert!(braking_distance(90.0, 54.0, DrivingStyle::Prudent) > d);
    }
}
