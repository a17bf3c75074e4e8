//! Prediction settings.
//!
//! The settings are edited and persisted by the host application; this
//! core only reads them. The JSON form uses camelCase keys so the same
//! document can be shared with the settings screen.

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// How aggressively the driver wants to corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivingStyle {
    Prudent,
    #[default]
    Normal,
    Sportif,
}

/// Which road-data backend to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoadDataSelection {
    /// Fixed answers for every position.
    Static {
        on_road: bool,
        speed_limit: Option<f64>,
    },
    /// Derived from proximity to a reference polyline (usually the route).
    Corridor {
        half_width_m: f64,
        speed_limit: Option<f64>,
    },
    /// No backend configured; every lookup fails.
    Unavailable,
}

impl Default for RoadDataSelection {
    fn default() -> Self {
        RoadDataSelection::Corridor {
            half_width_m: 25.0,
            speed_limit: None,
        }
    }
}

/// Read-only configuration for turn detection and advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PredictionSettings {
    /// Minimum cumulative heading change for a curve, in degrees.
    pub min_turn_angle: f64,
    /// Maximum cumulative heading change for a single curve, in degrees.
    pub max_turn_angle: f64,
    /// Lowest advised speed in a tight curve, in km/h.
    pub min_turn_speed: f64,
    /// Reference cruising speed used to scale curve speeds, in km/h.
    pub default_speed: f64,
    /// Minimum arc length of a curve, in meters.
    pub min_turn_distance: f64,
    /// Maximum arc length of a single curve, in meters.
    pub max_turn_distance: f64,
    /// Lookahead window for curve discovery, in meters.
    pub prediction_distance: f64,
    pub driving_style: DrivingStyle,
    /// Coordinator tick period, in milliseconds.
    pub update_interval_ms: u64,
    /// Deviation beyond which the vehicle counts as off-route, in meters.
    pub off_route_distance: f64,
    pub road_data: RoadDataSelection,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            min_turn_angle: 20.0,
            max_turn_angle: 180.0,
            min_turn_speed: 25.0,
            default_speed: 90.0,
            min_turn_distance: 5.0,
            max_turn_distance: 300.0,
            prediction_distance: 1000.0,
            driving_style: DrivingStyle::Normal,
            update_interval_ms: 1000,
            off_route_distance: 50.0,
            road_data: RoadDataSelection::default(),
        }
    }
}

impl PredictionSettings {
    /// Parse settings from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges that the detector and advisor rely on.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.min_turn_angle > 0.0 && self.min_turn_angle <= self.max_turn_angle) {
            return Err(SettingsError::Invalid {
                field: "minTurnAngle",
                reason: format!(
                    "must be in (0, maxTurnAngle={}], got {}",
                    self.max_turn_angle, self.min_turn_angle
                ),
            });
        }
        if self.min_turn_distance < 0.0 || self.min_turn_distance > self.max_turn_distance {
            return Err(SettingsError::Invalid {
                field: "minTurnDistance",
                reason: format!(
                    "must be in [0, maxTurnDistance={}], got {}",
                    self.max_turn_distance, self.min_turn_distance
                ),
            });
        }
        if self.prediction_distance <= 0.0 {
            return Err(SettingsError::Invalid {
                field: "predictionDistance",
                reason: format!("must be positive, got {}", self.prediction_distance),
            });
        }
        if self.min_turn_speed <= 0.0 || self.default_speed < self.min_turn_speed {
            return Err(SettingsError::Invalid {
                field: "minTurnSpeed",
                reason: format!(
                    "must be in (0, defaultSpeed={}], got {}",
                    self.default_speed, self.min_turn_speed
                ),
            });
        }
        if self.update_interval_ms == 0 {
            return Err(SettingsError::Invalid {
                field: "updateIntervalMs",
                reason: "must be at least 1 ms".to_string(),
            });
        }
        Ok(())
    }
}
