//! Error types for the prediction core.

use thiserror::Error;

/// Failure of a single road-data lookup.
///
/// All variants are transient from the engine's point of view: the
/// caller keeps its previous state and tries again later.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoadDataError {
    #[error("road data backend unavailable: {0}")]
    Unavailable(String),

    #[error("road data lookup timed out")]
    Timeout,

    #[error("invalid road data response: {0}")]
    InvalidResponse(String),
}

/// Errors raised while loading a route from a file or payload.
#[derive(Debug, Error)]
pub enum RouteFileError {
    #[error("GPX parse error: {0}")]
    Gpx(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no route or track with at least 2 points")]
    NoRoute,
}

/// Errors raised while reading prediction settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors from one-shot route analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Route(#[from] RouteFileError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("JSON serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}
