//! Curve prediction and road-state tracking for a moving vehicle.
//!
//! The [`coordinator::PredictionCoordinator`] ties the pieces together:
//! it samples telemetry on a fixed period, tracks progress along the
//! active route, keeps a queue of upcoming turns with advised speeds and
//! asks for a new route when the vehicle leaves the current one.

pub mod advisor;
pub mod android_jni;
pub mod config;
pub mod coordinator;
pub mod curve;
pub mod decel;
pub mod error;
pub mod geo;
pub mod gpx;
pub mod progress;
pub mod road_data;
pub mod road_state;
pub mod speed_cache;
pub mod turns;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
