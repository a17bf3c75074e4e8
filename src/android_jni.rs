//! JNI bindings for the Android app.
//!
//! Each public function here corresponds to a `external fun` declaration
//! in RustBridge.kt. The function names follow JNI naming conventions:
//! Java_<package>_<class>_<method> with dots replaced by underscores.
//!
//! Functions returning a string never throw: failures come back as
//! `{"error": "..."}`.

use jni::objects::{JByteArray, JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;
use log::{info, warn};
use serde::Serialize;

use crate::advisor;
use crate::config::PredictionSettings;
use crate::curve::{self, CurveInfo};
use crate::error::AnalysisError;
use crate::geo::{path_length, RoutePoint};
use crate::gpx;

const LOG_TAG: &str = "roadahead";

/// A curve with the speed advised for it.
///
/// Output keys are snake_case like every other published type; only the
/// settings input is camelCase.
#[derive(Debug, Clone, Serialize)]
struct AnalyzedCurve {
    #[serde(flatten)]
    curve: CurveInfo,
    optimal_speed: f64,
}

#[derive(Debug, Clone, Serialize)]
struct RouteAnalysis {
    point_count: usize,
    length_m: f64,
    curves: Vec<AnalyzedCurve>,
}

fn analyze(route: &[RoutePoint], settings: &PredictionSettings) -> RouteAnalysis {
    let curves = curve::detect_all(route, settings)
        .into_iter()
        .map(|curve| AnalyzedCurve {
            optimal_speed: advisor::optimal_curve_speed(
                curve.apex_angle,
                None,
                settings.driving_style,
                settings,
            ),
            curve,
        })
        .collect();

    RouteAnalysis {
        point_count: route.len(),
        length_m: path_length(route, 0, route.len()),
        curves,
    }
}

/// Empty or missing settings fall back to defaults.
fn parse_settings(settings_json: &str) -> Result<PredictionSettings, AnalysisError> {
    if settings_json.trim().is_empty() {
        return Ok(PredictionSettings::default());
    }
    Ok(PredictionSettings::from_json(settings_json)?)
}

fn analyze_route_json(route_json: &str, settings_json: &str) -> Result<String, AnalysisError> {
    let route = gpx::route_from_json(route_json)?;
    let settings = parse_settings(settings_json)?;
    Ok(serde_json::to_string(&analyze(&route, &settings))?)
}

fn analyze_gpx_bytes(data: &[u8], settings_json: &str) -> Result<String, AnalysisError> {
    let route = gpx::route_from_bytes(data)?;
    let settings = parse_settings(settings_json)?;
    Ok(serde_json::to_string(&analyze(&route, &settings))?)
}

fn error_json(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

fn respond(result: Result<String, AnalysisError>) -> String {
    match result {
        Ok(json) => json,
        Err(e) => {
            warn!("Route analysis failed: {e}");
            error_json(&e.to_string())
        }
    }
}

fn read_string(env: &mut JNIEnv, value: &JString) -> Option<String> {
    if value.is_null() {
        return Some(String::new());
    }
    env.get_string(value).ok().map(Into::into)
}

fn to_jstring(env: &mut JNIEnv, value: &str) -> jstring {
    match env.new_string(value) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            warn!("Failed to create Java string: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Returns the library version.
/// Maps to: RustBridge.version() -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_roadahead_core_RustBridge_version(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    to_jstring(&mut env, crate::VERSION)
}

/// Routes `log` output to logcat. Safe to call more than once.
/// Maps to: RustBridge.initLogging()
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_roadahead_core_RustBridge_initLogging(
    _env: JNIEnv,
    _class: JClass,
) {
    #[cfg(target_os = "android")]
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Info)
            .with_tag(LOG_TAG),
    );
    info!("{LOG_TAG} {} ready", crate::VERSION);
}

/// Detects curves on a route given as JSON points.
/// Maps to: RustBridge.analyzeRoute(routeJson: String, settingsJson: String) -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_roadahead_core_RustBridge_analyzeRoute(
    mut env: JNIEnv,
    _class: JClass,
    route_json: JString,
    settings_json: JString,
) -> jstring {
    let response = match (
        read_string(&mut env, &route_json),
        read_string(&mut env, &settings_json),
    ) {
        (Some(route), Some(settings)) => respond(analyze_route_json(&route, &settings)),
        _ => error_json("invalid string argument"),
    };
    to_jstring(&mut env, &response)
}

/// Detects curves on the route or track in a GPX file.
/// Maps to: RustBridge.analyzeGpx(data: ByteArray, settingsJson: String) -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_roadahead_core_RustBridge_analyzeGpx(
    mut env: JNIEnv,
    _class: JClass,
    data: JByteArray,
    settings_json: JString,
) -> jstring {
    let bytes = env.convert_byte_array(&data).ok();
    let settings = read_string(&mut env, &settings_json);

    let response = match (bytes, settings) {
        (Some(bytes), Some(settings)) => respond(analyze_gpx_bytes(&bytes, &settings)),
        _ => error_json("invalid GPX byte array"),
    };
    to_jstring(&mut env, &response)
}

#[cfg(test)]
mod tests {
    use super::*;

    const L_ROUTE: &str = r#"[
        {"lat": 48.0, "lon": 16.0},
        {"lat": 48.001, "lon": 16.0},
        {"lat": 48.002, "lon": 16.0},
        {"lat": 48.002, "lon": 16.0015},
        {"lat": 48.002, "lon": 16.003}
    ]"#;

    #[test]
    fn analyze_route_reports_curves() {
        let json = analyze_route_json(L_ROUTE, "").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["point_count"], 5);
        assert!(parsed["length_m"].as_f64().unwrap() > 400.0);

        let curves = parsed["curves"].as_array().unwrap();
        assert_eq!(curves.len(), 1);
        for key in curves[0].as_object().unwrap().keys() {
            assert!(!key.chars().any(|c| c.is_ascii_uppercase()), "mixed key style: {key}");
        }
        assert_eq!(curves[0]["start_index"], 2);
        assert_eq!(curves[0]["direction"], "right");
        assert!(curves[0]["optimal_speed"].as_f64().unwrap() < 90.0);
    }

    #[test]
    fn driving_style_changes_advised_speed() {
        let normal = analyze(
            &gpx::route_from_json(L_ROUTE).unwrap(),
            &PredictionSettings::default(),
        );
        let prudent = analyze_route_json(L_ROUTE, r#"{"drivingStyle": "prudent"}"#).unwrap();
        let prudent: serde_json::Value = serde_json::from_str(&prudent).unwrap();

        assert!(prudent["curves"][0]["optimal_speed"].as_f64().unwrap() < normal.curves[0].optimal_speed);
    }

    #[test]
    fn analyze_gpx_uses_route_points() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
  <rte>
    <rtept lat="48.0" lon="16.0"></rtept>
    <rtept lat="48.001" lon="16.0"></rtept>
    <rtept lat="48.002" lon="16.0"></rtept>
  </rte>
</gpx>"#;

        let json = analyze_gpx_bytes(gpx.as_bytes(), "{}").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["point_count"], 3);
        assert!(parsed["curves"].as_array().unwrap().is_empty());
    }

    #[test]
    fn failures_become_error_objects() {
        let bad_route = respond(analyze_route_json("not json", ""));
        let parsed: serde_json::Value = serde_json::from_str(&bad_route).unwrap();
        assert!(parsed["error"].is_string());

        let bad_settings = respond(analyze_route_json(L_ROUTE, r#"{"minTurnAngle": -5}"#));
        let parsed: serde_json::Value = serde_json::from_str(&bad_settings).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("minTurnAngle"));
    }
}
