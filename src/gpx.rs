//! Route loading from GPX 1.1 and JSON.
//!
//! A GPX file may carry planned routes, recorded tracks, or both. The
//! first route with at least two points is preferred; otherwise the
//! first such track is used with its segments flattened in order.

use std::io::Read;

use log::debug;

use crate::error::RouteFileError;
use crate::geo::RoutePoint;

fn to_route_point(wp: &gpx::Waypoint) -> RoutePoint {
    let p = wp.point();
    RoutePoint::new(p.y(), p.x())
}

/// Read a route from any GPX reader.
pub fn read_route<R: Read>(reader: R) -> Result<Vec<RoutePoint>, RouteFileError> {
    let gpx = gpx::read(reader).map_err(|e| RouteFileError::Gpx(e.to_string()))?;

    let planned = gpx
        .routes
        .iter()
        .map(|r| r.points.iter().map(to_route_point).collect::<Vec<_>>())
        .find(|points| points.len() >= 2);

    if let Some(points) = planned {
        debug!("Loaded GPX route with {} points", points.len());
        return Ok(points);
    }

    let recorded = gpx
        .tracks
        .iter()
        .map(|t| {
            t.segments
                .iter()
                .flat_map(|seg| seg.points.iter())
                .map(to_route_point)
                .collect::<Vec<_>>()
        })
        .find(|points| points.len() >= 2);

    match recorded {
        Some(points) => {
            debug!("Loaded GPX track with {} points", points.len());
            Ok(points)
        }
        None => Err(RouteFileError::NoRoute),
    }
}

/// Read a route from GPX bytes. Convenience wrapper for JNI.
pub fn route_from_bytes(data: &[u8]) -> Result<Vec<RoutePoint>, RouteFileError> {
    read_route(data)
}

/// Parse a route given as a JSON array of `{"lat": .., "lon": ..}`.
///
/// No minimum length is enforced here; short routes simply yield no
/// curves or predictions.
pub fn route_from_json(json: &str) -> Result<Vec<RoutePoint>, RouteFileError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Test Track</name>
    <trkseg>
      <trkpt lat="48.2082" lon="16.3738"><ele>171</ele></trkpt>
      <trkpt lat="48.2090" lon="16.3750"><ele>173</ele></trkpt>
      <trkpt lat="48.2100" lon="16.3760"><ele>170</ele></trkpt>
    </trkseg>
  </trk>
  <rte>
    <name>Test Route</name>
    <rtept lat="48.2000" lon="16.3500"></rtept>
    <rtept lat="48.2100" lon="16.3600"></rtept>
  </rte>
</gpx>"#;

    fn gpx_doc(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
{body}
</gpx>"#
        )
    }

    #[test]
    fn route_is_preferred_over_track() {
        let route = route_from_bytes(MINIMAL_GPX.as_bytes()).unwrap();

        assert_eq!(route.len(), 2);
        assert!((route[0].lat - 48.2).abs() < 1e-9);
        assert!((route[0].lon - 16.35).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_flattened_track() {
        let gpx = gpx_doc(
            r#"<trk>
    <trkseg>
      <trkpt lat="48.0" lon="16.0"></trkpt>
      <trkpt lat="48.1" lon="16.1"></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="48.2" lon="16.2"></trkpt>
    </trkseg>
  </trk>"#,
        );

        let route = route_from_bytes(gpx.as_bytes()).unwrap();
        assert_eq!(route.len(), 3);
        assert_eq!(route[2], RoutePoint::new(48.2, 16.2));
    }

    #[test]
    fn single_point_route_is_skipped() {
        let gpx = gpx_doc(
            r#"<rte><rtept lat="48.0" lon="16.0"></rtept></rte>
  <trk><trkseg>
    <trkpt lat="47.0" lon="15.0"></trkpt>
    <trkpt lat="47.1" lon="15.0"></trkpt>
  </trkseg></trk>"#,
        );

        let route = route_from_bytes(gpx.as_bytes()).unwrap();
        assert_eq!(route[0], RoutePoint::new(47.0, 15.0));
    }

    #[test]
    fn empty_gpx_has_no_route() {
        let result = route_from_bytes(gpx_doc("").as_bytes());
        assert!(matches!(result, Err(RouteFileError::NoRoute)));
    }

    #[test]
    fn invalid_xml_returns_error() {
        let result = route_from_bytes(b"not xml at all");
        assert!(matches!(result, Err(RouteFileError::Gpx(_))));
    }

    #[test]
    fn json_route() {
        let route = route_from_json(r#"[{"lat": 48.0, "lon": 16.0}, {"lat": 48.001, "lon": 16.0}]"#)
            .unwrap();
        assert_eq!(route, vec![RoutePoint::new(48.0, 16.0), RoutePoint::new(48.001, 16.0)]);

        assert!(matches!(route_from_json("{}"), Err(RouteFileError::Json(_))));
    }
}
