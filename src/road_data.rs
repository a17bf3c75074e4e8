//! Road-data lookups.
//!
//! [`RoadDataProvider`] is the contract the engine needs from a road
//! database: whether a point lies on a road, the posted speed limit, and
//! the geometry of the current road. [`RoadDataBackend`] enumerates the
//! backends shipped with the core and [`RoadDataService`] holds the
//! active one, swappable at runtime.

use std::future::Future;
use std::sync::{Arc, RwLock};

use log::info;

use crate::config::RoadDataSelection;
use crate::error::RoadDataError;
use crate::geo::{haversine, RoutePoint};

/// Async road-data lookups. All calls may fail.
pub trait RoadDataProvider: Send + Sync {
    /// Whether the point lies on a drivable road.
    fn is_point_on_road(
        &self,
        lat: f64,
        lon: f64,
    ) -> impl Future<Output = Result<bool, RoadDataError>> + Send;

    /// Posted speed limit at the point in km/h, if known.
    fn speed_limit(
        &self,
        lat: f64,
        lon: f64,
    ) -> impl Future<Output = Result<Option<f64>, RoadDataError>> + Send;

    /// Geometry of the road the point lies on.
    fn current_road_segment(
        &self,
        lat: f64,
        lon: f64,
    ) -> impl Future<Output = Result<Vec<RoutePoint>, RoadDataError>> + Send;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Same answers everywhere. Used for simulation and bench setups.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticRoadData {
    pub on_road: bool,
    pub speed_limit: Option<f64>,
}

impl RoadDataProvider for StaticRoadData {
    async fn is_point_on_road(&self, _lat: f64, _lon: f64) -> Result<bool, RoadDataError> {
        Ok(self.on_road)
    }

    async fn speed_limit(&self, _lat: f64, _lon: f64) -> Result<Option<f64>, RoadDataError> {
        Ok(self.speed_limit)
    }

    async fn current_road_segment(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<RoutePoint>, RoadDataError> {
        Ok(vec![RoutePoint::new(lat, lon)])
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Offline backend that treats a reference polyline as the road network.
///
/// A point is on the road when it lies within `half_width_m` of the
/// polyline. Speed limits come from configuration, not from the data.
#[derive(Debug, Clone)]
pub struct CorridorRoadData {
    reference: Arc<[RoutePoint]>,
    half_width_m: f64,
    speed_limit: Option<f64>,
}

/// Nearest segment of a polyline to a point.
struct SegmentHit {
    segment_index: usize,
    distance_m: f64,
}

impl CorridorRoadData {
    pub fn new(reference: Arc<[RoutePoint]>, half_width_m: f64, speed_limit: Option<f64>) -> Self {
        Self {
            reference,
            half_width_m,
            speed_limit,
        }
    }

    fn nearest_segment(&self, lat: f64, lon: f64) -> Result<SegmentHit, RoadDataError> {
        if self.reference.len() < 2 {
            return Err(RoadDataError::Unavailable(
                "corridor has no reference geometry".to_string(),
            ));
        }

        let position = RoutePoint::new(lat, lon);
        let mut best: Option<SegmentHit> = None;

        for (i, segment) in self.reference.windows(2).enumerate() {
            let projected = project_on_segment(&position, &segment[0], &segment[1]);
            let dist = haversine(&position, &projected);

            let is_better = match &best {
                Some(prev) => dist < prev.distance_m,
                None => true,
            };

            if is_better {
                best = Some(SegmentHit {
                    segment_index: i,
                    distance_m: dist,
                });
            }
        }

        best.ok_or_else(|| RoadDataError::InvalidResponse("empty corridor".to_string()))
    }
}

impl RoadDataProvider for CorridorRoadData {
    async fn is_point_on_road(&self, lat: f64, lon: f64) -> Result<bool, RoadDataError> {
        let hit = self.nearest_segment(lat, lon)?;
        Ok(hit.distance_m <= self.half_width_m)
    }

    async fn speed_limit(&self, lat: f64, lon: f64) -> Result<Option<f64>, RoadDataError> {
        let hit = self.nearest_segment(lat, lon)?;
        if hit.distance_m <= self.half_width_m {
            Ok(self.speed_limit)
        } else {
            Ok(None)
        }
    }

    async fn current_road_segment(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<RoutePoint>, RoadDataError> {
        let hit = self.nearest_segment(lat, lon)?;
        if hit.distance_m > self.half_width_m {
            return Ok(Vec::new());
        }

        // The matched segment plus one neighbour on each side
        let from = hit.segment_index.saturating_sub(1);
        let to = (hit.segment_index + 2).min(self.reference.len() - 1);
        Ok(self.reference[from..=to].to_vec())
    }

    fn name(&self) -> &str {
        "corridor"
    }
}

/// Project a point onto a line segment defined by two endpoints.
///
/// Uses a planar approximation scaled by latitude cosine, which is
/// accurate enough for short segments (< 10 km).
fn project_on_segment(p: &RoutePoint, a: &RoutePoint, b: &RoutePoint) -> RoutePoint {
    let cos_lat = ((a.lat + b.lat) / 2.0).to_radians().cos();

    let dx = (b.lon - a.lon) * cos_lat;
    let dy = b.lat - a.lat;
    let px = (p.lon - a.lon) * cos_lat;
    let py = p.lat - a.lat;

    let seg_len_sq = dx * dx + dy * dy;

    if seg_len_sq < 1e-20 {
        return *a;
    }

    let t = ((px * dx + py * dy) / seg_len_sq).clamp(0.0, 1.0);

    RoutePoint {
        lat: a.lat + t * (b.lat - a.lat),
        lon: a.lon + t * (b.lon - a.lon),
    }
}

/// Backend used when no road data is configured. Every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableRoadData;

impl RoadDataProvider for UnavailableRoadData {
    async fn is_point_on_road(&self, _lat: f64, _lon: f64) -> Result<bool, RoadDataError> {
        Err(RoadDataError::Unavailable("no road data backend".to_string()))
    }

    async fn speed_limit(&self, _lat: f64, _lon: f64) -> Result<Option<f64>, RoadDataError> {
        Err(RoadDataError::Unavailable("no road data backend".to_string()))
    }

    async fn current_road_segment(
        &self,
        _lat: f64,
        _lon: f64,
    ) -> Result<Vec<RoutePoint>, RoadDataError> {
        Err(RoadDataError::Unavailable("no road data backend".to_string()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// The backends the service can switch between.
#[derive(Debug, Clone)]
pub enum RoadDataBackend {
    Static(StaticRoadData),
    Corridor(CorridorRoadData),
    Unavailable(UnavailableRoadData),
}

impl RoadDataBackend {
    /// Build the backend named by a settings selection.
    ///
    /// `reference` is the geometry used by the corridor backend.
    pub fn from_selection(selection: &RoadDataSelection, reference: Arc<[RoutePoint]>) -> Self {
        match selection {
            RoadDataSelection::Static { on_road, speed_limit } => Self::Static(StaticRoadData {
                on_road: *on_road,
                speed_limit: *speed_limit,
            }),
            RoadDataSelection::Corridor { half_width_m, speed_limit } => Self::Corridor(
                CorridorRoadData::new(reference, *half_width_m, *speed_limit),
            ),
            RoadDataSelection::Unavailable => Self::Unavailable(UnavailableRoadData),
        }
    }
}

impl RoadDataProvider for RoadDataBackend {
    async fn is_point_on_road(&self, lat: f64, lon: f64) -> Result<bool, RoadDataError> {
        match self {
            Self::Static(p) => p.is_point_on_road(lat, lon).await,
            Self::Corridor(p) => p.is_point_on_road(lat, lon).await,
            Self::Unavailable(p) => p.is_point_on_road(lat, lon).await,
        }
    }

    async fn speed_limit(&self, lat: f64, lon: f64) -> Result<Option<f64>, RoadDataError> {
        match self {
            Self::Static(p) => p.speed_limit(lat, lon).await,
            Self::Corridor(p) => p.speed_limit(lat, lon).await,
            Self::Unavailable(p) => p.speed_limit(lat, lon).await,
        }
    }

    async fn current_road_segment(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<RoutePoint>, RoadDataError> {
        match self {
            Self::Static(p) => p.current_road_segment(lat, lon).await,
            Self::Corridor(p) => p.current_road_segment(lat, lon).await,
            Self::Unavailable(p) => p.current_road_segment(lat, lon).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Static(p) => p.name(),
            Self::Corridor(p) => p.name(),
            Self::Unavailable(p) => p.name(),
        }
    }
}

/// Holder of the active backend.
///
/// Lookups clone the current backend handle and release the lock before
/// awaiting, so a swap never waits for in-flight calls and in-flight
/// calls finish against the backend they started on.
#[derive(Debug)]
pub struct RoadDataService {
    current: RwLock<Arc<RoadDataBackend>>,
}

impl RoadDataService {
    pub fn new(backend: RoadDataBackend) -> Self {
        Self {
            current: RwLock::new(Arc::new(backend)),
        }
    }

    /// Replace the active backend.
    pub fn swap(&self, backend: RoadDataBackend) {
        info!("Road data backend switched to {}", backend.name());
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(backend);
    }

    /// Switch to the backend named by a settings selection.
    ///
    /// The coordinator does not own the service, so hosts call this with
    /// `settings.road_data` whenever they start a route or change settings.
    /// `reference` is the polyline a corridor backend measures against.
    pub fn select(&self, selection: &RoadDataSelection, reference: Arc<[RoutePoint]>) {
        self.swap(RoadDataBackend::from_selection(selection, reference));
    }

    /// Handle to the active backend.
    pub fn backend(&self) -> Arc<RoadDataBackend> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }
}

impl RoadDataProvider for RoadDataService {
    async fn is_point_on_road(&self, lat: f64, lon: f64) -> Result<bool, RoadDataError> {
        self.backend().is_point_on_road(lat, lon).await
    }

    async fn speed_limit(&self, lat: f64, lon: f64) -> Result<Option<f64>, RoadDataError> {
        self.backend().speed_limit(lat, lon).await
    }

    async fn current_road_segment(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<RoutePoint>, RoadDataError> {
        self.backend().current_road_segment(lat, lon).await
    }

    fn name(&self) -> &str {
        "service"
    }
}
