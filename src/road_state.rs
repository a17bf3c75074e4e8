//! Live road attributes around the vehicle.
//!
//! The tracker keeps one [`RoadState`] snapshot and refreshes it from a
//! [`RoadDataProvider`]. Refresh requests are debounced (only the most
//! recent position within the settle delay is looked up), throttled
//! (a minimum interval between successful refreshes) and gated by
//! displacement (a vehicle standing still does not trigger lookups).

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::RoadDataError;
use crate::geo::{haversine, RoutePoint};
use crate::road_data::RoadDataProvider;

/// Speed limit at or below which a road counts as urban, in km/h.
const CITY_SPEED_LIMIT: f64 = 50.0;

/// Road attributes at the last refreshed position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadState {
    pub is_on_road: bool,
    /// Posted speed limit in km/h, if known.
    pub speed_limit: Option<f64>,
    pub current_segment: Vec<RoutePoint>,
    pub is_in_city: bool,
    /// Position the lookups were made for.
    pub last_position: RoutePoint,
}

/// Receives every applied road-state refresh.
pub trait RoadStateSubscriber: Send + Sync {
    fn on_road_state(&self, state: &RoadState);
}

/// Timing and distance gates for refreshes.
#[derive(Debug, Clone)]
pub struct RoadStateOptions {
    /// Quiet period before a requested refresh fires.
    pub settle_delay: Duration,
    /// Minimum time between successful refreshes.
    pub min_interval: Duration,
    /// Minimum displacement from the last snapshot, in meters.
    pub min_distance_m: f64,
}

impl Default for RoadStateOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            min_interval: Duration::from_secs(5),
            min_distance_m: 10.0,
        }
    }
}

/// Debounce state machine. At most one timer is pending.
enum Debounce {
    Idle,
    Pending {
        position: RoutePoint,
        timer_id: u64,
        timer: JoinHandle<()>,
    },
}

struct Inner {
    state: Option<Arc<RoadState>>,
    last_refresh: Option<Instant>,
    debounce: Debounce,
    next_timer_id: u64,
    /// Sequence number handed to the next dispatched refresh.
    next_seq: u64,
    /// Sequence number of the refresh currently applied.
    applied_seq: u64,
}

struct Shared<P> {
    provider: Arc<P>,
    options: RoadStateOptions,
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<Arc<dyn RoadStateSubscriber>>>,
}

/// Debounced, throttled road-state refresher.
///
/// Cloning yields another handle to the same tracker.
pub struct RoadStateTracker<P> {
    shared: Arc<Shared<P>>,
}

impl<P> Clone for RoadStateTracker<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<P: RoadDataProvider + 'static> RoadStateTracker<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self::with_options(provider, RoadStateOptions::default())
    }

    pub fn with_options(provider: Arc<P>, options: RoadStateOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider,
                options,
                inner: Mutex::new(Inner {
                    state: None,
                    last_refresh: None,
                    debounce: Debounce::Idle,
                    next_timer_id: 0,
                    next_seq: 0,
                    applied_seq: 0,
                }),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The current snapshot, if any refresh has succeeded.
    pub fn current(&self) -> Option<Arc<RoadState>> {
        lock(&self.shared.inner).state.clone()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn RoadStateSubscriber>) {
        lock(&self.shared.subscribers).push(subscriber);
    }

    /// Schedule a refresh for `position` after the settle delay.
    ///
    /// A request made while another is pending replaces it. When the
    /// timer fires the throttle and displacement gates are checked and
    /// the refresh is skipped silently if either fails.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request_update(&self, position: RoutePoint) {
        let mut inner = lock(&self.shared.inner);

        if let Debounce::Pending { timer, .. } =
            std::mem::replace(&mut inner.debounce, Debounce::Idle)
        {
            timer.abort();
        }

        inner.next_timer_id += 1;
        let timer_id = inner.next_timer_id;
        let fire_at = Instant::now() + self.shared.options.settle_delay;
        let shared = Arc::clone(&self.shared);

        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(fire_at).await;
            shared.fire(timer_id).await;
        });

        inner.debounce = Debounce::Pending {
            position,
            timer_id,
            timer,
        };
    }

    /// Refresh now, bypassing debounce, throttle and displacement gates.
    ///
    /// Returns the applied snapshot, or the lookup error (the previous
    /// snapshot is kept in that case).
    pub async fn force_update(&self, position: RoutePoint) -> Result<Arc<RoadState>, RoadDataError> {
        let seq = {
            let mut inner = lock(&self.shared.inner);
            inner.next_seq += 1;
            inner.next_seq
        };
        self.shared.refresh(position, seq).await
    }
}

impl<P: RoadDataProvider> Shared<P> {
    /// Timer callback: take the pending position and refresh if allowed.
    async fn fire(&self, timer_id: u64) {
        let (position, seq) = {
            let mut inner = lock(&self.inner);

            let position = match &inner.debounce {
                Debounce::Pending { position, timer_id: id, .. } if *id == timer_id => *position,
                _ => return,
            };
            inner.debounce = Debounce::Idle;

            if !self.gates_pass(&inner, &position) {
                return;
            }

            inner.next_seq += 1;
            (position, inner.next_seq)
        };

        // Failures are already logged and leave the snapshot untouched
        let _ = self.refresh(position, seq).await;
    }

    fn gates_pass(&self, inner: &Inner, position: &RoutePoint) -> bool {
        if let Some(last) = inner.last_refresh {
            let elapsed = last.elapsed();
            if elapsed < self.options.min_interval {
                debug!("Skipping road state refresh: {} ms since last", elapsed.as_millis());
                return false;
            }
        }

        match &inner.state {
            None => true,
            Some(state) => {
                let moved = haversine(position, &state.last_position);
                if moved < self.options.min_distance_m {
                    debug!("Skipping road state refresh: moved only {moved:.1} m");
                    return false;
                }
                true
            }
        }
    }

    /// Run the three lookups concurrently and apply the result.
    async fn refresh(&self, position: RoutePoint, seq: u64) -> Result<Arc<RoadState>, RoadDataError> {
        debug!("Refreshing road state at ({:.5}, {:.5})", position.lat, position.lon);

        let (lat, lon) = (position.lat, position.lon);
        let (on_road, speed_limit, segment) = tokio::join!(
            self.provider.is_point_on_road(lat, lon),
            self.provider.speed_limit(lat, lon),
            self.provider.current_road_segment(lat, lon),
        );

        let state = match assemble(position, on_road, speed_limit, segment) {
            Ok(state) => Arc::new(state),
            Err(e) => {
                warn!("Road state refresh failed via {}: {e}", self.provider.name());
                return Err(e);
            }
        };

        let subscribers = {
            let mut inner = lock(&self.inner);
            if seq <= inner.applied_seq {
                debug!("Discarding stale road state #{seq} (applied #{})", inner.applied_seq);
                return Ok(inner.state.clone().unwrap_or(state));
            }
            inner.applied_seq = seq;
            inner.state = Some(Arc::clone(&state));
            inner.last_refresh = Some(Instant::now());
            lock(&self.subscribers).clone()
        };

        info!(
            "Road state updated: on_road={} limit={:?} city={}",
            state.is_on_road, state.speed_limit, state.is_in_city
        );

        for subscriber in &subscribers {
            subscriber.on_road_state(&state);
        }

        Ok(state)
    }
}

fn assemble(
    position: RoutePoint,
    on_road: Result<bool, RoadDataError>,
    speed_limit: Result<Option<f64>, RoadDataError>,
    segment: Result<Vec<RoutePoint>, RoadDataError>,
) -> Result<RoadState, RoadDataError> {
    let speed_limit = speed_limit?;
    Ok(RoadState {
        is_on_road: on_road?,
        speed_limit,
        current_segment: segment?,
        is_in_city: speed_limit.is_some_and(|limit| limit <= CITY_SPEED_LIMIT),
        last_position: position,
    })
}
