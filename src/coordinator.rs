//! Periodic prediction loop.
//!
//! Every tick samples vehicle telemetry once, locates the vehicle on the
//! route, decides whether to ask for a new route, and otherwise advances
//! the turn queue and publishes the nearest turn with the deceleration
//! needed to reach its advised speed.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::PredictionSettings;
use crate::decel;
use crate::geo::RoutePoint;
use crate::progress;
use crate::road_data::RoadDataProvider;
use crate::road_state::{RoadState, RoadStateSubscriber, RoadStateTracker};
use crate::speed_cache::SpeedLimitCache;
use crate::turns::{TurnPrediction, TurnPredictionManager};

/// Minimum time between two reroute requests.
pub const REROUTE_COOLDOWN: Duration = Duration::from_secs(5);

/// One telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehicleTelemetry {
    pub position: RoutePoint,
    /// Ground speed in m/s.
    pub speed_mps: f64,
}

/// Source of vehicle telemetry, polled once per tick.
pub trait TelemetrySource: Send + Sync {
    /// Latest sample, or None when no fix is available.
    fn telemetry(&self) -> Option<VehicleTelemetry>;
}

/// Request for a new route from the current position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RerouteRequest {
    pub from: RoutePoint,
    pub to: RoutePoint,
}

/// The published prediction: the nearest turn with live data merged in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionSnapshot {
    /// Nearest turn. Its `required_deceleration` is computed from the
    /// speed sampled on the publishing tick.
    #[serde(flatten)]
    pub turn: TurnPrediction,
    /// Speed limit where the vehicle is now, from the road state.
    pub current_speed_limit: Option<f64>,
}

pub trait PredictionSubscriber: Send + Sync {
    fn on_prediction(&self, prediction: Option<&PredictionSnapshot>, turns: &[TurnPrediction]);
}

pub trait RerouteListener: Send + Sync {
    fn on_reroute(&self, request: &RerouteRequest);
}

#[derive(Default)]
struct Published {
    prediction: Option<PredictionSnapshot>,
    turns: Vec<TurnPrediction>,
}

/// Patches the published prediction when the road state refreshes.
struct LiveSpeedLimit {
    published: Weak<Mutex<Published>>,
}

impl RoadStateSubscriber for LiveSpeedLimit {
    fn on_road_state(&self, state: &RoadState) {
        if let Some(published) = self.published.upgrade() {
            if let Some(prediction) = lock(&published).prediction.as_mut() {
                prediction.current_speed_limit = state.speed_limit;
            }
        }
    }
}

struct TickState<P> {
    running: bool,
    route: Arc<[RoutePoint]>,
    destination: Option<RoutePoint>,
    turns: TurnPredictionManager<P>,
    last_reroute: Option<Instant>,
    settings: PredictionSettings,
}

struct Shared<T, P> {
    telemetry: Arc<T>,
    road_state: RoadStateTracker<P>,
    state: tokio::sync::Mutex<TickState<P>>,
    published: Arc<Mutex<Published>>,
    prediction_subscribers: Mutex<Vec<Arc<dyn PredictionSubscriber>>>,
    reroute_listeners: Mutex<Vec<Arc<dyn RerouteListener>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Drives turn prediction for the active route.
///
/// Cloning yields another handle to the same coordinator.
pub struct PredictionCoordinator<T, P> {
    shared: Arc<Shared<T, P>>,
}

impl<T, P> Clone for PredictionCoordinator<T, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, P> PredictionCoordinator<T, P>
where
    T: TelemetrySource + 'static,
    P: RoadDataProvider + 'static,
{
    /// Build a coordinator whose tracker and speed-limit cache share one
    /// road-data provider.
    pub fn new(telemetry: Arc<T>, provider: Arc<P>, settings: PredictionSettings) -> Self {
        Self::with_parts(
            telemetry,
            RoadStateTracker::new(Arc::clone(&provider)),
            SpeedLimitCache::new(provider),
            settings,
        )
    }

    pub fn with_parts(
        telemetry: Arc<T>,
        road_state: RoadStateTracker<P>,
        speed_limits: SpeedLimitCache<P>,
        settings: PredictionSettings,
    ) -> Self {
        let published = Arc::new(Mutex::new(Published::default()));
        road_state.subscribe(Arc::new(LiveSpeedLimit {
            published: Arc::downgrade(&published),
        }));

        Self {
            shared: Arc::new(Shared {
                telemetry,
                road_state,
                state: tokio::sync::Mutex::new(TickState {
                    running: false,
                    route: Arc::from(Vec::<RoutePoint>::new()),
                    destination: None,
                    turns: TurnPredictionManager::new(speed_limits),
                    last_reroute: None,
                    settings,
                }),
                published,
                prediction_subscribers: Mutex::new(Vec::new()),
                reroute_listeners: Mutex::new(Vec::new()),
                ticker: Mutex::new(None),
            }),
        }
    }

    pub fn road_state(&self) -> &RoadStateTracker<P> {
        &self.shared.road_state
    }

    pub fn subscribe(&self, subscriber: Arc<dyn PredictionSubscriber>) {
        lock(&self.shared.prediction_subscribers).push(subscriber);
    }

    pub fn on_reroute(&self, listener: Arc<dyn RerouteListener>) {
        lock(&self.shared.reroute_listeners).push(listener);
    }

    pub fn current_prediction(&self) -> Option<PredictionSnapshot> {
        lock(&self.shared.published).prediction.clone()
    }

    /// Turn queue as of the last published tick.
    pub fn turns(&self) -> Vec<TurnPrediction> {
        lock(&self.shared.published).turns.clone()
    }

    /// Replace the settings. Queued turns are dropped since they were
    /// detected with the old thresholds.
    ///
    /// `settings.road_data` is not applied here; pass it to
    /// `RoadDataService::select` when the provider is a service.
    pub async fn update_settings(&self, settings: PredictionSettings) {
        let mut state = self.shared.state.lock().await;
        state.settings = settings;
        state.turns.clear();
    }

    /// Start predicting along `route`.
    ///
    /// Resets turn tracking and the reroute cooldown, keeps the previous
    /// destination unless a new one is given, restarts the periodic tick
    /// and runs one tick immediately.
    pub async fn start(&self, route: Arc<[RoutePoint]>, destination: Option<RoutePoint>) {
        let period = {
            let mut state = self.shared.state.lock().await;
            info!("Starting prediction on a route of {} points", route.len());
            state.running = true;
            state.route = route;
            state.turns.clear();
            state.last_reroute = None;
            if destination.is_some() {
                state.destination = destination;
            }
            Duration::from_millis(state.settings.update_interval_ms.max(1))
        };
        lock(&self.shared.published).prediction = None;

        let ticker = self.spawn_ticker(period);
        if let Some(previous) = lock(&self.shared.ticker).replace(ticker) {
            previous.abort();
        }

        self.shared.tick().await;
    }

    /// Stop the periodic tick and clear the prediction and destination.
    pub async fn stop(&self) {
        if let Some(ticker) = lock(&self.shared.ticker).take() {
            ticker.abort();
        }

        let mut state = self.shared.state.lock().await;
        state.running = false;
        state.destination = None;
        state.turns.clear();
        self.shared.publish(None, Vec::new());
        info!("Prediction stopped");
    }

    /// Run one prediction cycle now.
    pub async fn tick(&self) {
        self.shared.tick().await;
    }

    fn spawn_ticker(&self, period: Duration) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; start() runs that one
            interval.tick().await;

            loop {
                interval.tick().await;
                // A tick still waiting on road data makes this one a no-op
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.tick_if_idle().await });
            }
        })
    }
}

impl<T, P> Shared<T, P>
where
    T: TelemetrySource + 'static,
    P: RoadDataProvider + 'static,
{
    async fn tick(&self) {
        let guard = self.state.lock().await;
        self.run_tick(guard).await;
    }

    /// Periodic tick: skipped while another tick holds the state.
    async fn tick_if_idle(&self) {
        match self.state.try_lock() {
            Ok(guard) => self.run_tick(guard).await,
            Err(_) => debug!("Previous tick still running, skipping"),
        }
    }

    async fn run_tick(&self, mut guard: tokio::sync::MutexGuard<'_, TickState<P>>) {
        if !guard.running {
            return;
        }
        let state = &mut *guard;

        let sample = match self.telemetry.telemetry() {
            Some(sample) if state.route.len() >= 2 => sample,
            _ => {
                debug!("No telemetry or route too short; clearing prediction");
                self.publish(None, state.turns.turns().to_vec());
                return;
            }
        };

        let route = Arc::clone(&state.route);
        let position = sample.position;
        let speed = sample.speed_mps * 3.6;

        let Some(progress) = progress::find_closest(&position, &route) else {
            self.publish(None, state.turns.turns().to_vec());
            return;
        };

        let road = self.road_state.current();
        let is_on_road = road.as_ref().is_some_and(|r| r.is_on_road);
        let live_limit = road.as_ref().and_then(|r| r.speed_limit);

        if progress::is_off_route(progress.deviation_m, &state.settings) && is_on_road && speed > 0.0 {
            if let Some(destination) = state.destination {
                let cooled_down = state
                    .last_reroute
                    .map_or(true, |at| at.elapsed() > REROUTE_COOLDOWN);

                if cooled_down {
                    info!(
                        "Off route by {:.0} m at {:.1} km/h, requesting a new route",
                        progress.deviation_m, speed
                    );
                    state.last_reroute = Some(Instant::now());
                    let request = RerouteRequest {
                        from: position,
                        to: destination,
                    };
                    let listeners = lock(&self.reroute_listeners).clone();
                    for listener in &listeners {
                        listener.on_reroute(&request);
                    }
                    return;
                }
            }
        }

        self.road_state.request_update(position);

        state
            .turns
            .update_turn_distances(&position, progress.closest_index, &route);
        state.turns.remove_past_turns(progress.closest_index);

        let start = state.turns.resume_index(progress.closest_index);
        state
            .turns
            .find_new_turns(
                &route,
                start,
                progress.closest_index,
                &position,
                &state.settings,
                speed,
                live_limit,
            )
            .await;
        state.turns.sort_turns();

        let prediction = state.turns.next_turn().map(|next| {
            let mut turn = next.clone();
            turn.required_deceleration = if speed > turn.optimal_speed {
                decel::solve(speed, turn.optimal_speed, turn.distance)
            } else {
                None
            };
            PredictionSnapshot {
                turn,
                current_speed_limit: live_limit,
            }
        });

        if let Some(p) = &prediction {
            debug!(
                "Next turn {:.0}° in {:.0} m, advised {:.0} km/h (now {:.0})",
                p.turn.angle, p.turn.distance, p.turn.optimal_speed, speed
            );
        }

        self.publish(prediction, state.turns.turns().to_vec());
    }

    /// Replace the published prediction and notify subscribers.
    fn publish(&self, prediction: Option<PredictionSnapshot>, turns: Vec<TurnPrediction>) {
        {
            let mut published = lock(&self.published);
            published.prediction = prediction.clone();
            published.turns = turns.clone();
        }

        let subscribers = lock(&self.prediction_subscribers).clone();
        for subscriber in &subscribers {
            subscriber.on_prediction(prediction.as_ref(), &turns);
        }
    }
}
