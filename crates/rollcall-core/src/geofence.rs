//! Venue proximity monitoring.
//!
//! [`GeofenceMonitor`] owns at most one active circular region. While a
//! region is active a single background task consumes two inputs:
//!
//! - region events from the platform geofence primitive, and
//! - accepted fixes from the [`LocationProvider`], checked by distance.
//!
//! Both feed the same `inside` flag, and both use the same boundary rule
//! (distance <= radius), so either input alone produces the same answer.
//! When the event stream fails the failure is logged and the task keeps
//! running on distance checks only.
//!
//! Every activation bumps a generation counter, and events are applied only
//! if they carry the current generation. Clearing the region bumps it again
//! and aborts the task, so nothing is processed after a clear returns.
//!
//! Region changes are serialized: an activation holds the activation lock
//! from removing the previous region until the new watcher is installed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::geo;
use crate::location::LocationProvider;
use crate::types::{Coordinate, Position};

/// Capacity of the transition broadcast channel.
const TRANSITION_CHANNEL_CAPACITY: usize = 32;

/// A named circular region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeofenceRegion {
    /// Identifier shared with the platform primitive.
    #[schema(example = "session-42")]
    pub id: String,

    /// Center of the circle.
    pub center: Coordinate,

    /// Radius in meters.
    #[schema(example = 50.0)]
    pub radius_meters: f64,
}

impl GeofenceRegion {
    /// Whether `coordinate` lies inside the region. The boundary is inside.
    #[must_use]
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        geo::is_within(coordinate, self.center, self.radius_meters)
    }
}

/// Region state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegionState {
    /// The device is inside the region.
    Satisfied,
    /// The device is outside the region.
    Unsatisfied,
    /// The platform stopped monitoring the region.
    Unmonitored,
}

/// A platform geofence event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegionEvent {
    /// Region the event is about.
    #[schema(example = "session-42")]
    pub region_id: String,

    /// New state.
    pub state: RegionState,
}

/// The last observed change for the active region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceTransition {
    /// Moved inside.
    Entered,
    /// Moved outside.
    Exited,
    /// Monitoring stopped outside our control.
    Unmonitored,
}

/// Snapshot of proximity to the active region.
///
/// With no active region `inside_active_region` is `false` and
/// `last_transition` is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GeofenceState {
    /// Whether the device is inside the active region.
    pub inside_active_region: bool,

    /// The most recent transition for the active region.
    pub last_transition: Option<GeofenceTransition>,
}

/// A transition published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTransition {
    /// Region that changed.
    pub region_id: String,
    /// What happened.
    pub transition: GeofenceTransition,
}

/// Errors raised by geofence operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeofenceError {
    /// The region definition is unusable.
    #[error("Invalid geofence region '{id}': {message}")]
    InvalidRegion {
        /// Region identifier.
        id: String,
        /// What is wrong with it.
        message: String,
    },

    /// The platform refused to monitor the region.
    #[error("Failed to register geofence region: {0}")]
    RegistrationFailed(String),

    /// The platform event stream failed.
    #[error("Geofence event stream failed: {0}")]
    StreamFailed(String),
}

/// Result alias for geofence operations.
pub type GeofenceResult<T> = std::result::Result<T, GeofenceError>;

/// Events delivered by the platform for one registered region.
pub type RegionEventStream = mpsc::UnboundedReceiver<GeofenceResult<RegionEvent>>;

/// Platform region-monitoring primitive.
pub trait GeofencePrimitive: Send + Sync {
    /// Start monitoring a region and return its event stream.
    ///
    /// # Errors
    ///
    /// Returns [`GeofenceError::RegistrationFailed`] if the platform refuses.
    fn add_region(&self, region: &GeofenceRegion) -> GeofenceResult<RegionEventStream>;

    /// Stop monitoring a region.
    fn remove_region(&self, region_id: &str);
}

#[derive(Default)]
struct MonitorState {
    active: Option<GeofenceRegion>,
    inside: bool,
    last_transition: Option<GeofenceTransition>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl MonitorState {
    /// Record a new inside/outside reading, returning the transition if the
    /// reading changed anything.
    fn record(&mut self, inside: bool) -> Option<GeofenceTransition> {
        let transition = if inside {
            GeofenceTransition::Entered
        } else {
            GeofenceTransition::Exited
        };
        let changed = self.inside != inside || self.last_transition.is_none();

        self.inside = inside;
        if changed {
            self.last_transition = Some(transition);
            Some(transition)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.active = None;
        self.inside = false;
        self.last_transition = None;
    }
}

struct MonitorInner {
    primitive: Arc<dyn GeofencePrimitive>,
    location: LocationProvider,
    activation: Mutex<()>,
    state: Mutex<MonitorState>,
    transitions: broadcast::Sender<RegionTransition>,
}

impl MonitorInner {
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Taken before `state`, never the other way round.
    fn activation(&self) -> MutexGuard<'_, ()> {
        self.activation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, region_id: &str, transition: GeofenceTransition) {
        debug!(region_id, ?transition, "Geofence transition");
        // No subscribers is fine.
        let _ = self.transitions.send(RegionTransition {
            region_id: region_id.to_string(),
            transition,
        });
    }

    /// Apply a platform event. Returns `false` when the watcher should stop.
    fn apply_event(&self, generation: u64, event: &RegionEvent) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        let Some(active_id) = state.active.as_ref().map(|r| r.id.clone()) else {
            return false;
        };
        if active_id != event.region_id {
            debug!(
                region_id = %event.region_id,
                active = %active_id,
                "Ignoring event for inactive region"
            );
            return true;
        }

        match event.state {
            RegionState::Satisfied | RegionState::Unsatisfied => {
                if let Some(t) = state.record(event.state == RegionState::Satisfied) {
                    self.publish(&active_id, t);
                }
                true
            }
            RegionState::Unmonitored => {
                info!(region_id = %active_id, "Geofence region removed by the platform");
                state.reset();
                // Detach; the watcher exits on its own once we return false.
                state.task = None;
                self.publish(&active_id, GeofenceTransition::Unmonitored);
                false
            }
        }
    }

    /// Apply a distance check. Returns `false` when the watcher should stop.
    fn apply_position(&self, generation: u64, position: &Position) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        let Some(region) = state.active.as_ref() else {
            return false;
        };

        let region_id = region.id.clone();
        let inside = region.contains(position.coordinate);
        if let Some(t) = state.record(inside) {
            self.publish(&region_id, t);
        }
        true
    }

    fn evaluate_last_known(&self) {
        if let Some(position) = self.location.last_known_position() {
            let generation = self.lock().generation;
            self.apply_position(generation, &position);
        }
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = state.task.take() {
            task.abort();
        }
        if let Some(region) = state.active.take() {
            self.primitive.remove_region(&region.id);
        }
    }
}

/// Tracks proximity to one active region.
#[derive(Clone)]
pub struct GeofenceMonitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for GeofenceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeofenceMonitor")
            .field("active_region", &self.active_region())
            .field("state", &self.current_state())
            .finish()
    }
}

impl GeofenceMonitor {
    /// Create a monitor over a platform primitive and a location provider.
    pub fn new(primitive: Arc<dyn GeofencePrimitive>, location: LocationProvider) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MonitorInner {
                primitive,
                location,
                activation: Mutex::new(()),
                state: Mutex::new(MonitorState::default()),
                transitions,
            }),
        }
    }

    /// Make `region` the single active region.
    ///
    /// If a region with the same identifier is already active this only
    /// re-checks distance. Otherwise the previous region is removed, the new
    /// one registered, and the last known position is checked immediately.
    ///
    /// Concurrent calls are applied one at a time; the last one wins and
    /// the platform ends up with exactly its region registered.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`GeofenceError::InvalidRegion`] for a bad center or radius,
    /// or the primitive's registration error. On error no region is active.
    pub fn set_active_region(&self, region: GeofenceRegion) -> GeofenceResult<()> {
        if !region.center.is_valid() {
            return Err(GeofenceError::InvalidRegion {
                id: region.id,
                message: "center coordinate is out of range".to_string(),
            });
        }
        if !(region.radius_meters.is_finite() && region.radius_meters > 0.0) {
            return Err(GeofenceError::InvalidRegion {
                id: region.id,
                message: format!("radius must be positive (got {})", region.radius_meters),
            });
        }

        let _activation = self.inner.activation();
        let already_active = self
            .inner
            .lock()
            .active
            .as_ref()
            .is_some_and(|active| active.id == region.id);
        if already_active {
            debug!(region_id = %region.id, "Region already active; re-checking distance");
            self.inner.evaluate_last_known();
            return Ok(());
        }

        self.clear_registered_region();

        let events = self.inner.primitive.add_region(&region).map_err(|e| {
            warn!(region_id = %region.id, error = %e, "Failed to register geofence region");
            e
        })?;

        {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.inside = false;
            state.last_transition = None;
            let generation = state.generation;
            if let Some(stale) = state.task.take() {
                stale.abort();
            }
            state.task = Some(tokio::spawn(watch_region(
                Arc::downgrade(&self.inner),
                generation,
                region.id.clone(),
                events,
                self.inner.location.subscribe(),
            )));
            state.active = Some(region.clone());
        }

        info!(
            region_id = %region.id,
            latitude = region.center.latitude,
            longitude = region.center.longitude,
            radius_meters = region.radius_meters,
            "Geofence region activated"
        );

        self.inner.evaluate_last_known();
        Ok(())
    }

    /// Remove the active region and stop its watcher.
    pub fn clear_active_region(&self) {
        let _activation = self.inner.activation();
        self.clear_registered_region();
    }

    /// Caller holds the activation lock.
    fn clear_registered_region(&self) {
        let (region, task) = {
            let mut state = self.inner.lock();
            let region = state.active.clone();
            state.reset();
            (region, state.task.take())
        };

        if let Some(task) = task {
            task.abort();
        }
        if let Some(region) = region {
            self.inner.primitive.remove_region(&region.id);
            info!(region_id = %region.id, "Geofence region cleared");
        }
    }

    /// Synchronous snapshot of the proximity state.
    #[must_use]
    pub fn current_state(&self) -> GeofenceState {
        let state = self.inner.lock();
        if state.active.is_none() {
            return GeofenceState::default();
        }
        GeofenceState {
            inside_active_region: state.inside,
            last_transition: state.last_transition,
        }
    }

    /// Whether the device is inside the active region and that region is
    /// `region_id`. Reads both under one lock.
    #[must_use]
    pub fn is_inside(&self, region_id: &str) -> bool {
        let state = self.inner.lock();
        state.inside && state.active.as_ref().is_some_and(|r| r.id == region_id)
    }

    /// Whether `coordinate` lies inside the active region and that region is
    /// `region_id`.
    #[must_use]
    pub fn contains(&self, region_id: &str, coordinate: Coordinate) -> bool {
        self.inner
            .lock()
            .active
            .as_ref()
            .is_some_and(|r| r.id == region_id && r.contains(coordinate))
    }

    /// The active region, if any.
    #[must_use]
    pub fn active_region(&self) -> Option<GeofenceRegion> {
        self.inner.lock().active.clone()
    }

    /// Whether a watcher task is alive for the active region.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.inner
            .lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Subscribe to region transitions.
    #[must_use]
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<RegionTransition> {
        self.inner.transitions.subscribe()
    }

    /// The location provider this monitor reads from.
    #[must_use]
    pub fn location(&self) -> &LocationProvider {
        &self.inner.location
    }
}

async fn watch_region(
    monitor: Weak<MonitorInner>,
    generation: u64,
    region_id: String,
    mut events: RegionEventStream,
    mut positions: watch::Receiver<Option<Position>>,
) {
    let mut events_open = true;

    loop {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(Ok(event)) => {
                    let Some(monitor) = monitor.upgrade() else { break };
                    if !monitor.apply_event(generation, &event) {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(
                        region_id = %region_id,
                        error = %e,
                        "Geofence event stream failed; continuing with distance checks"
                    );
                    events_open = false;
                }
                None => {
                    debug!(region_id = %region_id, "Geofence event stream closed");
                    events_open = false;
                }
            },
            changed = positions.changed() => {
                if changed.is_err() {
                    break;
                }
                let position = *positions.borrow_and_update();
                let Some(monitor) = monitor.upgrade() else { break };
                if let Some(position) = position {
                    if !monitor.apply_position(generation, &position) {
                        break;
                    }
                }
            }
        }
    }

    debug!(region_id = %region_id, "Geofence watcher stopped");
}
