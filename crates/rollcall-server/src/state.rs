//! Application state shared across handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use rollcall_core::{
    AttendanceApi, AttendanceSession, AuthorizationState, Clock, Config, GeofenceMonitor,
    LocationProvider, SessionHandle, SubmissionCoordinator, SystemClock,
};
use tokio::sync::RwLock;

use crate::bridge::{BridgeGeofence, BridgeLocationSource};
use crate::reporter::LatestErrorReporter;
use crate::upstream::HttpAttendanceApi;

/// State handle passed to every handler.
pub type SharedState = Arc<AppState>;

/// Shared application state.
///
/// One attendance screen: one location provider, one geofence monitor, one
/// coordinator, and the sessions currently listed.
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// Clock used for admission and for fixes without a timestamp.
    pub clock: Arc<dyn Clock>,
    /// Location state holder.
    pub location: LocationProvider,
    /// Shell-facing location source.
    pub location_bridge: Arc<BridgeLocationSource>,
    /// Shell-facing region monitor.
    pub geofence_bridge: Arc<BridgeGeofence>,
    /// Reporter holding the latest failure.
    pub reporter: Arc<LatestErrorReporter>,
    /// Submission coordinator.
    pub coordinator: SubmissionCoordinator,
    sessions: RwLock<BTreeMap<String, SessionHandle>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("location", &self.location)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create state backed by the configured club backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend client cannot be built.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let api = Arc::new(HttpAttendanceApi::new(&config.upstream)?);
        Ok(Self::with_collaborators(config, api, Arc::new(SystemClock)))
    }

    /// Create state over explicit collaborators.
    #[must_use]
    pub fn with_collaborators(
        config: Config,
        api: Arc<dyn AttendanceApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let location_bridge = Arc::new(BridgeLocationSource::new(
            AuthorizationState::NotDetermined,
        ));
        let geofence_bridge = Arc::new(BridgeGeofence::new());
        let reporter = Arc::new(LatestErrorReporter::new());

        let location = LocationProvider::new(location_bridge.clone());
        let geofence = GeofenceMonitor::new(geofence_bridge.clone(), location.clone());
        let coordinator = SubmissionCoordinator::new(api, reporter.clone(), geofence)
            .with_clock(clock.clone())
            .with_policy(config.policy)
            .with_max_fix_age(config.location.max_fix_age());

        Self {
            config,
            clock,
            location,
            location_bridge,
            geofence_bridge,
            reporter,
            coordinator,
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Wrap in a handler state handle.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// The geofence monitor.
    #[must_use]
    pub const fn geofence(&self) -> &GeofenceMonitor {
        self.coordinator.geofence()
    }

    /// Replace the listed sessions.
    ///
    /// Clears the active region if its session is no longer listed.
    pub async fn replace_sessions(&self, sessions: Vec<AttendanceSession>) -> Vec<SessionHandle> {
        let board: BTreeMap<String, SessionHandle> = sessions
            .into_iter()
            .map(|session| (session.info().id.clone(), session.into_handle()))
            .collect();
        let handles = board.values().cloned().collect();

        let stale_region = self
            .geofence()
            .active_region()
            .is_some_and(|region| !board.contains_key(&region.id));
        if stale_region {
            self.geofence().clear_active_region();
        }

        *self.sessions.write().await = board;
        handles
    }

    /// Look up a listed session.
    pub async fn session(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// All listed sessions, ordered by identifier.
    pub async fn sessions(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }
}
