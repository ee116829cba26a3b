//! Test doubles for the platform and backend collaborators.
//!
//! Compiled for unit tests and, behind the `mock-location` feature, for
//! dependents that want to drive the core without a device.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use crate::api::{AttendanceApi, ErrorContext, ErrorReporter, RequestResult, RetryAction};
use crate::coordinator::Clock;
use crate::error::RollcallError;
use crate::geo;
use crate::geofence::{
    GeofenceError, GeofencePrimitive, GeofenceRegion, GeofenceResult, RegionEvent,
    RegionEventStream, RegionState,
};
use crate::location::{AuthorizationState, LocationError, LocationResult, LocationSource};
use crate::types::{Attendance, AttendanceStatus, Coordinate, LocationProof};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// LOCATION
// =============================================================================

#[derive(Default)]
struct SourceState {
    requests: usize,
    next_failure: Option<LocationError>,
}

/// A location source that counts requests and never delivers on its own.
///
/// Deliver fixes with [`LocationProvider::handle_update`](crate::location::LocationProvider::handle_update).
pub struct MockLocationSource {
    authorization: AuthorizationState,
    state: Mutex<SourceState>,
}

impl MockLocationSource {
    /// A source reporting `authorization` at startup.
    #[must_use]
    pub fn new(authorization: AuthorizationState) -> Self {
        Self {
            authorization,
            state: Mutex::new(SourceState::default()),
        }
    }

    /// Number of one-shot requests started.
    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.state).requests
    }

    /// Make the next request fail to start.
    pub fn fail_next_request(&self, error: LocationError) {
        lock(&self.state).next_failure = Some(error);
    }
}

impl LocationSource for MockLocationSource {
    fn authorization(&self) -> AuthorizationState {
        self.authorization
    }

    fn request_location(&self) -> LocationResult<()> {
        let mut state = lock(&self.state);
        state.requests += 1;
        state.next_failure.take().map_or(Ok(()), Err)
    }
}

// =============================================================================
// GEOFENCE
// =============================================================================

type EventSender = mpsc::UnboundedSender<GeofenceResult<RegionEvent>>;

#[derive(Default)]
struct PrimitiveState {
    active: Vec<(GeofenceRegion, EventSender)>,
    streams: Vec<EventSender>,
    added: Vec<String>,
    removed: Vec<String>,
    next_failure: Option<String>,
}

/// An in-memory region monitor driven by the test.
#[derive(Default)]
pub struct MockGeofencePrimitive {
    state: Mutex<PrimitiveState>,
}

impl MockGeofencePrimitive {
    /// An empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers passed to `add_region`, in order.
    #[must_use]
    pub fn added_regions(&self) -> Vec<String> {
        lock(&self.state).added.clone()
    }

    /// Identifiers passed to `remove_region`, in order.
    #[must_use]
    pub fn removed_regions(&self) -> Vec<String> {
        lock(&self.state).removed.clone()
    }

    /// Identifiers currently registered.
    #[must_use]
    pub fn active_regions(&self) -> Vec<String> {
        lock(&self.state)
            .active
            .iter()
            .map(|(region, _)| region.id.clone())
            .collect()
    }

    /// Send `state` for a registered region. Returns `false` if the region
    /// is not registered or its stream is closed.
    pub fn emit(&self, region_id: &str, state: RegionState) -> bool {
        let sender = lock(&self.state)
            .active
            .iter()
            .find(|(region, _)| region.id == region_id)
            .map(|(_, sender)| sender.clone());

        sender.is_some_and(|sender| {
            sender
                .send(Ok(RegionEvent {
                    region_id: region_id.to_string(),
                    state,
                }))
                .is_ok()
        })
    }

    /// Send an event on the `index`th stream ever created, registered or
    /// not. Returns `false` if the stream is closed.
    pub fn emit_on_stream(&self, index: usize, event: RegionEvent) -> bool {
        let sender = lock(&self.state).streams.get(index).cloned();
        sender.is_some_and(|sender| sender.send(Ok(event)).is_ok())
    }

    /// Fail the stream of a registered region.
    pub fn fail_stream(&self, region_id: &str, message: &str) -> bool {
        let sender = lock(&self.state)
            .active
            .iter()
            .find(|(region, _)| region.id == region_id)
            .map(|(_, sender)| sender.clone());

        sender.is_some_and(|sender| {
            sender
                .send(Err(GeofenceError::StreamFailed(message.to_string())))
                .is_ok()
        })
    }

    /// Report the device at `coordinate` for every registered region, the way
    /// the platform would.
    pub fn move_device(&self, coordinate: Coordinate) {
        let targets: Vec<(String, bool, EventSender)> = lock(&self.state)
            .active
            .iter()
            .map(|(region, sender)| {
                let inside = geo::is_within(coordinate, region.center, region.radius_meters);
                (region.id.clone(), inside, sender.clone())
            })
            .collect();

        for (region_id, inside, sender) in targets {
            let state = if inside {
                RegionState::Satisfied
            } else {
                RegionState::Unsatisfied
            };
            let _ = sender.send(Ok(RegionEvent { region_id, state }));
        }
    }

    /// Make the next registration fail.
    pub fn fail_next_registration(&self, message: &str) {
        lock(&self.state).next_failure = Some(message.to_string());
    }

    /// Wait until the consumer of the `index`th stream has dropped it.
    pub async fn wait_for_stream_closed(&self, index: usize) {
        let sender = lock(&self.state).streams.get(index).cloned();
        if let Some(sender) = sender {
            sender.closed().await;
        }
    }
}

impl GeofencePrimitive for MockGeofencePrimitive {
    fn add_region(&self, region: &GeofenceRegion) -> GeofenceResult<RegionEventStream> {
        let mut state = lock(&self.state);
        if let Some(message) = state.next_failure.take() {
            return Err(GeofenceError::RegistrationFailed(message));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.added.push(region.id.clone());
        state.streams.push(tx.clone());
        state.active.retain(|(active, _)| active.id != region.id);
        state.active.push((region.clone(), tx));
        Ok(rx)
    }

    fn remove_region(&self, region_id: &str) {
        let mut state = lock(&self.state);
        state.removed.push(region_id.to_string());
        state.active.retain(|(region, _)| region.id != region_id);
    }
}

// =============================================================================
// BACKEND
// =============================================================================

/// A recorded check-in request.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInCall {
    /// Session identifier.
    pub session_id: String,
    /// Participant identifier.
    pub user_id: String,
    /// Submitted coordinate.
    pub coordinate: Coordinate,
}

/// A recorded reason submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonCall {
    /// Session identifier.
    pub session_id: String,
    /// Participant identifier.
    pub user_id: String,
    /// Submitted reason.
    pub reason: String,
}

#[derive(Default)]
struct ApiState {
    check_in_responses: VecDeque<RequestResult<Attendance>>,
    reason_responses: VecDeque<RequestResult<Attendance>>,
    check_in_calls: Vec<CheckInCall>,
    reason_calls: Vec<ReasonCall>,
}

/// A backend that records calls and answers from queues.
///
/// With an empty queue a call succeeds with a `pending` record.
pub struct MockAttendanceApi {
    state: Mutex<ApiState>,
    gate: watch::Sender<bool>,
}

impl Default for MockAttendanceApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAttendanceApi {
    /// A backend that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(ApiState::default()),
            gate,
        }
    }

    /// Queue the answer to the next check-in.
    pub fn push_check_in(&self, response: RequestResult<Attendance>) {
        lock(&self.state).check_in_responses.push_back(response);
    }

    /// Queue the answer to the next reason submission.
    pub fn push_reason(&self, response: RequestResult<Attendance>) {
        lock(&self.state).reason_responses.push_back(response);
    }

    /// Check-in requests received so far.
    #[must_use]
    pub fn check_in_calls(&self) -> Vec<CheckInCall> {
        lock(&self.state).check_in_calls.clone()
    }

    /// Reason submissions received so far.
    #[must_use]
    pub fn reason_calls(&self) -> Vec<ReasonCall> {
        lock(&self.state).reason_calls.clone()
    }

    /// Hold answers until [`Self::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Answer held and future calls.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    async fn wait_for_gate(&self) {
        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = gate.wait_for(|open| *open).await;
    }
}

#[async_trait]
impl AttendanceApi for MockAttendanceApi {
    async fn request_check_in(
        &self,
        session_id: &str,
        user_id: &str,
        coordinate: Coordinate,
    ) -> RequestResult<Attendance> {
        let response = {
            let mut state = lock(&self.state);
            state.check_in_calls.push(CheckInCall {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                coordinate,
            });
            state.check_in_responses.pop_front()
        };
        self.wait_for_gate().await;

        response.unwrap_or_else(|| {
            let now = Utc::now();
            Ok(Attendance {
                session_id: session_id.to_string(),
                status: AttendanceStatus::Pending,
                location: Some(LocationProof {
                    coordinate,
                    verified: true,
                    address: None,
                    recorded_at: now,
                }),
                reason: None,
                created_at: now,
            })
        })
    }

    async fn submit_reason(
        &self,
        session_id: &str,
        user_id: &str,
        reason: &str,
    ) -> RequestResult<Attendance> {
        let response = {
            let mut state = lock(&self.state);
            state.reason_calls.push(ReasonCall {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                reason: reason.to_string(),
            });
            state.reason_responses.pop_front()
        };
        self.wait_for_gate().await;

        response.unwrap_or_else(|| {
            Ok(Attendance {
                session_id: session_id.to_string(),
                status: AttendanceStatus::Pending,
                location: None,
                reason: Some(reason.to_string()),
                created_at: Utc::now(),
            })
        })
    }
}

// =============================================================================
// ERROR REPORTING
// =============================================================================

/// A reported error, flattened for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedReport {
    /// Machine-readable code of the error.
    pub error_code: &'static str,
    /// Display text of the error.
    pub message: String,
    /// Feature from the context.
    pub feature: &'static str,
    /// Action from the context.
    pub action: &'static str,
    /// Session from the context.
    pub session_id: String,
}

#[derive(Default)]
struct ReporterState {
    reports: Vec<RecordedReport>,
    last_retry: Option<RetryAction>,
}

/// A reporter that keeps every report and the latest retry action.
#[derive(Default)]
pub struct RecordingErrorReporter {
    state: Mutex<ReporterState>,
}

impl RecordingErrorReporter {
    /// An empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far.
    #[must_use]
    pub fn reports(&self) -> Vec<RecordedReport> {
        lock(&self.state).reports.clone()
    }

    /// Retry action of the latest report that carried one.
    #[must_use]
    pub fn last_retry(&self) -> Option<RetryAction> {
        lock(&self.state).last_retry.clone()
    }
}

impl ErrorReporter for RecordingErrorReporter {
    fn report(&self, error: &RollcallError, context: ErrorContext) {
        let mut state = lock(&self.state);
        state.reports.push(RecordedReport {
            error_code: error.error_code(),
            message: error.to_string(),
            feature: context.feature,
            action: context.action,
            session_id: context.session_id,
        });
        if context.retry.is_some() {
            state.last_retry = context.retry;
        }
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// A clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// A clock stopped at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}
