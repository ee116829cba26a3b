//! Attendance admission and submission.
//!
//! [`SubmissionCoordinator`] is the only writer of [`AttendanceSession`]
//! state. It decides whether a check-in may be submitted, drives the
//! session through `loading` and into its result, and decides between a
//! terminal failure and a rollback when the backend call fails.
//!
//! # Single flight
//!
//! The admission check and the move to `loading` happen under the session
//! lock, before the first await. A second submission for the same session
//! therefore sees `loading` and is refused. No other lock is involved.
//!
//! # Failures
//!
//! | Failure                    | Session afterwards               | Reported |
//! |----------------------------|----------------------------------|----------|
//! | backend domain rejection   | `failed(error)`                  | no       |
//! | transport or location fix  | previous `loaded` value, or idle | yes, with retry |
//! | fresh fix outside the venue | previous `loaded` value, or idle | yes, with retry |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::api::{AttendanceApi, DomainError, ErrorContext, ErrorReporter, RetryAction};
use crate::config::AttendancePolicy;
use crate::error::RollcallError;
use crate::geofence::{GeofenceMonitor, GeofenceRegion, GeofenceResult};
use crate::session::{
    lock_session, AttendanceSession, AttendanceSlot, DisplayStatus, Loadable, SessionHandle,
};
use crate::time_window::AttendanceTimeWindow;
use crate::types::{Attendance, SessionInfo};

/// Longest accepted late or absence reason, in characters.
pub const MAX_REASON_LENGTH: usize = 500;

/// Capacity of the attendance event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Feature name attached to reported errors.
const FEATURE: &str = "attendance";

/// Source of "now".
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Input rejected before a reason submission starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The reason is empty after trimming.
    #[error("A reason is required")]
    EmptyReason,

    /// The reason is longer than [`MAX_REASON_LENGTH`].
    #[error("Reason exceeds maximum length of {max} characters (got {actual})")]
    ReasonTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length provided.
        actual: usize,
    },
}

/// How a submission attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The admission check refused; nothing changed.
    NotAdmitted,

    /// The backend recorded the attendance.
    Recorded {
        /// The stored record.
        attendance: Attendance,
    },

    /// The backend rejected the request; the session is `failed`.
    Rejected {
        /// Why.
        error: DomainError,
    },

    /// The call failed; the session was restored and the error reported.
    RolledBack {
        /// Description of the failure.
        error: String,
    },
}

/// The inputs of the admission decision, captured at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Admission {
    /// Time window at capture.
    pub window: AttendanceTimeWindow,
    /// Inside the session's geofence.
    pub inside_geofence: bool,
    /// Location access granted.
    pub location_authorized: bool,
    /// A submission is in flight.
    pub loading: bool,
    /// A submission already succeeded during this run.
    pub submitted_this_run: bool,
}

impl Admission {
    /// Whether a GPS check-in may be submitted.
    #[must_use]
    pub const fn allows_check_in(&self) -> bool {
        matches!(self.window, AttendanceTimeWindow::OnTime)
            && self.inside_geofence
            && self.location_authorized
            && !self.loading
            && !self.submitted_this_run
    }

    /// Whether a late or absence reason may be submitted. Location is not
    /// required.
    #[must_use]
    pub const fn allows_reason(&self) -> bool {
        self.window.accepts_reason() && !self.loading && !self.submitted_this_run
    }
}

/// The label of the attendance action, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayLabel {
    /// A submission is in flight.
    Submitting,
    /// Submitted during this run, waiting for an operator.
    AwaitingApproval,
    /// Recorded as present.
    Present,
    /// Recorded as late.
    Late,
    /// Recorded as absent.
    Absent,
    /// Check-in has not opened.
    TooEarly,
    /// Past on time; a late reason may be filed.
    SubmitLateReason,
    /// Past the late threshold.
    Closed,
    /// Location access is missing.
    LocationPermissionRequired,
    /// Not inside the venue geofence.
    OutsideVenue,
    /// Ready.
    CheckIn,
}

impl DisplayLabel {
    /// Pick the label for a status and admission snapshot.
    ///
    /// Order: in flight, awaiting approval, decided status, time window,
    /// missing permission, outside the venue, ready.
    #[must_use]
    pub const fn resolve(status: DisplayStatus, admission: &Admission) -> Self {
        if admission.loading {
            return Self::Submitting;
        }
        match status {
            DisplayStatus::PendingApproval => return Self::AwaitingApproval,
            DisplayStatus::Present => return Self::Present,
            DisplayStatus::Late => return Self::Late,
            DisplayStatus::Absent => return Self::Absent,
            DisplayStatus::Pending => {}
        }
        match admission.window {
            AttendanceTimeWindow::TooEarly => return Self::TooEarly,
            AttendanceTimeWindow::LateWindow => return Self::SubmitLateReason,
            AttendanceTimeWindow::Expired => return Self::Closed,
            AttendanceTimeWindow::OnTime => {}
        }
        if !admission.location_authorized {
            return Self::LocationPermissionRequired;
        }
        if !admission.inside_geofence {
            return Self::OutsideVenue;
        }
        Self::CheckIn
    }

    /// Text shown on the action.
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::Submitting => "Submitting...",
            Self::AwaitingApproval => "Awaiting approval",
            Self::Present => "Present",
            Self::Late => "Late",
            Self::Absent => "Absent",
            Self::TooEarly => "Check-in not open yet",
            Self::SubmitLateReason => "Submit a late reason",
            Self::Closed => "Check-in closed",
            Self::LocationPermissionRequired => "Allow location access to check in",
            Self::OutsideVenue => "Move closer to the venue",
            Self::CheckIn => "Check in",
        }
    }
}

/// What happened to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceEventKind {
    /// Moved to `loading`.
    Submitting,
    /// Moved to `loaded`.
    Recorded,
    /// Moved to `failed`.
    Rejected,
    /// Restored after a failed call.
    RolledBack,
}

/// Published after every state transition the coordinator makes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceEvent {
    /// Session that changed.
    pub session_id: String,
    /// The transition.
    pub kind: AttendanceEventKind,
    /// Status after the transition.
    pub status: DisplayStatus,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    CheckIn,
    Reason,
}

impl Action {
    const fn name(self) -> &'static str {
        match self {
            Self::CheckIn => "check_in",
            Self::Reason => "submit_reason",
        }
    }
}

/// Decides and drives attendance submissions for one screen.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    api: Arc<dyn AttendanceApi>,
    reporter: Arc<dyn ErrorReporter>,
    geofence: GeofenceMonitor,
    clock: Arc<dyn Clock>,
    policy: AttendancePolicy,
    max_fix_age: std::time::Duration,
    events: broadcast::Sender<AttendanceEvent>,
}

impl std::fmt::Debug for SubmissionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionCoordinator")
            .field("geofence", &self.geofence)
            .field("policy", &self.policy)
            .field("max_fix_age", &self.max_fix_age)
            .finish_non_exhaustive()
    }
}

impl SubmissionCoordinator {
    /// Create a coordinator with the system clock and default policy.
    pub fn new(
        api: Arc<dyn AttendanceApi>,
        reporter: Arc<dyn ErrorReporter>,
        geofence: GeofenceMonitor,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            reporter,
            geofence,
            clock: Arc::new(SystemClock),
            policy: AttendancePolicy::default(),
            max_fix_age: std::time::Duration::from_secs(30),
            events,
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the attendance policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: AttendancePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the oldest cached fix accepted for a check-in.
    #[must_use]
    pub const fn with_max_fix_age(mut self, max_fix_age: std::time::Duration) -> Self {
        self.max_fix_age = max_fix_age;
        self
    }

    /// The geofence monitor.
    #[must_use]
    pub const fn geofence(&self) -> &GeofenceMonitor {
        &self.geofence
    }

    /// The policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &AttendancePolicy {
        &self.policy
    }

    /// Subscribe to attendance events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<AttendanceEvent> {
        self.events.subscribe()
    }

    /// Make `session`'s venue the active geofence region.
    ///
    /// # Errors
    ///
    /// Returns the monitor's error if the region cannot be registered.
    pub fn focus(&self, session: &SessionInfo) -> GeofenceResult<()> {
        self.geofence.set_active_region(GeofenceRegion {
            id: session.id.clone(),
            center: session.location,
            radius_meters: self.policy.geofence_radius_meters,
        })
    }

    /// Time window of `session` right now.
    #[must_use]
    pub fn time_window(&self, session: &SessionInfo) -> AttendanceTimeWindow {
        AttendanceTimeWindow::evaluate(self.clock.now(), session, &self.policy)
    }

    /// Capture the admission inputs for an already locked session, so a
    /// caller can read the session and its admission under one guard.
    #[must_use]
    pub fn admission_of(&self, session: &AttendanceSession) -> Admission {
        let info = session.info();
        Admission {
            window: self.time_window(info),
            inside_geofence: self.geofence.is_inside(&info.id),
            location_authorized: self.geofence.location().authorization_state().is_granted(),
            loading: session.is_loading(),
            submitted_this_run: session.has_submitted_this_run(),
        }
    }

    /// Capture the admission inputs for `session` now.
    #[must_use]
    pub fn admission(&self, session: &SessionHandle) -> Admission {
        self.admission_of(&lock_session(session))
    }

    /// Whether a GPS check-in may be submitted now.
    #[must_use]
    pub fn can_submit(&self, session: &SessionHandle) -> bool {
        self.admission(session).allows_check_in()
    }

    /// Whether a late or absence reason may be submitted now.
    #[must_use]
    pub fn can_submit_reason(&self, session: &SessionHandle) -> bool {
        self.admission(session).allows_reason()
    }

    /// Label for the attendance action of `session`.
    #[must_use]
    pub fn display_label(&self, session: &SessionHandle) -> DisplayLabel {
        let guard = lock_session(session);
        DisplayLabel::resolve(guard.attendance_status(), &self.admission_of(&guard))
    }

    /// Submit a GPS check-in.
    ///
    /// Admission is checked when the returned future is first polled; a
    /// refused attempt resolves to [`SubmitOutcome::NotAdmitted`] without
    /// touching the session.
    pub fn submit(&self, session: &SessionHandle, user_id: &str) -> BoxFuture<'static, SubmitOutcome> {
        let this = self.clone();
        let session = Arc::clone(session);
        let user_id = user_id.to_string();
        async move { this.run_check_in(session, user_id).await }.boxed()
    }

    /// Submit a late or absence reason.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] if the reason is empty or too long. Validation
    /// happens before any state transition.
    pub fn submit_reason(
        &self,
        session: &SessionHandle,
        user_id: &str,
        reason: &str,
    ) -> Result<BoxFuture<'static, SubmitOutcome>, SubmitError> {
        let reason = validate_reason(reason)?;
        Ok(self.reason_flow(session, user_id.to_string(), reason))
    }

    fn reason_flow(
        &self,
        session: &SessionHandle,
        user_id: String,
        reason: String,
    ) -> BoxFuture<'static, SubmitOutcome> {
        let this = self.clone();
        let session = Arc::clone(session);
        async move { this.run_reason(session, user_id, reason).await }.boxed()
    }

    /// Check admission and move to `loading` under one lock.
    ///
    /// Returns the session id and the slot before the move.
    fn begin(&self, session: &SessionHandle, action: Action) -> Option<(String, AttendanceSlot)> {
        let (session_id, previous, status) = {
            let mut guard = lock_session(session);
            let admission = self.admission_of(&guard);
            let admitted = match action {
                Action::CheckIn => admission.allows_check_in(),
                Action::Reason => admission.allows_reason(),
            };
            if !admitted {
                debug!(
                    session_id = %guard.info().id,
                    action = action.name(),
                    ?admission,
                    "Submission not admitted"
                );
                return None;
            }
            let previous = guard.update_state(Loadable::Loading);
            (guard.info().id.clone(), previous, guard.attendance_status())
        };

        info!(session_id = %session_id, action = action.name(), "Submitting attendance");
        self.publish(&session_id, AttendanceEventKind::Submitting, status);
        Some((session_id, previous))
    }

    async fn run_check_in(self, session: SessionHandle, user_id: String) -> SubmitOutcome {
        let Some((session_id, previous)) = self.begin(&session, Action::CheckIn) else {
            return SubmitOutcome::NotAdmitted;
        };

        let location = self.geofence.location();
        let result = match location.current_position(self.max_fix_age, self.clock.now()).await {
            Ok(position) if self.geofence.contains(&session_id, position.coordinate) => self
                .api
                .request_check_in(&session_id, &user_id, position.coordinate)
                .await
                .map_err(RollcallError::from),
            Ok(position) => {
                debug!(
                    session_id = %session_id,
                    latitude = position.coordinate.latitude,
                    longitude = position.coordinate.longitude,
                    "Check-in fix is outside the venue"
                );
                Err(RollcallError::OutsideGeofence(session_id.clone()))
            }
            Err(e) => Err(RollcallError::from(e)),
        };

        let retry: RetryAction = {
            let this = self.clone();
            let session = Arc::clone(&session);
            Arc::new(move || this.submit(&session, &user_id))
        };
        self.settle(&session, previous, result, Action::CheckIn, retry)
    }

    async fn run_reason(self, session: SessionHandle, user_id: String, reason: String) -> SubmitOutcome {
        let Some((session_id, previous)) = self.begin(&session, Action::Reason) else {
            return SubmitOutcome::NotAdmitted;
        };

        let result = self
            .api
            .submit_reason(&session_id, &user_id, &reason)
            .await
            .map_err(RollcallError::from);

        let retry: RetryAction = {
            let this = self.clone();
            let session = Arc::clone(&session);
            Arc::new(move || this.reason_flow(&session, user_id.clone(), reason.clone()))
        };
        self.settle(&session, previous, result, Action::Reason, retry)
    }

    /// Apply the result of a backend call to the session.
    fn settle(
        &self,
        session: &SessionHandle,
        previous: AttendanceSlot,
        result: Result<Attendance, RollcallError>,
        action: Action,
        retry: RetryAction,
    ) -> SubmitOutcome {
        let (session_id, kind, status, outcome, failure) = {
            let mut guard = lock_session(session);
            let session_id = guard.info().id.clone();
            let (kind, outcome, failure) = match result {
                Ok(attendance) => {
                    guard.update_state(Loadable::Loaded(attendance.clone()));
                    guard.mark_submitted();
                    (AttendanceEventKind::Recorded, SubmitOutcome::Recorded { attendance }, None)
                }
                Err(RollcallError::Domain(error)) => {
                    guard.update_state(Loadable::Failed(error.clone()));
                    (AttendanceEventKind::Rejected, SubmitOutcome::Rejected { error }, None)
                }
                Err(error) => {
                    let restored = match previous {
                        Loadable::Loaded(attendance) => Loadable::Loaded(attendance),
                        Loadable::Idle | Loadable::Loading | Loadable::Failed(_) => Loadable::Idle,
                    };
                    guard.update_state(restored);
                    let outcome = SubmitOutcome::RolledBack {
                        error: error.to_string(),
                    };
                    (AttendanceEventKind::RolledBack, outcome, Some(error))
                }
            };
            (session_id, kind, guard.attendance_status(), outcome, failure)
        };

        match (&outcome, failure) {
            (SubmitOutcome::Recorded { attendance }, _) => {
                info!(
                    session_id = %session_id,
                    action = action.name(),
                    status = ?attendance.status,
                    "Attendance recorded"
                );
            }
            (SubmitOutcome::Rejected { error }, _) => {
                info!(
                    session_id = %session_id,
                    action = action.name(),
                    error = %error,
                    "Attendance rejected"
                );
            }
            (_, Some(error)) => {
                warn!(
                    session_id = %session_id,
                    action = action.name(),
                    error_code = error.error_code(),
                    error = %error,
                    "Attendance submission failed; state rolled back"
                );
                self.reporter.report(
                    &error,
                    ErrorContext {
                        feature: FEATURE,
                        action: action.name(),
                        session_id: session_id.clone(),
                        retry: Some(retry),
                    },
                );
            }
            (_, None) => {}
        }

        self.publish(&session_id, kind, status);
        outcome
    }

    fn publish(&self, session_id: &str, kind: AttendanceEventKind, status: DisplayStatus) {
        // No subscribers is fine.
        let _ = self.events.send(AttendanceEvent {
            session_id: session_id.to_string(),
            kind,
            status,
        });
    }
}

/// Trim and bound a reason.
fn validate_reason(reason: &str) -> Result<String, SubmitError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(SubmitError::EmptyReason);
    }
    let actual = trimmed.chars().count();
    if actual > MAX_REASON_LENGTH {
        return Err(SubmitError::ReasonTooLong {
            max: MAX_REASON_LENGTH,
            actual,
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RequestError;
    use crate::geo;
    use crate::location::{AuthorizationState, LocationError, LocationProvider};
    use crate::mock::{
        FixedClock, MockAttendanceApi, MockGeofencePrimitive, MockLocationSource,
        RecordingErrorReporter,
    };
    use crate::types::{AttendanceStatus, Coordinate, Position};
    use chrono::{Duration, TimeZone};
    use tokio::time::timeout;
    use tokio_test::{assert_pending, assert_ready, task};

    const WAIT: std::time::Duration = std::time::Duration::from_secs(1);

    fn venue() -> Coordinate {
        Coordinate::new(37.5, 127.0)
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
    }

    fn info() -> SessionInfo {
        SessionInfo {
            id: "s1".to_string(),
            title: "Weekly session".to_string(),
            week: 3,
            starts_at: at(14, 0),
            ends_at: at(16, 0),
            location: venue(),
        }
    }

    fn attendance(status: AttendanceStatus) -> Attendance {
        Attendance {
            session_id: "s1".to_string(),
            status,
            location: None,
            reason: None,
            created_at: at(13, 0),
        }
    }

    struct Harness {
        api: Arc<MockAttendanceApi>,
        reporter: Arc<RecordingErrorReporter>,
        clock: Arc<FixedClock>,
        source: Arc<MockLocationSource>,
        coordinator: SubmissionCoordinator,
        session: SessionHandle,
    }

    /// A coordinator focused on `info()` with a fix `meters` north of the
    /// venue taken at `now`.
    fn harness_with(
        now: DateTime<Utc>,
        meters: f64,
        authorization: AuthorizationState,
        session: AttendanceSession,
    ) -> Harness {
        let clock = Arc::new(FixedClock::new(now));
        let source = Arc::new(MockLocationSource::new(authorization));
        let location = LocationProvider::new(source.clone());
        location.handle_update(Position {
            coordinate: geo::offset_north(venue(), meters),
            accuracy_meters: Some(5.0),
            recorded_at: now,
        });

        let monitor = GeofenceMonitor::new(Arc::new(MockGeofencePrimitive::new()), location);
        let api = Arc::new(MockAttendanceApi::new());
        let reporter = Arc::new(RecordingErrorReporter::new());
        let coordinator = SubmissionCoordinator::new(api.clone(), reporter.clone(), monitor)
            .with_clock(clock.clone());
        coordinator.focus(&info()).unwrap();

        Harness {
            api,
            reporter,
            clock,
            source,
            coordinator,
            session: session.into_handle(),
        }
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        harness_with(now, 10.0, AuthorizationState::Granted, AttendanceSession::new(info()))
    }

    fn slot(h: &Harness) -> AttendanceSlot {
        lock_session(&h.session).state().clone()
    }

    #[tokio::test]
    async fn test_admission_requires_all_five_conditions() {
        for mask in 0u8..32 {
            let on_time = mask & 1 != 0;
            let inside = mask & 2 != 0;
            let authorized = mask & 4 != 0;
            let idle = mask & 8 != 0;
            let fresh = mask & 16 != 0;

            let mut session = AttendanceSession::new(info());
            if !idle {
                session.update_state(Loadable::Loading);
            }
            if !fresh {
                session.mark_submitted();
            }
            let h = harness_with(
                if on_time { at(13, 50) } else { at(13, 30) },
                if inside { 10.0 } else { 200.0 },
                if authorized {
                    AuthorizationState::Granted
                } else {
                    AuthorizationState::Denied
                },
                session,
            );

            let expected = mask == 0b1_1111;
            assert_eq!(h.coordinator.can_submit(&h.session), expected, "mask {mask:05b}");
        }
    }

    #[tokio::test]
    async fn test_geofence_for_another_session_does_not_count() {
        let h = harness(at(13, 50));
        let other = SessionInfo {
            id: "s2".to_string(),
            ..info()
        };
        h.coordinator.focus(&other).unwrap();

        assert!(!h.coordinator.admission(&h.session).inside_geofence);
        assert!(!h.coordinator.can_submit(&h.session));
    }

    #[tokio::test]
    async fn test_on_time_submission_awaits_approval() {
        let h = harness(at(13, 50));
        let mut events = h.coordinator.subscribe_events();
        assert_eq!(h.coordinator.display_label(&h.session), DisplayLabel::CheckIn);

        let outcome = h.coordinator.submit(&h.session, "u1").await;

        assert!(matches!(outcome, SubmitOutcome::Recorded { .. }));
        {
            let session = lock_session(&h.session);
            assert!(matches!(
                session.state(),
                Loadable::Loaded(a) if a.status == AttendanceStatus::Pending
            ));
            assert!(session.has_submitted_this_run());
            assert_eq!(session.attendance_status(), DisplayStatus::PendingApproval);
        }
        assert_eq!(
            h.coordinator.display_label(&h.session),
            DisplayLabel::AwaitingApproval
        );
        assert!(!h.coordinator.can_submit(&h.session));

        let calls = h.api.check_in_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].session_id, "s1");
        assert_eq!(calls[0].user_id, "u1");

        let first = events.recv().await.unwrap();
        assert_eq!(first.kind, AttendanceEventKind::Submitting);
        let second = events.recv().await.unwrap();
        assert_eq!(second.kind, AttendanceEventKind::Recorded);
        assert_eq!(second.status, DisplayStatus::PendingApproval);
    }

    #[tokio::test]
    async fn test_late_window_allows_only_reason() {
        let h = harness(at(14, 25));

        assert!(!h.coordinator.can_submit(&h.session));
        assert!(h.coordinator.can_submit_reason(&h.session));
        assert_eq!(
            h.coordinator.display_label(&h.session),
            DisplayLabel::SubmitLateReason
        );
        assert_eq!(
            h.coordinator.submit(&h.session, "u1").await,
            SubmitOutcome::NotAdmitted
        );

        let outcome = h
            .coordinator
            .submit_reason(&h.session, "u1", "  Train delayed  ")
            .unwrap()
            .await;

        assert!(matches!(outcome, SubmitOutcome::Recorded { .. }));
        let calls = h.api.reason_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].reason, "Train delayed");
        assert!(h.api.check_in_calls().is_empty());
    }

    #[tokio::test]
    async fn test_reason_allowed_without_location() {
        let h = harness_with(
            at(14, 45),
            500.0,
            AuthorizationState::Denied,
            AttendanceSession::new(info()),
        );

        assert!(h.coordinator.can_submit_reason(&h.session));
        assert_eq!(h.coordinator.display_label(&h.session), DisplayLabel::Closed);
    }

    #[tokio::test]
    async fn test_reason_refused_while_on_time() {
        let h = harness(at(13, 50));

        let outcome = h
            .coordinator
            .submit_reason(&h.session, "u1", "Running late")
            .unwrap()
            .await;

        assert_eq!(outcome, SubmitOutcome::NotAdmitted);
        assert!(h.api.reason_calls().is_empty());
        assert_eq!(slot(&h), Loadable::Idle);
    }

    #[tokio::test]
    async fn test_reason_validation() {
        let h = harness(at(14, 25));

        assert_eq!(
            h.coordinator.submit_reason(&h.session, "u1", "   ").err(),
            Some(SubmitError::EmptyReason)
        );
        let long = "x".repeat(MAX_REASON_LENGTH + 1);
        assert_eq!(
            h.coordinator.submit_reason(&h.session, "u1", &long).err(),
            Some(SubmitError::ReasonTooLong {
                max: MAX_REASON_LENGTH,
                actual: MAX_REASON_LENGTH + 1,
            })
        );
        assert!(h
            .coordinator
            .submit_reason(&h.session, "u1", &"x".repeat(MAX_REASON_LENGTH))
            .is_ok());
        assert_eq!(slot(&h), Loadable::Idle);
    }

    #[tokio::test]
    async fn test_double_submit_is_single_flight() {
        let h = harness(at(13, 50));
        h.api.hold();

        let mut first = task::spawn(h.coordinator.submit(&h.session, "u1"));
        let mut second = task::spawn(h.coordinator.submit(&h.session, "u1"));

        assert_pending!(first.poll());
        assert_eq!(slot(&h), Loadable::Loading);
        assert_eq!(h.coordinator.display_label(&h.session), DisplayLabel::Submitting);
        assert_eq!(assert_ready!(second.poll()), SubmitOutcome::NotAdmitted);

        h.api.release();
        assert!(matches!(
            assert_ready!(first.poll()),
            SubmitOutcome::Recorded { .. }
        ));
        assert_eq!(h.api.check_in_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_restores_loaded_attendance() {
        let previous = attendance(AttendanceStatus::Pending);
        let h = harness_with(
            at(13, 50),
            10.0,
            AuthorizationState::Granted,
            AttendanceSession::with_attendance(info(), previous.clone()),
        );
        h.api
            .push_check_in(Err(RequestError::Transport("connection reset".into())));

        let outcome = h.coordinator.submit(&h.session, "u1").await;

        assert!(matches!(outcome, SubmitOutcome::RolledBack { .. }));
        assert_eq!(slot(&h), Loadable::Loaded(previous));
        assert!(!lock_session(&h.session).has_submitted_this_run());

        let reports = h.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].feature, "attendance");
        assert_eq!(reports[0].action, "check_in");
        assert_eq!(reports[0].error_code, "TRANSPORT_ERROR");
    }

    #[tokio::test]
    async fn test_transport_failure_from_idle_restores_idle() {
        let h = harness(at(13, 50));
        h.api
            .push_check_in(Err(RequestError::Transport("timeout".into())));

        h.coordinator.submit(&h.session, "u1").await;

        assert_eq!(slot(&h), Loadable::Idle);
        assert!(h.coordinator.can_submit(&h.session));
    }

    #[tokio::test]
    async fn test_retry_replays_submission() {
        let h = harness(at(13, 50));
        h.api
            .push_check_in(Err(RequestError::Transport("timeout".into())));
        h.coordinator.submit(&h.session, "u1").await;

        let retry = h.reporter.last_retry().expect("retry attached");
        let outcome = retry().await;

        assert!(matches!(outcome, SubmitOutcome::Recorded { .. }));
        assert_eq!(h.api.check_in_calls().len(), 2);
        assert!(lock_session(&h.session).has_submitted_this_run());
    }

    #[tokio::test]
    async fn test_reason_retry_replays_same_reason() {
        let h = harness(at(14, 25));
        h.api
            .push_reason(Err(RequestError::Transport("timeout".into())));
        let outcome = h
            .coordinator
            .submit_reason(&h.session, "u1", "Sick")
            .unwrap()
            .await;
        assert!(matches!(outcome, SubmitOutcome::RolledBack { .. }));

        let retry = h.reporter.last_retry().expect("retry attached");
        assert!(matches!(retry().await, SubmitOutcome::Recorded { .. }));

        let calls = h.api.reason_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].reason, "Sick");
        assert_eq!(h.reporter.reports()[0].action, "submit_reason");
    }

    #[tokio::test]
    async fn test_domain_failure_is_terminal() {
        let h = harness(at(13, 50));
        let mut events = h.coordinator.subscribe_events();
        h.api
            .push_check_in(Err(RequestError::Domain(DomainError::AlreadyRecorded)));

        let outcome = h.coordinator.submit(&h.session, "u1").await;

        assert_eq!(
            outcome,
            SubmitOutcome::Rejected {
                error: DomainError::AlreadyRecorded
            }
        );
        assert_eq!(slot(&h), Loadable::Failed(DomainError::AlreadyRecorded));
        assert!(h.reporter.reports().is_empty());

        events.recv().await.unwrap();
        assert_eq!(events.recv().await.unwrap().kind, AttendanceEventKind::Rejected);
    }

    #[tokio::test]
    async fn test_location_failure_rolls_back_without_calling_backend() {
        let h = harness(at(13, 50));
        // Cached fix is now too old.
        h.clock.advance(Duration::minutes(1));
        h.source
            .fail_next_request(LocationError::Unavailable("gps off".into()));

        let outcome = h.coordinator.submit(&h.session, "u1").await;

        assert!(matches!(outcome, SubmitOutcome::RolledBack { .. }));
        assert_eq!(slot(&h), Loadable::Idle);
        assert_eq!(h.source.request_count(), 1);
        assert!(h.api.check_in_calls().is_empty());
        assert_eq!(h.reporter.reports()[0].error_code, "LOCATION_UNAVAILABLE");
    }

    /// Submit with a stale cached fix and answer the one-shot request with a
    /// fix `meters` north of the venue.
    async fn submit_with_fresh_fix(h: &Harness, meters: f64) -> SubmitOutcome {
        h.clock.advance(Duration::minutes(1));
        let submission = tokio::spawn(h.coordinator.submit(&h.session, "u1"));

        let location = h.coordinator.geofence().location().clone();
        timeout(WAIT, async {
            while !location.has_pending_request() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("fix was never requested");

        location.handle_update(Position {
            coordinate: geo::offset_north(venue(), meters),
            accuracy_meters: Some(5.0),
            recorded_at: h.clock.now(),
        });
        timeout(WAIT, submission)
            .await
            .expect("submission did not finish")
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_fix_outside_venue_rolls_back() {
        let h = harness(at(13, 50));

        let outcome = submit_with_fresh_fix(&h, 5_000.0).await;

        assert!(matches!(outcome, SubmitOutcome::RolledBack { .. }));
        assert_eq!(slot(&h), Loadable::Idle);
        assert!(h.api.check_in_calls().is_empty());
        let reports = h.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].error_code, "OUTSIDE_GEOFENCE");
        assert!(h.reporter.last_retry().is_some());
    }

    #[tokio::test]
    async fn test_fresh_fix_inside_venue_is_sent() {
        let h = harness(at(13, 50));

        let outcome = submit_with_fresh_fix(&h, 20.0).await;

        assert!(matches!(outcome, SubmitOutcome::Recorded { .. }));
        let calls = h.api.check_in_calls();
        assert_eq!(calls.len(), 1);
        assert!(geo::distance_meters(calls[0].coordinate, venue()) < 50.0);
    }

    #[tokio::test]
    async fn test_admission_is_rechecked_at_action_time() {
        let h = harness(at(13, 50));
        assert!(h.coordinator.can_submit(&h.session));

        h.clock.set(at(14, 11));

        assert_eq!(
            h.coordinator.submit(&h.session, "u1").await,
            SubmitOutcome::NotAdmitted
        );
        assert_eq!(slot(&h), Loadable::Idle);
    }

    #[test]
    fn test_label_priority() {
        let ready = Admission {
            window: AttendanceTimeWindow::OnTime,
            inside_geofence: true,
            location_authorized: true,
            loading: false,
            submitted_this_run: false,
        };
        let resolve = DisplayLabel::resolve;

        assert_eq!(resolve(DisplayStatus::Pending, &ready), DisplayLabel::CheckIn);
        assert_eq!(
            resolve(DisplayStatus::Pending, &Admission { loading: true, ..ready }),
            DisplayLabel::Submitting
        );
        assert_eq!(
            resolve(DisplayStatus::PendingApproval, &Admission { loading: true, ..ready }),
            DisplayLabel::Submitting
        );
        assert_eq!(
            resolve(DisplayStatus::PendingApproval, &ready),
            DisplayLabel::AwaitingApproval
        );

        let expired = Admission {
            window: AttendanceTimeWindow::Expired,
            ..ready
        };
        assert_eq!(resolve(DisplayStatus::Present, &expired), DisplayLabel::Present);
        assert_eq!(resolve(DisplayStatus::Late, &expired), DisplayLabel::Late);
        assert_eq!(resolve(DisplayStatus::Absent, &expired), DisplayLabel::Absent);
        assert_eq!(resolve(DisplayStatus::Pending, &expired), DisplayLabel::Closed);

        let nothing = Admission {
            inside_geofence: false,
            location_authorized: false,
            ..ready
        };
        assert_eq!(
            resolve(
                DisplayStatus::Pending,
                &Admission {
                    window: AttendanceTimeWindow::TooEarly,
                    ..nothing
                }
            ),
            DisplayLabel::TooEarly
        );
        assert_eq!(
            resolve(
                DisplayStatus::Pending,
                &Admission {
                    window: AttendanceTimeWindow::LateWindow,
                    ..nothing
                }
            ),
            DisplayLabel::SubmitLateReason
        );
        assert_eq!(
            resolve(DisplayStatus::Pending, &nothing),
            DisplayLabel::LocationPermissionRequired
        );
        assert_eq!(
            resolve(
                DisplayStatus::Pending,
                &Admission {
                    location_authorized: true,
                    ..nothing
                }
            ),
            DisplayLabel::OutsideVenue
        );
    }

    #[test]
    fn test_label_text() {
        assert_eq!(DisplayLabel::CheckIn.text(), "Check in");
        assert_eq!(DisplayLabel::AwaitingApproval.text(), "Awaiting approval");
        let json = serde_json::to_string(&DisplayLabel::SubmitLateReason).unwrap();
        assert_eq!(json, r#""submit_late_reason""#);
    }
}
