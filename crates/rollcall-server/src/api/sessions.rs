//! Session list and attendance submission endpoints.
//!
//! The shell loads the session list once per screen, then asks for each
//! session's view (window, label, whether the action is enabled) and posts
//! check-ins and late/absence reasons.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use rollcall_core::{
    lock_session, Admission, Attendance, AttendanceSession, AttendanceSlot, AttendanceTimeWindow,
    DisplayLabel, DisplayStatus, DomainError, Loadable, SessionHandle, SessionInfo,
    SubmissionCoordinator, SubmitOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::geofence::GeofenceView;
use crate::state::SharedState;

/// Creates the sessions router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_sessions).put(load_sessions))
        .route("/{id}", get(get_session))
        .route("/{id}/focus", post(focus_session))
        .route("/{id}/check-in", post(check_in))
        .route("/{id}/reason", post(submit_reason))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// One session in a list load.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionEntry {
    /// The schedule.
    pub session: SessionInfo,

    /// A previously fetched attendance record, if any.
    #[serde(default)]
    pub attendance: Option<Attendance>,
}

/// Request body for loading the session list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoadSessionsRequest {
    /// Sessions shown on the attendance screen.
    pub sessions: Vec<SessionEntry>,
}

/// Phase of the attendance slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SlotPhase {
    /// Nothing requested.
    Idle,
    /// A submission is in flight.
    Loading,
    /// A record is loaded.
    Loaded,
    /// The backend rejected the last submission.
    Failed,
}

/// The attendance slot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SlotView {
    /// Phase.
    pub phase: SlotPhase,

    /// The loaded record, when `loaded`.
    pub attendance: Option<Attendance>,

    /// The rejection, when `failed`.
    pub error: Option<DomainError>,
}

impl From<&AttendanceSlot> for SlotView {
    fn from(slot: &AttendanceSlot) -> Self {
        match slot {
            Loadable::Idle => Self {
                phase: SlotPhase::Idle,
                attendance: None,
                error: None,
            },
            Loadable::Loading => Self {
                phase: SlotPhase::Loading,
                attendance: None,
                error: None,
            },
            Loadable::Loaded(attendance) => Self {
                phase: SlotPhase::Loaded,
                attendance: Some(attendance.clone()),
                error: None,
            },
            Loadable::Failed(error) => Self {
                phase: SlotPhase::Failed,
                attendance: None,
                error: Some(error.clone()),
            },
        }
    }
}

/// Everything the attendance screen shows for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "session": {
        "id": "session-42",
        "title": "Weekly session",
        "week": 3,
        "starts_at": "2026-03-14T14:00:00Z",
        "ends_at": "2026-03-14T16:00:00Z",
        "location": { "latitude": 37.5, "longitude": 127.0 }
    },
    "window": "on_time",
    "admission": {
        "window": "on_time",
        "inside_geofence": true,
        "location_authorized": true,
        "loading": false,
        "submitted_this_run": false
    },
    "can_submit": true,
    "can_submit_reason": false,
    "label": "check_in",
    "label_text": "Check in",
    "status": "pending",
    "has_submitted_this_run": false,
    "slot": { "phase": "idle", "attendance": null, "error": null }
}))]
pub struct SessionView {
    /// The schedule.
    pub session: SessionInfo,

    /// Time window right now.
    pub window: AttendanceTimeWindow,

    /// Admission inputs right now.
    pub admission: Admission,

    /// Whether a GPS check-in may be submitted.
    pub can_submit: bool,

    /// Whether a late or absence reason may be submitted.
    pub can_submit_reason: bool,

    /// Action label.
    pub label: DisplayLabel,

    /// Action label text.
    #[schema(example = "Check in")]
    pub label_text: String,

    /// Status shown to the participant.
    pub status: DisplayStatus,

    /// Whether a submission succeeded during this run.
    pub has_submitted_this_run: bool,

    /// The attendance slot.
    pub slot: SlotView,
}

/// Session list response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionListResponse {
    /// Views ordered by session identifier.
    pub sessions: Vec<SessionView>,
}

/// Request body for a GPS check-in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "user_id": "user-7" }))]
pub struct CheckInRequest {
    /// Participant identifier.
    #[schema(example = "user-7")]
    pub user_id: String,
}

/// Request body for a late or absence reason.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "user_id": "user-7", "reason": "Train delayed by 20 minutes" }))]
pub struct ReasonRequest {
    /// Participant identifier.
    #[schema(example = "user-7")]
    pub user_id: String,

    /// Why the participant could not check in. Required, at most 500
    /// characters after trimming.
    #[schema(example = "Train delayed by 20 minutes", min_length = 1, max_length = 500)]
    pub reason: String,
}

/// Result of a submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmissionResponse {
    /// How the attempt ended.
    pub outcome: SubmitOutcome,

    /// The session afterwards.
    pub session: SessionView,
}

// ============================================================================
// Handlers
// ============================================================================

/// Load the session list.
#[utoipa::path(
    put,
    path = "/api/sessions",
    tag = "sessions",
    operation_id = "loadSessions",
    summary = "Load the session list",
    description = "Replaces the sessions on the attendance screen. Each entry may carry a \
        previously fetched attendance record. Submission flags start cleared.",
    request_body = LoadSessionsRequest,
    responses(
        (status = 200, description = "Sessions loaded", body = SessionListResponse)
    )
)]
pub async fn load_sessions(
    State(state): State<SharedState>,
    Json(request): Json<LoadSessionsRequest>,
) -> Json<SessionListResponse> {
    let sessions: Vec<AttendanceSession> = request
        .sessions
        .into_iter()
        .map(|entry| match entry.attendance {
            Some(attendance) => AttendanceSession::with_attendance(entry.session, attendance),
            None => AttendanceSession::new(entry.session),
        })
        .collect();

    let handles = state.replace_sessions(sessions).await;
    info!(count = handles.len(), "Session list loaded");

    Json(SessionListResponse {
        sessions: handles
            .iter()
            .map(|handle| session_view(&state.coordinator, handle))
            .collect(),
    })
}

/// List sessions.
#[utoipa::path(
    get,
    path = "/api/sessions",
    tag = "sessions",
    operation_id = "listSessions",
    summary = "List sessions",
    description = "Returns the view of every loaded session, recomputed now.",
    responses(
        (status = 200, description = "Sessions", body = SessionListResponse)
    )
)]
pub async fn list_sessions(State(state): State<SharedState>) -> Json<SessionListResponse> {
    let handles = state.sessions().await;
    Json(SessionListResponse {
        sessions: handles
            .iter()
            .map(|handle| session_view(&state.coordinator, handle))
            .collect(),
    })
}

/// Get one session.
#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    tag = "sessions",
    operation_id = "getSession",
    summary = "Get a session's attendance view",
    description = "Returns the time window, admission inputs, action label and slot of a \
        session. Recomputed on every call; poll it to keep the action up to date.",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session view", body = SessionView),
        (status = 404, description = "Unknown session", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let handle = find(&state, &id).await?;
    Ok(Json(session_view(&state.coordinator, &handle)))
}

/// Focus a session.
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/focus",
    tag = "sessions",
    operation_id = "focusSession",
    summary = "Monitor a session's venue",
    description = "Makes the session's venue the single active geofence region, replacing \
        any other. Idempotent for the session already focused.",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Region active", body = GeofenceView),
        (status = 400, description = "Venue coordinate unusable", body = crate::api::ErrorResponse),
        (status = 404, description = "Unknown session", body = crate::api::ErrorResponse),
        (status = 503, description = "Region could not be registered", body = crate::api::ErrorResponse)
    )
)]
pub async fn focus_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GeofenceView>> {
    let handle = find(&state, &id).await?;
    let info = lock_session(&handle).info().clone();
    state.coordinator.focus(&info)?;
    Ok(Json(GeofenceView::current(&state)))
}

/// Submit a GPS check-in.
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/check-in",
    tag = "sessions",
    operation_id = "checkIn",
    summary = "Submit a GPS check-in",
    description = "Re-checks admission, then submits the current position. A refused \
        attempt returns `not_admitted` without changing anything. A transport failure \
        restores the previous state and is available from `/api/errors/latest`.",
    params(("id" = String, Path, description = "Session identifier")),
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Attempt finished", body = SubmissionResponse),
        (status = 404, description = "Unknown session", body = crate::api::ErrorResponse)
    )
)]
pub async fn check_in(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<CheckInRequest>,
) -> ApiResult<Json<SubmissionResponse>> {
    let handle = find(&state, &id).await?;
    let outcome = state.coordinator.submit(&handle, &request.user_id).await;
    Ok(Json(SubmissionResponse {
        outcome,
        session: session_view(&state.coordinator, &handle),
    }))
}

/// Submit a late or absence reason.
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/reason",
    tag = "sessions",
    operation_id = "submitReason",
    summary = "Submit a late or absence reason",
    description = "Allowed once the on-time window has passed. Location is not required.",
    params(("id" = String, Path, description = "Session identifier")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Attempt finished", body = SubmissionResponse),
        (status = 400, description = "Empty or too long reason", body = crate::api::ErrorResponse),
        (status = 404, description = "Unknown session", body = crate::api::ErrorResponse)
    )
)]
pub async fn submit_reason(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ReasonRequest>,
) -> ApiResult<Json<SubmissionResponse>> {
    let handle = find(&state, &id).await?;
    let outcome = state
        .coordinator
        .submit_reason(&handle, &request.user_id, &request.reason)?
        .await;
    Ok(Json(SubmissionResponse {
        outcome,
        session: session_view(&state.coordinator, &handle),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

async fn find(state: &SharedState, id: &str) -> ApiResult<SessionHandle> {
    state
        .session(id)
        .await
        .ok_or_else(|| ApiError::session_not_found(id))
}

/// Build the view of a session.
pub fn session_view(coordinator: &SubmissionCoordinator, handle: &SessionHandle) -> SessionView {
    let session = lock_session(handle);
    let admission = coordinator.admission_of(&session);
    let status = session.attendance_status();
    let label = DisplayLabel::resolve(status, &admission);

    SessionView {
        session: session.info().clone(),
        window: admission.window,
        admission,
        can_submit: admission.allows_check_in(),
        can_submit_reason: admission.allows_reason(),
        label,
        label_text: label.text().to_string(),
        status,
        has_submitted_this_run: session.has_submitted_this_run(),
        slot: SlotView::from(session.state()),
    }
}
