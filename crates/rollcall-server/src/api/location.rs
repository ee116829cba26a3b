//! Location bridge endpoints.
//!
//! The shell forwards fixes, failures and permission changes from the
//! platform location manager. `fix_requested` in `GET /api/location` tells it
//! a one-shot fix is being waited on.

use axum::extract::State;
use axum::routing::{post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rollcall_core::{AuthorizationState, Coordinate, LocationError, Position};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::{AppState, SharedState};

/// Creates the location router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(report_position).get(get_location))
        .route("/error", post(report_error))
        .route("/authorization", put(update_authorization))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Location provider snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationView {
    /// Whether the user allowed location access.
    pub authorization: AuthorizationState,

    /// The most recent accepted fix.
    pub last_known: Option<Position>,

    /// Whether a one-shot fix is being waited on.
    pub fix_requested: bool,
}

impl LocationView {
    fn current(state: &AppState) -> Self {
        Self {
            authorization: state.location.authorization_state(),
            last_known: state.location.last_known_position(),
            fix_requested: state.location.has_pending_request(),
        }
    }
}

/// A fix from the platform.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "latitude": 37.5, "longitude": 127.0, "accuracy_meters": 12.5 }))]
pub struct PositionReport {
    /// Latitude in degrees.
    #[schema(example = 37.5)]
    pub latitude: f64,

    /// Longitude in degrees.
    #[schema(example = 127.0)]
    pub longitude: f64,

    /// Horizontal accuracy in meters.
    #[serde(default)]
    pub accuracy_meters: Option<f64>,

    /// When the fix was taken. Defaults to now.
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Kind of location failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LocationFailureKind {
    /// Location services are off or unavailable.
    Unavailable,
    /// The fix request failed.
    RequestFailed,
    /// The request was abandoned.
    Cancelled,
}

/// A location failure from the platform.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "kind": "request_failed", "message": "kCLErrorLocationUnknown" }))]
pub struct LocationFailureReport {
    /// What failed.
    pub kind: LocationFailureKind,

    /// Platform message.
    #[serde(default)]
    pub message: String,
}

impl From<LocationFailureReport> for LocationError {
    fn from(report: LocationFailureReport) -> Self {
        match report.kind {
            LocationFailureKind::Unavailable => Self::Unavailable(report.message),
            LocationFailureKind::RequestFailed => Self::RequestFailed(report.message),
            LocationFailureKind::Cancelled => Self::Cancelled,
        }
    }
}

/// A permission change.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "authorization": "granted" }))]
pub struct AuthorizationUpdate {
    /// New authorization state.
    pub authorization: AuthorizationState,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the location state.
#[utoipa::path(
    get,
    path = "/api/location",
    tag = "location",
    operation_id = "getLocation",
    summary = "Get authorization, last fix and pending request",
    responses(
        (status = 200, description = "Location snapshot", body = LocationView)
    )
)]
pub async fn get_location(State(state): State<SharedState>) -> Json<LocationView> {
    Json(LocationView::current(&state))
}

/// Forward a fix.
#[utoipa::path(
    post,
    path = "/api/location",
    tag = "location",
    operation_id = "reportPosition",
    summary = "Forward a location fix",
    description = "Updates the last known position, answers a pending one-shot request \
        and re-checks the active geofence region by distance.",
    request_body = PositionReport,
    responses(
        (status = 200, description = "Fix accepted", body = LocationView),
        (status = 400, description = "Coordinate out of range", body = crate::api::ErrorResponse)
    )
)]
pub async fn report_position(
    State(state): State<SharedState>,
    Json(report): Json<PositionReport>,
) -> ApiResult<Json<LocationView>> {
    let coordinate = Coordinate::new(report.latitude, report.longitude);
    if !coordinate.is_valid() {
        return Err(ApiError::BadRequest {
            error_code: "invalid_coordinate".to_string(),
            message: format!(
                "Coordinate ({}, {}) is out of range",
                report.latitude, report.longitude
            ),
        });
    }

    state.location.handle_update(Position {
        coordinate,
        accuracy_meters: report.accuracy_meters,
        recorded_at: report.recorded_at.unwrap_or_else(|| state.clock.now()),
    });

    Ok(Json(LocationView::current(&state)))
}

/// Forward a failure.
#[utoipa::path(
    post,
    path = "/api/location/error",
    tag = "location",
    operation_id = "reportLocationError",
    summary = "Forward a location failure",
    description = "Fails the pending one-shot request, if any.",
    request_body = LocationFailureReport,
    responses(
        (status = 200, description = "Failure recorded", body = LocationView)
    )
)]
pub async fn report_error(
    State(state): State<SharedState>,
    Json(report): Json<LocationFailureReport>,
) -> Json<LocationView> {
    state.location.handle_error(report.into());
    Json(LocationView::current(&state))
}

/// Forward a permission change.
#[utoipa::path(
    put,
    path = "/api/location/authorization",
    tag = "location",
    operation_id = "updateAuthorization",
    summary = "Forward a permission change",
    description = "A denial fails the pending one-shot request.",
    request_body = AuthorizationUpdate,
    responses(
        (status = 200, description = "Authorization updated", body = LocationView)
    )
)]
pub async fn update_authorization(
    State(state): State<SharedState>,
    Json(update): Json<AuthorizationUpdate>,
) -> Json<LocationView> {
    state
        .location
        .handle_authorization_change(update.authorization);
    Json(LocationView::current(&state))
}
