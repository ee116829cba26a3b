//! Geofence bridge endpoints.
//!
//! The shell reads which region to monitor from `GET /api/geofence` and
//! forwards the platform's region callbacks to `POST /api/geofence/events`.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use rollcall_core::{GeofenceRegion, GeofenceState, RegionEvent, RegionState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::{AppState, SharedState};

/// Creates the geofence router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_geofence).delete(clear_geofence))
        .route("/events", post(post_event))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Geofence monitor snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeofenceView {
    /// The single active region.
    pub active_region: Option<GeofenceRegion>,

    /// Proximity to the active region.
    pub state: GeofenceState,

    /// Whether a watcher is running for the active region.
    pub monitoring: bool,

    /// Regions the shell should hand to the platform.
    pub registered: Vec<GeofenceRegion>,
}

impl GeofenceView {
    /// Snapshot the monitor and the bridge.
    #[must_use]
    pub fn current(state: &AppState) -> Self {
        let geofence = state.geofence();
        Self {
            active_region: geofence.active_region(),
            state: geofence.current_state(),
            monitoring: geofence.is_monitoring(),
            registered: state.geofence_bridge.registered(),
        }
    }
}

/// A platform region callback. Carries either a new state or a failure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "region_id": "session-42", "state": "satisfied" }))]
pub struct GeofenceEventRequest {
    /// Region the callback is about.
    #[schema(example = "session-42")]
    pub region_id: String,

    /// New region state.
    #[serde(default)]
    pub state: Option<RegionState>,

    /// Monitoring failure reported by the platform.
    #[serde(default)]
    pub error: Option<String>,
}

/// Whether a callback reached a watcher.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeofenceEventResponse {
    /// Always `true`; undelivered callbacks return 404.
    pub accepted: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the geofence state.
#[utoipa::path(
    get,
    path = "/api/geofence",
    tag = "geofence",
    operation_id = "getGeofence",
    summary = "Get the active region and proximity",
    responses(
        (status = 200, description = "Geofence snapshot", body = GeofenceView)
    )
)]
pub async fn get_geofence(State(state): State<SharedState>) -> Json<GeofenceView> {
    Json(GeofenceView::current(&state))
}

/// Clear the active region.
#[utoipa::path(
    delete,
    path = "/api/geofence",
    tag = "geofence",
    operation_id = "clearGeofence",
    summary = "Stop monitoring",
    description = "Removes the active region. The device counts as outside until a \
        session is focused again. Safe to call with no active region.",
    responses(
        (status = 200, description = "Geofence snapshot", body = GeofenceView)
    )
)]
pub async fn clear_geofence(State(state): State<SharedState>) -> Json<GeofenceView> {
    state.geofence().clear_active_region();
    info!("Geofence cleared by the shell");
    Json(GeofenceView::current(&state))
}

/// Forward a platform region callback.
#[utoipa::path(
    post,
    path = "/api/geofence/events",
    tag = "geofence",
    operation_id = "postGeofenceEvent",
    summary = "Forward a region callback",
    description = "Exactly one of `state` and `error` must be set. Callbacks for regions \
        that are not registered are refused with 404.",
    request_body = GeofenceEventRequest,
    responses(
        (status = 200, description = "Delivered", body = GeofenceEventResponse),
        (status = 400, description = "Neither or both of state and error", body = crate::api::ErrorResponse),
        (status = 404, description = "Region not registered", body = crate::api::ErrorResponse)
    )
)]
pub async fn post_event(
    State(state): State<SharedState>,
    Json(request): Json<GeofenceEventRequest>,
) -> ApiResult<Json<GeofenceEventResponse>> {
    let delivered = match (request.state, request.error) {
        (Some(region_state), None) => {
            debug!(region_id = %request.region_id, state = ?region_state, "Region callback");
            state.geofence_bridge.deliver(RegionEvent {
                region_id: request.region_id.clone(),
                state: region_state,
            })
        }
        (None, Some(message)) => {
            debug!(region_id = %request.region_id, error = %message, "Region failure callback");
            state.geofence_bridge.fail(&request.region_id, message)
        }
        _ => {
            return Err(ApiError::BadRequest {
                error_code: "invalid_event".to_string(),
                message: "Exactly one of 'state' and 'error' must be set".to_string(),
            });
        }
    };

    if !delivered {
        return Err(ApiError::NotFound {
            error_code: "region_not_registered".to_string(),
            message: format!("Region '{}' is not registered", request.region_id),
        });
    }

    Ok(Json(GeofenceEventResponse { accepted: true }))
}
