//! OpenAPI specification generation for the rollcall bridge API.
//!
//! The generated document is consumed by the native shell's client
//! generator. Descriptions are written for the shell developers.

use axum::Json;
use rollcall_core::{
    Admission, Attendance, AttendanceStatus, AttendanceTimeWindow, AuthorizationState,
    Coordinate, DisplayLabel, DisplayStatus, DomainError, GeofenceRegion, GeofenceState,
    GeofenceTransition, HealthResponse, LocationProof, Position, RegionState, SessionInfo,
    SubmitOutcome,
};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::errors::RetryResponse;
use super::geofence::{GeofenceEventRequest, GeofenceEventResponse, GeofenceView};
use super::location::{
    AuthorizationUpdate, LocationFailureKind, LocationFailureReport, LocationView,
    PositionReport,
};
use super::sessions::{
    CheckInRequest, LoadSessionsRequest, ReasonRequest, SessionEntry, SessionListResponse,
    SessionView, SlotPhase, SlotView, SubmissionResponse,
};
use crate::reporter::ReportedError;

/// Serve the OpenAPI specification as JSON.
///
/// This endpoint is available at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
/// Used by the gen-openapi binary.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for rollcall.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "rollcall API",
        version = "0.1.0",
        description = r#"
# rollcall API

rollcall records attendance at club sessions from a participant's phone.

## Overview

The native shell owns the platform location and region-monitoring APIs and
talks to this bridge over HTTP:

1. **Sessions**: Load the session list, focus the session on screen, and read
   each session's time window, action label and whether check-in is allowed.
2. **Location**: Forward fixes, failures and permission changes.
3. **Geofence**: Read the region to monitor and forward region callbacks.
4. **Errors**: Show the latest reported failure and retry it once.

## Check-in rules

A GPS check-in is allowed from 10 minutes before to 10 minutes after the
session start, with location access granted, inside the session's venue
region, with no submission in flight and none already made. After that a
late or absence reason can be filed instead.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local rollcall bridge")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "sessions", description = "Session list, focus and attendance submission"),
        (name = "location", description = "Device location forwarded by the shell"),
        (name = "geofence", description = "Venue region monitoring forwarded by the shell"),
        (name = "errors", description = "Reported submission failures and retry")
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Session endpoints
        super::sessions::load_sessions,
        super::sessions::list_sessions,
        super::sessions::get_session,
        super::sessions::focus_session,
        super::sessions::check_in,
        super::sessions::submit_reason,
        // Location endpoints
        super::location::get_location,
        super::location::report_position,
        super::location::report_error,
        super::location::update_authorization,
        // Geofence endpoints
        super::geofence::get_geofence,
        super::geofence::clear_geofence,
        super::geofence::post_event,
        // Error endpoints
        super::errors::get_latest,
        super::errors::retry_latest,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            ReportedError,
            RetryResponse,
            // Health types
            HealthResponse,
            // Session types
            SessionInfo,
            Coordinate,
            Attendance,
            AttendanceStatus,
            LocationProof,
            DomainError,
            SessionEntry,
            LoadSessionsRequest,
            SessionListResponse,
            SessionView,
            SlotPhase,
            SlotView,
            Admission,
            AttendanceTimeWindow,
            DisplayLabel,
            DisplayStatus,
            CheckInRequest,
            ReasonRequest,
            SubmissionResponse,
            SubmitOutcome,
            // Location types
            AuthorizationState,
            Position,
            LocationView,
            PositionReport,
            LocationFailureKind,
            LocationFailureReport,
            AuthorizationUpdate,
            // Geofence types
            GeofenceRegion,
            GeofenceState,
            GeofenceTransition,
            RegionState,
            GeofenceView,
            GeofenceEventRequest,
            GeofenceEventResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "rollcall API");
        assert!(spec.paths.paths.contains_key("/api/sessions/{id}/check-in"));
        assert!(spec.paths.paths.contains_key("/api/geofence/events"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"rollcall API\""));
        assert!(json.contains("SubmitOutcome"));
    }
}
