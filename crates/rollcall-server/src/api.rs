//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `sessions` - Session list, focus, check-in and reasons
//! - `location` - Location fixes and permission forwarded by the shell
//! - `geofence` - Region monitoring forwarded by the shell
//! - `errors` - Latest reported failure and retry
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod error;
pub mod errors;
pub mod geofence;
pub mod health;
pub mod location;
pub mod openapi;
pub mod sessions;

pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                         - Health check
/// /api
/// ├── /sessions                   - Session list (GET, PUT)
/// │   ├── /{id}                   - Session view
/// │   ├── /{id}/focus             - Monitor the session's venue
/// │   ├── /{id}/check-in          - GPS check-in
/// │   └── /{id}/reason            - Late or absence reason
/// ├── /location                   - Fixes, failures, permission
/// ├── /geofence                   - Active region and callbacks
/// ├── /errors                     - Latest failure and retry
/// └── /openapi.json               - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                // OpenAPI spec at /api/openapi.json
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/sessions", sessions::router())
                .nest("/location", location::router())
                .nest("/geofence", geofence::router())
                .nest("/errors", errors::router()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
