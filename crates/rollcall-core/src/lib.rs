//! # rollcall-core
//!
//! Core logic for GPS-verified attendance check-in.
//!
//! This crate provides:
//! - Proximity monitoring against one active venue geofence
//! - Time-window classification of "now" against a session's start
//! - The per-session attendance state machine
//! - The submission coordinator: admission, single-flight submit, rollback
//! - Configuration loading and validation
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Sessions, coordinates, positions and attendance records
//! - [`geo`] - Great-circle distance
//! - [`time_window`] - The four-phase check-in window
//! - [`location`] - Location state holder and the platform source contract
//! - [`geofence`] - Single-region geofence monitor and the platform primitive contract
//! - [`session`] - `Loadable` slot and per-session attendance state
//! - [`api`] - Backend and error-reporter contracts
//! - [`coordinator`] - Admission decision and submission lifecycle
//! - [`config`] - Configuration loading, defaults, and validation
//! - [`error`] - Unified error types for the crate
//! - `mock` - Test doubles (tests and the `mock-location` feature)
//!
//! Platform services (location fixes, region monitoring) and the club
//! backend are injected through the [`location::LocationSource`],
//! [`geofence::GeofencePrimitive`] and [`api::AttendanceApi`] traits.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod geo;
pub mod geofence;
pub mod location;
#[cfg(any(test, feature = "mock-location"))]
pub mod mock;
pub mod session;
pub mod time_window;
pub mod types;

// Re-export primary types for convenience
pub use self::config::{
    default_config_path, AttendancePolicy, Config, ConfigError, ConfigResult, LocationConfig,
    ServerConfig, UpstreamConfig,
};
pub use api::{
    AttendanceApi, DomainError, ErrorContext, ErrorReporter, RequestError, RequestResult,
    RetryAction, TracingErrorReporter,
};
pub use coordinator::{
    Admission, AttendanceEvent, AttendanceEventKind, Clock, DisplayLabel, SubmissionCoordinator,
    SubmitError, SubmitOutcome, SystemClock, MAX_REASON_LENGTH,
};
pub use error::{Result, RollcallError};
pub use geofence::{
    GeofenceError, GeofenceMonitor, GeofencePrimitive, GeofenceRegion, GeofenceResult,
    GeofenceState, GeofenceTransition, RegionEvent, RegionEventStream, RegionState,
    RegionTransition,
};
pub use location::{
    AuthorizationState, LocationError, LocationProvider, LocationResult, LocationSource,
};
pub use session::{
    lock_session, AttendanceSession, AttendanceSlot, DisplayStatus, Loadable, SessionHandle,
};
pub use time_window::AttendanceTimeWindow;
pub use types::{
    Attendance, AttendanceStatus, Coordinate, HealthResponse, LocationProof, Position,
    SessionInfo,
};
