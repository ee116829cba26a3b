//! Unified error types for the rollcall core library.
//!
//! Each module has its own error type ([`LocationError`], [`GeofenceError`],
//! [`ConfigError`], [`RequestError`], [`SubmitError`]). [`RollcallError`]
//! gathers them for callers that cross module boundaries: the error
//! reporter, the HTTP bridge, and binaries.
//!
//! The split that matters most is domain vs. transport:
//!
//! - **Domain** errors are business rejections from the backend. They are
//!   terminal for the attempt and shown inline.
//! - **Transport** errors (network, decoding, failed location fixes) are
//!   recoverable. The coordinator rolls state back and reports them with a
//!   retry hook.
//!
//! # Example
//!
//! ```rust
//! use rollcall_core::error::{Result, RollcallError};
//!
//! fn require_reason(reason: &str) -> Result<()> {
//!     if reason.trim().is_empty() {
//!         return Err(RollcallError::EmptyReason);
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_reason("  ").unwrap_err().is_validation_error());
//! ```

use thiserror::Error;

use crate::api::{DomainError, RequestError};
use crate::config::ConfigError;
use crate::coordinator::SubmitError;
use crate::geofence::GeofenceError;
use crate::location::LocationError;

/// The unified error type for rollcall operations.
#[derive(Debug, Error)]
pub enum RollcallError {
    // =========================================================================
    // SUBMISSION ERRORS
    // =========================================================================
    /// The backend rejected the request.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The backend could not be reached or answered unusably.
    #[error("Attendance service unreachable: {0}. Check your connection and try again.")]
    Transport(String),

    /// A reason was required but empty.
    #[error("A reason is required")]
    EmptyReason,

    /// The reason is longer than allowed.
    #[error("Reason exceeds maximum length of {max} characters (got {actual})")]
    ReasonTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length provided.
        actual: usize,
    },

    /// No session with this identifier is loaded.
    #[error("Session not found: '{0}'")]
    SessionNotFound(String),

    // =========================================================================
    // LOCATION ERRORS
    // =========================================================================
    /// Location access is not granted.
    #[error("Location access has not been granted. Enable location permission in settings.")]
    LocationAuthorizationDenied,

    /// Location services cannot produce a fix.
    #[error("Location services are unavailable: {0}")]
    LocationUnavailable(String),

    /// A location request failed.
    #[error("Could not determine your location: {0}")]
    LocationRequestFailed(String),

    /// A location request was abandoned.
    #[error("Location request was cancelled")]
    LocationCancelled,

    /// The fix used for a check-in is not inside the session's venue.
    #[error("Your location is outside the venue for session '{0}'")]
    OutsideGeofence(String),

    // =========================================================================
    // GEOFENCE ERRORS
    // =========================================================================
    /// A region definition is unusable.
    #[error("Invalid geofence region: {0}")]
    InvalidRegion(String),

    /// The platform refused to monitor a region.
    #[error("Geofence registration failed: {0}")]
    GeofenceRegistrationFailed(String),

    /// The platform event stream failed.
    #[error("Geofence monitoring failed: {0}")]
    GeofenceStreamFailed(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found.
    #[error("Configuration file not found at: {0}")]
    ConfigNotFound(String),

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration holds invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),
}

/// A specialized [`Result`] type for rollcall operations.
pub type Result<T> = std::result::Result<T, RollcallError>;

impl RollcallError {
    /// Returns `true` for backend business rejections.
    #[inline]
    #[must_use]
    pub const fn is_domain_error(&self) -> bool {
        matches!(self, Self::Domain(_))
    }

    /// Returns `true` for transport-class failures, including failed
    /// location fixes.
    #[inline]
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::LocationUnavailable(_)
                | Self::LocationRequestFailed(_)
                | Self::LocationCancelled
                | Self::OutsideGeofence(_)
        )
    }

    /// Returns `true` for location errors.
    #[inline]
    #[must_use]
    pub const fn is_location_error(&self) -> bool {
        matches!(
            self,
            Self::LocationAuthorizationDenied
                | Self::LocationUnavailable(_)
                | Self::LocationRequestFailed(_)
                | Self::LocationCancelled
                | Self::OutsideGeofence(_)
        )
    }

    /// Returns `true` for geofence errors.
    #[inline]
    #[must_use]
    pub const fn is_geofence_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRegion(_)
                | Self::GeofenceRegistrationFailed(_)
                | Self::GeofenceStreamFailed(_)
        )
    }

    /// Returns `true` for configuration errors.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` for rejected user input.
    #[inline]
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::EmptyReason | Self::ReasonTooLong { .. })
    }

    /// Returns `true` if retrying the same call may succeed.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.is_transport_error() || matches!(self, Self::GeofenceStreamFailed(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::EmptyReason | Self::ReasonTooLong { .. } | Self::InvalidRegion(_) => 400,

            // 403 Forbidden - permission missing
            Self::LocationAuthorizationDenied => 403,

            // 404 Not Found
            Self::SessionNotFound(_) | Self::ConfigNotFound(_) => 404,

            // 409 Conflict - refused in the current state
            Self::Domain(_) | Self::OutsideGeofence(_) => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 502 Bad Gateway - backend unreachable
            Self::Transport(_) => 502,

            // 503 Service Unavailable - platform services
            Self::LocationUnavailable(_)
            | Self::LocationRequestFailed(_)
            | Self::LocationCancelled
            | Self::GeofenceRegistrationFailed(_)
            | Self::GeofenceStreamFailed(_) => 503,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::AlreadyRecorded) => "ALREADY_RECORDED",
            Self::Domain(DomainError::OutsideWindow) => "OUTSIDE_WINDOW",
            Self::Domain(DomainError::NotAuthorized) => "NOT_AUTHORIZED",
            Self::Domain(DomainError::LocationRejected) => "LOCATION_REJECTED",
            Self::Domain(DomainError::Rejected { .. }) => "REJECTED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::EmptyReason => "EMPTY_REASON",
            Self::ReasonTooLong { .. } => "REASON_TOO_LONG",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::LocationAuthorizationDenied => "LOCATION_AUTHORIZATION_DENIED",
            Self::LocationUnavailable(_) => "LOCATION_UNAVAILABLE",
            Self::LocationRequestFailed(_) => "LOCATION_REQUEST_FAILED",
            Self::LocationCancelled => "LOCATION_CANCELLED",
            Self::OutsideGeofence(_) => "OUTSIDE_GEOFENCE",
            Self::InvalidRegion(_) => "INVALID_REGION",
            Self::GeofenceRegistrationFailed(_) => "GEOFENCE_REGISTRATION_FAILED",
            Self::GeofenceStreamFailed(_) => "GEOFENCE_STREAM_FAILED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<RequestError> for RollcallError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Domain(e) => Self::Domain(e),
            RequestError::Transport(message) => Self::Transport(message),
        }
    }
}

impl From<LocationError> for RollcallError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::AuthorizationDenied => Self::LocationAuthorizationDenied,
            LocationError::Unavailable(message) => Self::LocationUnavailable(message),
            LocationError::RequestFailed(message) => Self::LocationRequestFailed(message),
            LocationError::Cancelled => Self::LocationCancelled,
        }
    }
}

impl From<GeofenceError> for RollcallError {
    fn from(err: GeofenceError) -> Self {
        match err {
            GeofenceError::InvalidRegion { .. } => Self::InvalidRegion(err.to_string()),
            GeofenceError::RegistrationFailed(message) => {
                Self::GeofenceRegistrationFailed(message)
            }
            GeofenceError::StreamFailed(message) => Self::GeofenceStreamFailed(message),
        }
    }
}

impl From<ConfigError> for RollcallError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<SubmitError> for RollcallError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::EmptyReason => Self::EmptyReason,
            SubmitError::ReasonTooLong { max, actual } => Self::ReasonTooLong { max, actual },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_vs_transport_classification() {
        let domain = RollcallError::Domain(DomainError::AlreadyRecorded);
        assert!(domain.is_domain_error());
        assert!(!domain.is_transport_error());
        assert!(!domain.is_recoverable());

        let transport = RollcallError::Transport("connection reset".into());
        assert!(transport.is_transport_error());
        assert!(transport.is_recoverable());
        assert!(!transport.is_domain_error());
    }

    #[test]
    fn test_location_failures_are_transport_class() {
        let failed: RollcallError = LocationError::RequestFailed("timeout".into()).into();
        assert!(failed.is_location_error());
        assert!(failed.is_transport_error());

        let denied: RollcallError = LocationError::AuthorizationDenied.into();
        assert!(denied.is_location_error());
        assert!(!denied.is_transport_error());
        assert!(!denied.is_recoverable());
    }

    #[test]
    fn test_geofence_classification() {
        let err: RollcallError = GeofenceError::StreamFailed("crashed".into()).into();
        assert!(err.is_geofence_error());
        assert!(err.is_recoverable());

        let invalid: RollcallError = GeofenceError::InvalidRegion {
            id: "s1".into(),
            message: "radius must be positive".into(),
        }
        .into();
        assert!(invalid.to_string().contains("s1"));
        assert_eq!(invalid.http_status_code(), 400);
    }

    #[test]
    fn test_request_error_conversion() {
        let err: RollcallError = RequestError::Domain(DomainError::OutsideWindow).into();
        assert_eq!(err.error_code(), "OUTSIDE_WINDOW");

        let err: RollcallError = RequestError::Transport("502".into()).into();
        assert_eq!(err.error_code(), "TRANSPORT_ERROR");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: RollcallError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "server.port",
                message: "must be between 1 and 65535".into(),
            },
            ConfigError::ValidationError {
                field: "policy.geofence_radius_meters",
                message: "must be positive".into(),
            },
        ])
        .into();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("server.port"));
        assert!(err.to_string().contains("policy.geofence_radius_meters"));
    }

    #[test]
    fn test_submit_error_conversion() {
        let err: RollcallError = SubmitError::ReasonTooLong {
            max: 500,
            actual: 600,
        }
        .into();
        assert!(err.is_validation_error());
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(RollcallError::EmptyReason.http_status_code(), 400);
        assert_eq!(RollcallError::LocationAuthorizationDenied.http_status_code(), 403);
        assert_eq!(
            RollcallError::SessionNotFound("s1".into()).http_status_code(),
            404
        );
        assert_eq!(
            RollcallError::Domain(DomainError::NotAuthorized).http_status_code(),
            409
        );
        assert_eq!(RollcallError::Transport("x".into()).http_status_code(), 502);
        assert_eq!(RollcallError::LocationCancelled.http_status_code(), 503);
    }

    #[test]
    fn test_outside_geofence_is_recoverable_location_error() {
        let err = RollcallError::OutsideGeofence("s1".into());
        assert!(err.is_location_error());
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "OUTSIDE_GEOFENCE");
        assert_eq!(err.http_status_code(), 409);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RollcallError>();
        assert_sync::<RollcallError>();
    }
}
