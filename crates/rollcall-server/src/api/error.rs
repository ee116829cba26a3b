//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rollcall_core::{GeofenceError, LocationError, RollcallError, SubmitError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 403 Forbidden - The user has not granted a required permission.
    Forbidden {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - Operation cannot be completed due to current state.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details (not exposed to client in production).
        details: Option<String>,
    },

    /// 502 Bad Gateway - The club backend could not be reached.
    BadGateway {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 503 Service Unavailable - A platform service (location, geofencing) is unavailable.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "session_not_found",
    "message": "Session not found: 'session-42'",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "session_not_found").
    #[schema(example = "session_not_found")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Session not found: 'session-42'")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// A 404 for an unknown session.
    #[must_use]
    pub fn session_not_found(id: &str) -> Self {
        Self::from(RollcallError::SessionNotFound(id.to_string()))
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn into_body(self) -> ErrorResponse {
        let (error, message, details) = match self {
            Self::BadRequest { error_code, message }
            | Self::Forbidden { error_code, message }
            | Self::NotFound { error_code, message }
            | Self::Conflict { error_code, message }
            | Self::BadGateway { error_code, message } => (error_code, message, None),
            Self::InternalError {
                error_code,
                message,
                details,
            }
            | Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => (error_code, message, details),
        };

        ErrorResponse {
            error,
            message,
            details: details.map(serde_json::Value::String),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        }
        (status, Json(self.into_body())).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::InternalError { message, .. }
            | Self::BadGateway { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        };
        let reason = self.status().canonical_reason().unwrap_or("Error");
        write!(f, "{reason}: {message}")
    }
}

impl std::error::Error for ApiError {}

/// Convert from rollcall_core errors.
impl From<RollcallError> for ApiError {
    fn from(err: RollcallError) -> Self {
        let error_code = err.error_code().to_ascii_lowercase();
        let message = err.to_string();

        match err.http_status_code() {
            400 => Self::BadRequest {
                error_code,
                message,
            },
            403 => Self::Forbidden {
                error_code,
                message,
            },
            404 => Self::NotFound {
                error_code,
                message,
            },
            409 => Self::Conflict {
                error_code,
                message,
            },
            502 => Self::BadGateway {
                error_code,
                message,
            },
            503 => Self::ServiceUnavailable {
                error_code,
                message,
                details: None,
            },
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

impl From<GeofenceError> for ApiError {
    fn from(err: GeofenceError) -> Self {
        Self::from(RollcallError::from(err))
    }
}

impl From<LocationError> for ApiError {
    fn from(err: LocationError) -> Self {
        Self::from(RollcallError::from(err))
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        Self::from(RollcallError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::DomainError;

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::BadRequest {
            error_code: "test_error".to_string(),
            message: "Test message".to_string(),
        };
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }

    #[test]
    fn test_core_errors_map_to_status() {
        let not_found = ApiError::session_not_found("s1");
        assert!(matches!(
            &not_found,
            ApiError::NotFound { error_code, .. } if error_code == "session_not_found"
        ));

        let reason: ApiError = SubmitError::EmptyReason.into();
        assert!(matches!(reason, ApiError::BadRequest { .. }));

        let domain: ApiError = RollcallError::Domain(DomainError::AlreadyRecorded).into();
        assert!(matches!(
            &domain,
            ApiError::Conflict { error_code, .. } if error_code == "already_recorded"
        ));

        let denied: ApiError = LocationError::AuthorizationDenied.into();
        assert!(matches!(denied, ApiError::Forbidden { .. }));
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::BadGateway {
            error_code: "transport_error".to_string(),
            message: "down".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
