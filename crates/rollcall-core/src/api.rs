//! Contracts for the collaborators the coordinator delegates to.
//!
//! The club backend records attendance, and an error reporter surfaces
//! recoverable failures to the user with a retry hook. Neither is
//! implemented here; the server crate provides an HTTP client and a logging
//! reporter, and [`crate::mock`] provides test doubles.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::coordinator::SubmitOutcome;
use crate::error::RollcallError;
use crate::types::{Attendance, Coordinate};

/// The backend refused the request for a business reason.
///
/// Domain errors are terminal for the attempt and are shown inline; they are
/// never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainError {
    /// Attendance already exists for this participant and session.
    #[error("Attendance has already been recorded for this session")]
    AlreadyRecorded,

    /// The backend considers the check-in window closed.
    #[error("The check-in window for this session is closed")]
    OutsideWindow,

    /// The participant is not enrolled in this session.
    #[error("You are not registered for this session")]
    NotAuthorized,

    /// The backend did not accept the submitted coordinate.
    #[error("The submitted location is not at the venue")]
    LocationRejected,

    /// Any other rejection the backend explained.
    #[error("{message}")]
    Rejected {
        /// Backend error code.
        code: String,
        /// Backend message.
        message: String,
    },
}

/// Failure modes of a backend request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The backend rejected the request.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The request did not produce a usable answer (network, decoding,
    /// timeout, unexpected status).
    #[error("Request failed: {0}")]
    Transport(String),
}

/// Result alias for backend requests.
pub type RequestResult<T> = std::result::Result<T, RequestError>;

/// The club backend's attendance endpoints.
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// Record a GPS check-in.
    async fn request_check_in(
        &self,
        session_id: &str,
        user_id: &str,
        coordinate: Coordinate,
    ) -> RequestResult<Attendance>;

    /// Record a late or absence reason.
    async fn submit_reason(
        &self,
        session_id: &str,
        user_id: &str,
        reason: &str,
    ) -> RequestResult<Attendance>;
}

/// Replays a failed submission.
pub type RetryAction = Arc<dyn Fn() -> BoxFuture<'static, SubmitOutcome> + Send + Sync>;

/// Where a reported error happened.
#[derive(Clone)]
pub struct ErrorContext {
    /// Feature area, e.g. `"attendance"`.
    pub feature: &'static str,
    /// Action that failed, e.g. `"check_in"`.
    pub action: &'static str,
    /// Session the action was for.
    pub session_id: String,
    /// Replays the same call when invoked.
    pub retry: Option<RetryAction>,
}

impl std::fmt::Debug for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorContext")
            .field("feature", &self.feature)
            .field("action", &self.action)
            .field("session_id", &self.session_id)
            .field("retry", &self.retry.is_some())
            .finish()
    }
}

/// Surfaces recoverable failures to the user.
pub trait ErrorReporter: Send + Sync {
    /// Report an error. Must not block.
    fn report(&self, error: &RollcallError, context: ErrorContext);
}

/// Reporter that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, err: &RollcallError, context: ErrorContext) {
        if err.is_recoverable() {
            warn!(
                feature = context.feature,
                action = context.action,
                session_id = %context.session_id,
                error_code = err.error_code(),
                error = %err,
                "Recoverable failure"
            );
        } else {
            error!(
                feature = context.feature,
                action = context.action,
                session_id = %context.session_id,
                error_code = err.error_code(),
                error = %err,
                "Unrecoverable failure"
            );
        }
    }
}
