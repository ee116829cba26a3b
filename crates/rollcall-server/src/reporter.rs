//! Error reporter that keeps the latest report for the shell to show.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rollcall_core::{ErrorContext, ErrorReporter, RetryAction, RollcallError, TracingErrorReporter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A reported failure, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReportedError {
    /// Report identifier.
    pub id: Uuid,

    /// Machine-readable error code.
    #[schema(example = "TRANSPORT_ERROR")]
    pub error_code: String,

    /// Human-readable message.
    pub message: String,

    /// Feature area.
    #[schema(example = "attendance")]
    pub feature: String,

    /// Action that failed.
    #[schema(example = "check_in")]
    pub action: String,

    /// Session the action was for.
    pub session_id: String,

    /// Whether the report carries a retry action.
    pub retryable: bool,

    /// When the failure was reported (UTC).
    pub reported_at: DateTime<Utc>,
}

#[derive(Default)]
struct Latest {
    report: Option<ReportedError>,
    retry: Option<RetryAction>,
}

/// Logs every report and keeps the most recent one with its retry action.
#[derive(Default)]
pub struct LatestErrorReporter {
    latest: Mutex<Latest>,
}

impl std::fmt::Debug for LatestErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestErrorReporter")
            .field("latest", &self.latest().map(|r| r.id))
            .finish()
    }
}

impl LatestErrorReporter {
    /// An empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Latest> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The most recent report.
    #[must_use]
    pub fn latest(&self) -> Option<ReportedError> {
        self.lock().report.clone()
    }

    /// Take the retry action of the most recent report.
    ///
    /// A retry can be taken once; the report stays visible with
    /// `retryable` cleared.
    pub fn take_retry(&self) -> Option<(Uuid, RetryAction)> {
        let mut latest = self.lock();
        let retry = latest.retry.take()?;
        let report = latest.report.as_mut()?;
        report.retryable = false;
        Some((report.id, retry))
    }
}

impl ErrorReporter for LatestErrorReporter {
    fn report(&self, error: &RollcallError, context: ErrorContext) {
        TracingErrorReporter.report(error, context.clone());

        let report = ReportedError {
            id: Uuid::now_v7(),
            error_code: error.error_code().to_string(),
            message: error.to_string(),
            feature: context.feature.to_string(),
            action: context.action.to_string(),
            session_id: context.session_id,
            retryable: context.retry.is_some(),
            reported_at: Utc::now(),
        };

        let mut latest = self.lock();
        latest.report = Some(report);
        latest.retry = context.retry;
    }
}
