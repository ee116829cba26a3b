//! Reported failure endpoints.
//!
//! Transport failures of a submission are not returned from the submission
//! call as errors; they are reported here with a one-shot retry.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use rollcall_core::SubmitOutcome;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::reporter::ReportedError;
use crate::state::SharedState;

/// Creates the errors router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/latest", get(get_latest))
        .route("/retry", post(retry_latest))
}

/// Result of replaying a failed submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RetryResponse {
    /// Report whose action was replayed.
    pub error_id: Uuid,

    /// How the replay ended.
    pub outcome: SubmitOutcome,
}

/// Get the latest reported failure.
#[utoipa::path(
    get,
    path = "/api/errors/latest",
    tag = "errors",
    operation_id = "getLatestError",
    summary = "Get the latest reported failure",
    responses(
        (status = 200, description = "Latest failure", body = ReportedError),
        (status = 404, description = "Nothing reported", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_latest(State(state): State<SharedState>) -> ApiResult<Json<ReportedError>> {
    state
        .reporter
        .latest()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound {
            error_code: "no_error_reported".to_string(),
            message: "No failure has been reported".to_string(),
        })
}

/// Replay the latest failed submission.
#[utoipa::path(
    post,
    path = "/api/errors/retry",
    tag = "errors",
    operation_id = "retryLatestError",
    summary = "Retry the latest failed submission",
    description = "Replays the exact call that failed, with admission re-checked. A retry \
        can be used once.",
    responses(
        (status = 200, description = "Replay finished", body = RetryResponse),
        (status = 404, description = "No retry available", body = crate::api::ErrorResponse)
    )
)]
pub async fn retry_latest(State(state): State<SharedState>) -> ApiResult<Json<RetryResponse>> {
    let (error_id, retry) = state.reporter.take_retry().ok_or_else(|| ApiError::NotFound {
        error_code: "no_retry_available".to_string(),
        message: "The latest failure has no retry available".to_string(),
    })?;

    info!(%error_id, "Retrying failed submission");
    let outcome = retry().await;

    Ok(Json(RetryResponse { error_id, outcome }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::api::sessions::{SessionView, SubmissionResponse};
    use crate::state::test_support::{at, test_state};
    use axum_test::TestServer;
    use rollcall_core::{DisplayStatus, RequestError};
    use serde_json::json;

    #[tokio::test]
    async fn test_nothing_reported() {
        let t = test_state(at(13, 50));
        let server = TestServer::new(create_router(t.state)).unwrap();

        server.get("/api/errors/latest").await.assert_status_not_found();
        let response = server.post("/api/errors/retry").await;
        response.assert_status_not_found();
        let body: crate::api::ErrorResponse = response.json();
        assert_eq!(body.error, "no_retry_available");
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_and_retried() {
        let t = test_state(at(14, 25));
        let server = TestServer::new(create_router(t.state)).unwrap();
        server
            .put("/api/sessions")
            .json(&json!({ "sessions": [{
                "session": {
                    "id": "s1",
                    "title": "Weekly session",
                    "week": 1,
                    "starts_at": "2026-03-14T14:00:00Z",
                    "ends_at": "2026-03-14T16:00:00Z",
                    "location": { "latitude": 37.5, "longitude": 127.0 }
                }
            }] }))
            .await;
        t.api
            .push_reason(Err(RequestError::Transport("connection reset".to_string())));

        let body: SubmissionResponse = server
            .post("/api/sessions/s1/reason")
            .json(&json!({ "user_id": "u1", "reason": "Bus broke down" }))
            .await
            .json();
        assert!(matches!(body.outcome, SubmitOutcome::RolledBack { .. }));
        assert!(body.session.can_submit_reason);

        let report: ReportedError = server.get("/api/errors/latest").await.json();
        assert_eq!(report.error_code, "TRANSPORT_ERROR");
        assert_eq!(report.action, "submit_reason");
        assert_eq!(report.session_id, "s1");
        assert!(report.retryable);

        let retried: RetryResponse = server.post("/api/errors/retry").await.json();
        assert_eq!(retried.error_id, report.id);
        assert!(matches!(retried.outcome, SubmitOutcome::Recorded { .. }));

        let calls = t.api.reason_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].reason, "Bus broke down");

        let view: SessionView = server.get("/api/sessions/s1").await.json();
        assert_eq!(view.status, DisplayStatus::PendingApproval);

        server.post("/api/errors/retry").await.assert_status_not_found();
    }
}
