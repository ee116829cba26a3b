//! HTTP client for the club backend's attendance endpoints.
//!
//! Status mapping:
//!
//! - `2xx`: the body is the stored [`Attendance`].
//! - `403`, `409`, `422`: a business rejection, decoded into a
//!   [`DomainError`] from the backend's `{ "code", "message" }` body.
//! - anything else, connection failures and undecodable bodies: transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rollcall_core::{
    Attendance, AttendanceApi, Coordinate, DomainError, RequestError, RequestResult,
    UpstreamConfig,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct CheckInBody<'a> {
    user_id: &'a str,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Serialize)]
struct ReasonBody<'a> {
    user_id: &'a str,
    reason: &'a str,
}

/// Error body returned by the backend.
#[derive(Debug, Clone, Default, Deserialize)]
struct BackendError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Attendance client for the club backend.
#[derive(Debug, Clone)]
pub struct HttpAttendanceApi {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpAttendanceApi {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or the HTTP client
    /// cannot be built.
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        anyhow::ensure!(
            !base_url.cannot_be_a_base(),
            "upstream base URL '{base_url}' cannot carry a path"
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
        })
    }

    /// `sessions/{session_id}/attendance` under the base URL, followed by
    /// `extra`. Each piece is one percent-encoded path segment.
    fn attendance_endpoint(&self, session_id: &str, extra: &[&str]) -> RequestResult<Url> {
        if matches!(session_id, "" | "." | "..") {
            return Err(DomainError::Rejected {
                code: "INVALID_SESSION_ID".to_string(),
                message: format!("'{session_id}' is not a session identifier"),
            }
            .into());
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RequestError::Transport(format!("invalid base URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(["sessions", session_id, "attendance"])
            .extend(extra);
        Ok(url)
    }

    async fn post<B: Serialize + Sync>(&self, url: Url, body: &B) -> RequestResult<Attendance> {
        debug!(%url, "Calling attendance backend");

        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RequestError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Attendance>()
                .await
                .map_err(|e| RequestError::Transport(format!("undecodable response: {e}")));
        }

        let body = response.json::<BackendError>().await.unwrap_or_default();
        Err(classify_failure(status, body))
    }
}

#[async_trait]
impl AttendanceApi for HttpAttendanceApi {
    async fn request_check_in(
        &self,
        session_id: &str,
        user_id: &str,
        coordinate: Coordinate,
    ) -> RequestResult<Attendance> {
        self.post(
            self.attendance_endpoint(session_id, &[])?,
            &CheckInBody {
                user_id,
                latitude: coordinate.latitude,
                longitude: coordinate.longitude,
            },
        )
        .await
    }

    async fn submit_reason(
        &self,
        session_id: &str,
        user_id: &str,
        reason: &str,
    ) -> RequestResult<Attendance> {
        self.post(
            self.attendance_endpoint(session_id, &["reason"])?,
            &ReasonBody { user_id, reason },
        )
        .await
    }
}

/// Map a non-success response to a request error.
fn classify_failure(status: StatusCode, body: BackendError) -> RequestError {
    if !matches!(
        status,
        StatusCode::FORBIDDEN | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
    ) {
        return RequestError::Transport(format!("unexpected status {status}"));
    }

    let domain = match body.code.as_str() {
        "ALREADY_RECORDED" => DomainError::AlreadyRecorded,
        "OUTSIDE_WINDOW" => DomainError::OutsideWindow,
        "NOT_AUTHORIZED" => DomainError::NotAuthorized,
        "LOCATION_REJECTED" => DomainError::LocationRejected,
        "" if status == StatusCode::FORBIDDEN => DomainError::NotAuthorized,
        "" if status == StatusCode::CONFLICT => DomainError::AlreadyRecorded,
        _ => DomainError::Rejected {
            code: body.code,
            message: body.message,
        },
    };
    RequestError::Domain(domain)
}
