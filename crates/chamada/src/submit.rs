//! Attendance submission.
//!
//! One admitted scan becomes one [`SubmissionRecord`] and exactly one POST to
//! the attendance endpoint. Records are never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device::Coordinates;
use crate::error::{Error, Result};
use crate::notify::messages;
use crate::payload::{CallId, ScanPayload};

/// User agent sent with every request.
const USER_AGENT: &str = concat!("chamada/", env!("CARGO_PKG_VERSION"));

/// Body of the attendance POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRecord {
    /// Student id from the stored session.
    pub id_aluno: i64,
    /// Roll call id, echoed from the QR payload.
    pub id_chamada: CallId,
    /// Server timestamp, echoed from the QR payload.
    pub hora_post: String,
    /// Instructor latitude from the QR payload.
    pub lat_professor: f64,
    /// Instructor longitude from the QR payload.
    pub long_professor: f64,
    /// Device latitude, `null` when unknown.
    pub lat_aluno: Option<f64>,
    /// Device longitude, `null` when unknown.
    pub long_aluno: Option<f64>,
}

impl SubmissionRecord {
    /// Assemble a record for `student_id` from a validated payload.
    #[must_use]
    pub fn new(student_id: i64, payload: &ScanPayload, device: Option<Coordinates>) -> Self {
        Self {
            id_aluno: student_id,
            id_chamada: payload.call_id.clone(),
            hora_post: payload.server_timestamp.clone(),
            lat_professor: payload.instructor_latitude,
            long_professor: payload.instructor_longitude,
            lat_aluno: device.map(|c| c.latitude),
            long_aluno: device.map(|c| c.longitude),
        }
    }
}

/// What the server answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReply {
    /// HTTP status code.
    pub status: u16,
    /// `message` from the response body, when present.
    pub message: Option<String>,
}

impl ServerReply {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Server message on success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteRejection`] for a non-2xx status, carrying the
    /// server message or a generic one.
    pub fn into_result(self) -> Result<Option<String>> {
        if self.is_success() {
            return Ok(self.message);
        }
        Err(Error::RemoteRejection {
            status: self.status,
            message: self
                .message
                .unwrap_or_else(|| messages::ATTENDANCE_REJECTED.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ReplyBody {
    #[serde(default)]
    message: Option<String>,
}

/// The attendance endpoint.
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// POST `record` with `token` as bearer credential.
    ///
    /// Any HTTP status is a reply; only a missing response is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NetworkFailure`] if no response was received.
    async fn submit(&self, token: &str, record: &SubmissionRecord) -> Result<ServerReply>;
}

/// [`AttendanceApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAttendanceApi {
    http_client: reqwest::Client,
    url: String,
}

impl HttpAttendanceApi {
    /// Client posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the TLS backend cannot be initialized.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AttendanceApi for HttpAttendanceApi {
    async fn submit(&self, token: &str, record: &SubmissionRecord) -> Result<ServerReply> {
        debug!(
            call_id = %record.id_chamada,
            student_id = record.id_aluno,
            url = %self.url,
            "posting attendance"
        );

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(token)
            .json(record)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status().as_u16();
        let message = match response.text().await {
            Ok(body) => serde_json::from_str::<ReplyBody>(&body)
                .ok()
                .and_then(|b| b.message),
            Err(e) => {
                warn!(status, "failed to read response body: {}", e);
                None
            }
        };

        info!(status, "attendance endpoint replied");
        Ok(ServerReply { status, message })
    }
}
