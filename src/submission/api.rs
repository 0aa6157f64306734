//! HTTP collaborator: the remote prediction service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use ureq::{Agent, AgentBuilder};
use uuid::Uuid;

use crate::models::{ConfidencePoint, Emotion, VideoSegment};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<ureq::Error> for ApiError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let reason = response.status_text().to_string();
                let body = response.into_string().unwrap_or_default();
                ApiError::Status {
                    status,
                    detail: error_detail(Some(&reason), &body),
                }
            }
            ureq::Error::Transport(transport) => ApiError::Network(transport.to_string()),
        }
    }
}

/// `confidence` arrives either as a number or as a string such as `"87%"`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConfidenceValue {
    Number(f64),
    Text(String),
}

impl ConfidenceValue {
    pub fn as_percent(&self) -> Option<f64> {
        match self {
            ConfidenceValue::Number(value) => Some(*value),
            ConfidenceValue::Text(raw) => raw.trim().trim_end_matches('%').trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub prediction: Vec<f64>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub confidence: Option<ConfidenceValue>,
    #[serde(default)]
    pub emotions: Vec<Emotion>,
    /// Base64 PNG, optionally with a `data:` URL prefix.
    #[serde(default)]
    pub visualization: Option<String>,
    #[serde(default)]
    pub confidence_timeline: Vec<ConfidencePoint>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProgressResponse {
    progress: Option<f64>,
}

#[async_trait]
pub trait PredictionApi: Send + Sync {
    /// `POST /api/predict` with the segment as multipart field `video`.
    async fn predict(&self, segment: &VideoSegment) -> Result<PredictResponse, ApiError>;

    /// `GET /api/progress`, clamped to 0..=100.
    async fn progress(&self) -> Result<u8, ApiError>;
}

/// Blocking `ureq` agent driven from the blocking thread pool.
pub struct HttpPredictionApi {
    agent: Agent,
    base_url: String,
}

impl HttpPredictionApi {
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(request_timeout)
            .build();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn predict_url(&self) -> String {
        format!("{}/api/predict", self.base_url)
    }

    pub fn progress_url(&self) -> String {
        format!("{}/api/progress", self.base_url)
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| ApiError::Network(format!("request task failed: {err}")))?
}

#[async_trait]
impl PredictionApi for HttpPredictionApi {
    async fn predict(&self, segment: &VideoSegment) -> Result<PredictResponse, ApiError> {
        let agent = self.agent.clone();
        let url = self.predict_url();
        let bytes = segment.bytes.clone();
        let file_name = segment.source_name.clone();
        let mime_type = segment.container_type().to_string();

        run_blocking(move || {
            let boundary = format!("deeplie-{}", Uuid::new_v4().simple());
            let body = multipart_body(&boundary, "video", &file_name, &mime_type, &bytes);
            let response = agent
                .post(&url)
                .set(
                    "Content-Type",
                    &format!("multipart/form-data; boundary={boundary}"),
                )
                .send_bytes(&body)?;
            let text = response
                .into_string()
                .map_err(|err| ApiError::Network(err.to_string()))?;
            serde_json::from_str(&text).map_err(|err| ApiError::Malformed(err.to_string()))
        })
        .await
    }

    async fn progress(&self) -> Result<u8, ApiError> {
        let agent = self.agent.clone();
        let url = self.progress_url();

        run_blocking(move || {
            let body: ProgressResponse = agent
                .get(&url)
                .call()?
                .into_json()
                .map_err(|err| ApiError::Malformed(err.to_string()))?;
            parse_progress(body.progress)
        })
        .await
    }
}

/// One-part `multipart/form-data` body carrying a file.
fn multipart_body(
    boundary: &str,
    field: &str,
    file_name: &str,
    mime_type: &str,
    bytes: &[u8],
) -> Vec<u8> {
    let file_name = file_name.replace('"', "%22");
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {mime_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

fn parse_progress(value: Option<f64>) -> Result<u8, ApiError> {
    match value {
        Some(progress) if progress.is_finite() => Ok(progress.clamp(0.0, 100.0).round() as u8),
        _ => Err(ApiError::Malformed("missing progress field".into())),
    }
}

/// Prefer the service's own `{"error": ...}` message over the status text.
pub fn error_detail(reason: Option<&str>, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }

    if let Ok(ErrorBody { error: Some(message) }) = serde_json::from_str::<ErrorBody>(body) {
        return message;
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 512 {
        return trimmed.to_string();
    }

    reason.unwrap_or("unknown error").to_string()
}
