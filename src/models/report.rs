use crate::models::request::HttpRequest;
use crate::services::atomic_metrics::MetricsSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Serializable outcome of one executed request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestReport {
    pub id: Uuid,
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    #[serde(rename = "timedOut")]
    pub timed_out: bool,
    pub error: Option<String>,
    #[serde(rename = "bodyBytes")]
    pub body_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RequestReport {
    pub fn from_request(request: &HttpRequest, include_body: bool) -> Self {
        let body = request.response_body().ok();
        Self {
            id: request.id(),
            method: request.method().to_string(),
            url: request.url().to_string(),
            status: request.status().map(|status| status.as_u16()),
            elapsed_ms: request.elapsed_ms(),
            timed_out: request.is_timed_out(),
            error: request.error().map(ToString::to_string),
            body_bytes: body.map(|b| b.len()),
            body: body
                .filter(|_| include_body)
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "finishedAt")]
    pub finished_at: DateTime<Utc>,
    pub batches: usize,
    pub requests: usize,
    pub metrics: MetricsSnapshot,
}
