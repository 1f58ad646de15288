//! Boundary adapter for the downstream text-analysis service.
//!
//! One request per segment, bounded timeout, no retries. A failed segment is
//! surfaced and forgotten; retry policy deliberately does not live here so
//! the queue's ordering logic stays decoupled from transient remote failures.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use aura_events::{Segment, SentimentResult};

/// Deadline for one analysis request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis request timed out")]
    Timeout,
    #[error("analysis service unreachable: {0}")]
    Unreachable(String),
    #[error("analysis service rejected segment: {0}")]
    RemoteRejected(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Seam between the segment queue and the remote service.
///
/// The queue drives any `Analyzer`; production uses [`AnalysisDispatcher`],
/// tests substitute instrumented mocks.
#[async_trait]
pub trait Analyzer: Send + Sync + 'static {
    async fn analyze(&self, segment: &Segment) -> Result<SentimentResult>;
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
}

/// HTTP client for the analysis endpoint.
pub struct AnalysisDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl AnalysisDispatcher {
    /// Build a dispatcher for the given endpoint with the standard timeout.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Analyzer for AnalysisDispatcher {
    async fn analyze(&self, segment: &Segment) -> Result<SentimentResult> {
        tracing::debug!(chars = segment.text.len(), "dispatching segment for analysis");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&AnalyzeRequest {
                text: &segment.text,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout
                } else {
                    AnalysisError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AnalysisError::RemoteRejected(format!(
                "{status}: {}",
                detail.trim()
            )));
        }

        response.json::<SentimentResult>().await.map_err(|e| {
            AnalysisError::RemoteRejected(format!("invalid response body: {e}"))
        })
    }
}
