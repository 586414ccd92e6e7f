//! HTTP healing backend
//!
//! Endpoints, relative to the configured base URL:
//! - `POST /api/start` with `{repo_url, team_name, leader_name}` -> `{run_id}`
//! - `GET /api/stream/{run_id}` -> `text/event-stream` of `{"message": ...}` events
//! - `GET /api/result/{run_id}` -> result record

use super::{BackendError, EventStream, HealingBackend, SseDecoder};
use crate::config::ConsoleConfig;
use crate::model::{HealingResult, RunRequest, RunTicket};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, Url};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Healing backend reached over HTTP
pub struct HttpBackend {
    client: Client,
    base_url: String,
    base: Url,
    request_timeout: Duration,
}

impl HttpBackend {
    /// Create a backend from console configuration
    pub fn new(config: &ConsoleConfig) -> Result<Self, BackendError> {
        // No client-wide timeout: it would also cut the log stream.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        let base_url = config.api_base.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| BackendError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(base_url));
        }

        Ok(Self {
            client,
            base_url,
            base,
            request_timeout: config.request_timeout(),
        })
    }

    /// Create with a custom base URL and default timeouts
    pub fn with_base_url(base_url: impl AsRef<str>) -> Result<Self, BackendError> {
        Self::new(&ConsoleConfig::default().with_api_base(base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/api/{segments...}`, each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn run_endpoint(&self, kind: &str, run_id: &str) -> Result<Url, BackendError> {
        if run_id.trim().is_empty() {
            return Err(BackendError::InvalidRunId(run_id.to_string()));
        }
        self.endpoint(&[kind, run_id])
    }

    async fn check_status(response: Response) -> Result<Response, BackendError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status { status, body })
    }
}

#[async_trait]
impl HealingBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn start_run(&self, request: &RunRequest) -> Result<RunTicket, BackendError> {
        let url = self.endpoint(&["start"])?;
        debug!(url = %url, repo_url = %request.repo_url, "Submitting run");

        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn open_stream(&self, run_id: &str) -> Result<EventStream, BackendError> {
        let url = self.run_endpoint("stream", run_id)?;
        debug!(url = %url, "Opening log stream");

        let response = self
            .client
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let bytes = Box::pin(response.bytes_stream());
        // The stream ends after the first error.
        let events = futures::stream::unfold(
            Some((bytes, SseDecoder::new(), VecDeque::new())),
            |state| async move {
                let Some((mut bytes, mut decoder, mut ready)) = state else {
                    return None;
                };
                loop {
                    if let Some(data) = ready.pop_front() {
                        return Some((Ok(data), Some((bytes, decoder, ready))));
                    }
                    let error = match bytes.next().await {
                        Some(Ok(chunk)) => match decoder.push(&chunk) {
                            Ok(decoded) => {
                                ready.extend(decoded);
                                continue;
                            }
                            Err(e) => e,
                        },
                        Some(Err(e)) => BackendError::from(e),
                        None => return None,
                    };
                    return Some((Err(error), None));
                }
            },
        );

        Ok(events.boxed())
    }

    async fn fetch_result(&self, run_id: &str) -> Result<HealingResult, BackendError> {
        let url = self.run_endpoint("result", run_id)?;
        debug!(url = %url, "Fetching result");

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
