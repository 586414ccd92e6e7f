//! Healing backend abstraction and the HTTP implementation

mod http;
mod sse;

pub use http::HttpBackend;
pub use sse::{SseDecoder, MAX_EVENT_BYTES};

use crate::model::{HealingResult, RunRequest, RunTicket};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors that can occur when talking to the healing backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid run id: {0:?}")]
    InvalidRunId(String),
}

impl BackendError {
    /// HTTP status code, when the backend answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            BackendError::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Raw `data` payloads of the run's event stream, in arrival order.
/// The stream ending is the signal that the run has finished.
pub type EventStream = BoxStream<'static, Result<String, BackendError>>;

/// Trait for healing backends
#[async_trait]
pub trait HealingBackend: Send + Sync {
    /// Backend name for logging/identification
    fn name(&self) -> &str;

    /// Submit a run and obtain its identifier
    async fn start_run(&self, request: &RunRequest) -> Result<RunTicket, BackendError>;

    /// Subscribe to the log stream of a run
    async fn open_stream(&self, run_id: &str) -> Result<EventStream, BackendError>;

    /// Retrieve the final result of a run
    async fn fetch_result(&self, run_id: &str) -> Result<HealingResult, BackendError>;
}
