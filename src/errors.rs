//! Typed error hierarchy for the dry-run preview tracker.
//!
//! `PreviewError` covers every failure a tracking session can hit. Fatal
//! variants end up as the `error` string of the published view; the
//! malformed-payload variant never leaves the stream connector.

use thiserror::Error;

/// Errors from probing, streaming and finalizing a dry-run job.
#[derive(Debug, Error)]
pub enum PreviewError {
    /// The status endpoint kept answering "not yet known".
    #[error("job not found")]
    JobNotFound { correlation_id: String, attempts: u32 },

    #[error("stream connection rejected with HTTP {status}")]
    ConnectionOpenRejected { status: u16 },

    #[error("connection lost")]
    TransportDrop { reason: String },

    #[error("malformed event payload: {0}")]
    MalformedEventPayload(#[source] serde_json::Error),

    #[error("failed to fetch final result: {0}")]
    FinalizationFetch(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("orchestrator is no longer running")]
    OrchestratorClosed,
}

pub type Result<T, E = PreviewError> = std::result::Result<T, E>;
