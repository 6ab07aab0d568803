use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt, stream};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use super::models::{CorrelationId, JobStatus, Snapshot, TeamId};
use super::sse::SseDecoder;
use crate::config::ApiSection;
use crate::errors::{PreviewError, Result};

/// Raw SSE `data` payloads, in the order the server sent them.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Abstraction over the dry-run backend for testability.
/// Real implementation: `HttpDryRunApi`.
#[async_trait]
pub trait DryRunApi: Send + Sync {
    /// `Ok(None)` means the backend does not know the job yet.
    async fn fetch_status(
        &self,
        correlation_id: &CorrelationId,
        team_id: &TeamId,
    ) -> Result<Option<JobStatus>>;

    async fn fetch_snapshot(
        &self,
        correlation_id: &CorrelationId,
        team_id: &TeamId,
    ) -> Result<Snapshot>;

    /// Open the live event stream. A non-2xx answer is
    /// `PreviewError::ConnectionOpenRejected`.
    async fn open_stream(
        &self,
        correlation_id: &CorrelationId,
        team_id: &TeamId,
        auth_token: Option<&str>,
    ) -> Result<EventStream>;
}

/// `DryRunApi` over HTTP with `reqwest`.
pub struct HttpDryRunApi {
    client: reqwest::Client,
    api: ApiSection,
    auth_token: Option<String>,
}

impl HttpDryRunApi {
    pub fn new(api: ApiSection, auth_token: Option<String>) -> Result<Self> {
        reqwest::Url::parse(&api.base_url)
            .map_err(|e| PreviewError::Config(format!("invalid base_url {}: {}", api.base_url, e)))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("dryrun-preview/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api,
            auth_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api.base_url.trim_end_matches('/'), path)
    }

    fn get(
        &self,
        path: &str,
        correlation_id: &CorrelationId,
        team_id: &TeamId,
        auth_token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let request = self.client.get(self.url(path)).query(&[
            ("correlationId", correlation_id.as_str()),
            ("teamId", team_id.as_str()),
        ]);
        match auth_token.or(self.auth_token.as_deref()) {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    fn request_timeout(&self) -> Duration {
        self.api.request_timeout()
    }
}

async fn error_status(resp: reqwest::Response) -> PreviewError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    PreviewError::Status { status, body }
}

#[async_trait]
impl DryRunApi for HttpDryRunApi {
    async fn fetch_status(
        &self,
        correlation_id: &CorrelationId,
        team_id: &TeamId,
    ) -> Result<Option<JobStatus>> {
        let resp = self
            .get(&self.api.status_path, correlation_id, team_id, None)
            .timeout(self.request_timeout())
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_status(resp).await);
        }

        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map_err(|e| PreviewError::InvalidResponse(format!("status: {}", e)))
    }

    async fn fetch_snapshot(
        &self,
        correlation_id: &CorrelationId,
        team_id: &TeamId,
    ) -> Result<Snapshot> {
        let resp = self
            .get(&self.api.snapshot_path, correlation_id, team_id, None)
            .timeout(self.request_timeout())
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_status(resp).await);
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| PreviewError::InvalidResponse(format!("snapshot: {}", e)))
    }

    async fn open_stream(
        &self,
        correlation_id: &CorrelationId,
        team_id: &TeamId,
        auth_token: Option<&str>,
    ) -> Result<EventStream> {
        let resp = self
            .get(&self.api.stream_path, correlation_id, team_id, auth_token)
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PreviewError::ConnectionOpenRejected {
                status: resp.status().as_u16(),
            });
        }

        Ok(sse_data_stream(resp.bytes_stream().map_err(PreviewError::from)))
    }
}

struct DecodeState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turn a byte stream into a stream of SSE `data` payloads.
pub fn sse_data_stream<S, B>(body: S) -> EventStream
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(data) = st.pending.pop_front() {
                return Some((Ok(data), st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => match st.decoder.push(chunk.as_ref()) {
                    Ok(frames) => st.pending.extend(frames.into_iter().map(|f| f.data)),
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                },
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    if st.decoder.pending() > 0 {
                        tracing::debug!(
                            bytes = st.decoder.pending(),
                            "discarding unterminated event at end of stream"
                        );
                    }
                }
            }
        }
    }))
}
