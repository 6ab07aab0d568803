use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::client::DryRunApi;
use super::models::{CorrelationId, DryRunEvent, JobStatus, StreamEnvelope, TeamId};
use crate::errors::PreviewError;

/// What a live connection reports, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    /// The server accepted the stream.
    Opened,
    /// The stream could not be opened; carries a description.
    Rejected(String),
    Event(DryRunEvent),
    /// A terminal status arrived and the connection was closed on purpose.
    Completed(JobStatus),
    /// The job was withdrawn and the connection was closed on purpose.
    Withdrawn,
    /// The connection ended without anyone asking it to.
    Lost(String),
}

/// Handle to one live connection.
pub struct StreamHandle {
    cancel: CancellationToken,
}

impl StreamHandle {
    /// Close the connection. Nothing is reported for a caller-initiated close.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Keeps at most one live event connection open.
pub struct StreamConnector {
    api: Arc<dyn DryRunApi>,
    active: Option<StreamHandle>,
}

impl StreamConnector {
    pub fn new(api: Arc<dyn DryRunApi>) -> Self {
        Self { api, active: None }
    }

    /// Open a connection for `correlation_id`, cancelling any previous one first.
    ///
    /// Signals are delivered to `sink` from the connection task in arrival
    /// order. Cancelling `scope` closes the connection silently.
    pub fn connect<F>(
        &mut self,
        correlation_id: CorrelationId,
        team_id: TeamId,
        auth_token: Option<String>,
        scope: &CancellationToken,
        sink: F,
    ) -> &StreamHandle
    where
        F: FnMut(StreamSignal) + Send + 'static,
    {
        self.cancel();

        let cancel = scope.child_token();
        let span = tracing::info_span!("dry_run_stream", %correlation_id, %team_id);
        tokio::spawn(
            run_connection(
                self.api.clone(),
                correlation_id,
                team_id,
                auth_token,
                cancel.clone(),
                sink,
            )
            .instrument(span),
        );

        self.active.insert(StreamHandle { cancel })
    }

    /// Cancel the open connection, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.cancel();
        }
    }

    pub fn active(&self) -> Option<&StreamHandle> {
        self.active.as_ref()
    }
}

async fn run_connection<F>(
    api: Arc<dyn DryRunApi>,
    correlation_id: CorrelationId,
    team_id: TeamId,
    auth_token: Option<String>,
    cancel: CancellationToken,
    mut sink: F,
) where
    F: FnMut(StreamSignal) + Send + 'static,
{
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = api.open_stream(&correlation_id, &team_id, auth_token.as_deref()) => result,
    };

    let mut events = match opened {
        Ok(events) => {
            tracing::info!("stream connected");
            sink(StreamSignal::Opened);
            events
        }
        Err(e) => {
            if cancel.is_cancelled() {
                return;
            }
            cancel.cancel();
            tracing::warn!(error = %e, "stream open failed");
            sink(StreamSignal::Rejected(e.to_string()));
            return;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("stream cancelled");
                return;
            }
            next = events.next() => next,
        };

        let data = match next {
            Some(Ok(data)) => data,
            Some(Err(e)) => {
                if !cancel.is_cancelled() {
                    tracing::warn!(error = %e, "stream transport error");
                    sink(StreamSignal::Lost(e.to_string()));
                }
                return;
            }
            None => {
                if !cancel.is_cancelled() {
                    tracing::warn!("stream closed by server");
                    sink(StreamSignal::Lost("stream closed by server".to_string()));
                }
                return;
            }
        };

        let event = match StreamEnvelope::parse(&data) {
            Ok(envelope) => envelope.event,
            Err(e) => {
                let err = PreviewError::MalformedEventPayload(e);
                tracing::warn!(error = %err, "discarding stream event");
                continue;
            }
        };

        tracing::debug!(kind = event.kind(), "stream event");

        if let Some(status) = event.terminal_status() {
            cancel.cancel();
            sink(StreamSignal::Event(event));
            sink(StreamSignal::Completed(status));
            return;
        }
        if matches!(event, DryRunEvent::Removed {}) {
            cancel.cancel();
            sink(StreamSignal::Event(event));
            sink(StreamSignal::Withdrawn);
            return;
        }
        sink(StreamSignal::Event(event));
    }
}
