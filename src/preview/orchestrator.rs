//! Top-level state machine for one live preview.
//!
//! A single actor task owns the view. Callers talk to it through
//! [`Orchestrator`]; probe, stream and fetch work runs in spawned tasks that
//! report back through an inbox. Every report is tagged with the scope it
//! belongs to, and reports from a scope that is no longer live are dropped.
//!
//! ```text
//! Idle ──track──▶ Probing ──IN_PROGRESS──▶ Streaming ──terminal status──▶ FetchingFinal
//!                    │                        │  │                            │
//!                    │ COMPLETED/FAILED ──────┼──┼──────────────▶─────────────┘
//!                    │                        │  └─ REMOVED ─▶ Terminal(ok)   │
//!                    └─ not found ─▶ Terminal(error) ◀─ lost/rejected         ▼
//!                                                                  Terminal(ok|error)
//! ```

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::client::DryRunApi;
use super::finalize::FinalizationFetcher;
use super::models::{CorrelationId, DryRunEvent, JobStatus, Snapshot, TeamId};
use super::prober::{JobStatusProber, RetryPolicy};
use super::reducer::{self, AggregateView, Connectivity};
use super::resume::{ResumeMarker, ResumeStore};
use super::stream::{StreamConnector, StreamSignal};
use crate::errors::{PreviewError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Probing,
    Streaming,
    FetchingFinal,
    Terminal(Outcome),
}

/// What subscribers see.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PreviewView {
    pub correlation_id: Option<CorrelationId>,
    pub phase: Phase,
    #[serde(flatten)]
    pub state: AggregateView,
}

impl PreviewView {
    pub fn messages(&self) -> &[super::models::Message] {
        &self.state.messages
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.state.status
    }

    pub fn description(&self) -> Option<&str> {
        self.state.description.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn is_connected(&self) -> bool {
        self.state.connectivity == Connectivity::Connected
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// No further updates will arrive for this job.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Terminal(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    pub retry: RetryPolicy,
    /// Bearer token for the live stream.
    pub auth_token: Option<String>,
}

enum Command {
    Track {
        correlation_id: CorrelationId,
        team_id: TeamId,
        ack: oneshot::Sender<()>,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
    Shutdown,
}

#[derive(Debug)]
enum ScopeEvent {
    Probed(Result<JobStatus>),
    Stream(StreamSignal),
    Finalized(Result<Snapshot>),
}

/// Work result tagged with the scope that produced it.
#[derive(Debug)]
struct Tagged {
    generation: u64,
    correlation_id: CorrelationId,
    event: ScopeEvent,
}

/// Everything that belongs to the job currently being tracked.
struct Scope {
    generation: u64,
    correlation_id: CorrelationId,
    team_id: TeamId,
    cancel: CancellationToken,
}

/// Handle to the preview actor. Dropping it cancels all in-flight work.
pub struct Orchestrator {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<PreviewView>,
    task: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Start the actor on the current tokio runtime.
    pub fn spawn(
        api: Arc<dyn DryRunApi>,
        resume: Arc<dyn ResumeStore>,
        options: OrchestratorOptions,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(PreviewView::default());

        let driver = Driver::new(api, resume, options, view_tx, inbox_tx);
        let task = tokio::spawn(driver.run(commands_rx, inbox_rx));

        Self {
            commands: commands_tx,
            view: view_rx,
            task: Some(task),
        }
    }

    /// Start tracking a job, discarding whatever was tracked before.
    ///
    /// Returns once the previous job's work is cancelled and the fresh view
    /// is published.
    pub async fn track(
        &self,
        correlation_id: impl Into<CorrelationId>,
        team_id: impl Into<TeamId>,
    ) -> Result<watch::Receiver<PreviewView>> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Track {
                correlation_id: correlation_id.into(),
                team_id: team_id.into(),
                ack,
            })
            .map_err(|_| PreviewError::OrchestratorClosed)?;
        done.await.map_err(|_| PreviewError::OrchestratorClosed)?;
        Ok(self.view.clone())
    }

    /// Cancel the tracked job and return to an empty idle view.
    pub async fn stop(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Stop { ack })
            .map_err(|_| PreviewError::OrchestratorClosed)?;
        done.await.map_err(|_| PreviewError::OrchestratorClosed)
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewView> {
        self.view.clone()
    }

    pub fn current(&self) -> PreviewView {
        self.view.borrow().clone()
    }

    /// Stop tracking and wait for the actor to exit.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// The actor. Owns the view and the live scope.
struct Driver {
    api: Arc<dyn DryRunApi>,
    resume: Arc<dyn ResumeStore>,
    prober: JobStatusProber,
    fetcher: FinalizationFetcher,
    connector: StreamConnector,
    auth_token: Option<String>,
    generation: u64,
    scope: Option<Scope>,
    view: watch::Sender<PreviewView>,
    inbox: mpsc::UnboundedSender<Tagged>,
}

impl Driver {
    fn new(
        api: Arc<dyn DryRunApi>,
        resume: Arc<dyn ResumeStore>,
        options: OrchestratorOptions,
        view: watch::Sender<PreviewView>,
        inbox: mpsc::UnboundedSender<Tagged>,
    ) -> Self {
        Self {
            connector: StreamConnector::new(api.clone()),
            fetcher: FinalizationFetcher::new(resume.clone()),
            prober: JobStatusProber::new(options.retry),
            auth_token: options.auth_token,
            api,
            resume,
            generation: 0,
            scope: None,
            view,
            inbox,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inbox: mpsc::UnboundedReceiver<Tagged>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Track { correlation_id, team_id, ack }) => {
                        self.start(correlation_id, team_id);
                        let _ = ack.send(());
                    }
                    Some(Command::Stop { ack }) => {
                        self.stop();
                        let _ = ack.send(());
                    }
                    Some(Command::Shutdown) | None => {
                        self.stop();
                        break;
                    }
                },
                Some(tagged) = inbox.recv() => self.handle(tagged),
            }
        }
        tracing::debug!("preview orchestrator exited");
    }

    fn phase(&self) -> Phase {
        self.view.borrow().phase
    }

    fn update(&self, f: impl FnOnce(&mut PreviewView)) {
        self.view.send_modify(f);
    }

    /// Cancel every task of the live scope. Runs before any new scope starts.
    fn cancel_scope(&mut self) {
        if self.connector.active().is_some_and(|handle| !handle.is_cancelled()) {
            tracing::debug!("closing live stream");
        }
        self.connector.cancel();
        if let Some(scope) = self.scope.take() {
            scope.cancel.cancel();
            tracing::debug!(
                correlation_id = %scope.correlation_id,
                generation = scope.generation,
                "scope cancelled"
            );
        }
    }

    fn start(&mut self, correlation_id: CorrelationId, team_id: TeamId) {
        self.cancel_scope();
        self.generation += 1;

        let scope = Scope {
            generation: self.generation,
            correlation_id: correlation_id.clone(),
            team_id: team_id.clone(),
            cancel: CancellationToken::new(),
        };
        tracing::info!(%correlation_id, %team_id, generation = scope.generation, "tracking dry run");

        self.view.send_replace(PreviewView {
            correlation_id: Some(correlation_id.clone()),
            phase: Phase::Probing,
            state: AggregateView::loading(),
        });

        let api = self.api.clone();
        let prober = self.prober.clone();
        let cancel = scope.cancel.clone();
        let inbox = self.inbox.clone();
        let generation = scope.generation;
        let span = tracing::info_span!("dry_run_probe", %correlation_id, %team_id);
        tokio::spawn(
            async move {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = prober.probe(api.as_ref(), &correlation_id, &team_id) => result,
                };
                let _ = inbox.send(Tagged {
                    generation,
                    correlation_id,
                    event: ScopeEvent::Probed(result),
                });
            }
            .instrument(span),
        );

        self.scope = Some(scope);
    }

    fn stop(&mut self) {
        self.cancel_scope();
        self.view.send_replace(PreviewView::default());
    }

    fn handle(&mut self, tagged: Tagged) {
        let is_live = self.scope.as_ref().is_some_and(|scope| {
            scope.generation == tagged.generation && scope.correlation_id == tagged.correlation_id
        });
        if !is_live {
            tracing::debug!(
                correlation_id = %tagged.correlation_id,
                generation = tagged.generation,
                "discarding stale result"
            );
            return;
        }

        match (self.phase(), tagged.event) {
            (Phase::Probing, ScopeEvent::Probed(result)) => self.on_probed(result),
            (Phase::Streaming, ScopeEvent::Stream(signal)) => self.on_stream(signal),
            (Phase::FetchingFinal, ScopeEvent::Finalized(result)) => self.on_finalized(result),
            (phase, event) => {
                tracing::debug!(?phase, ?event, "ignoring result outside its phase");
            }
        }
    }

    fn on_probed(&mut self, result: Result<JobStatus>) {
        let status = match result {
            Ok(status) => status,
            Err(e) => return self.fail(&e),
        };

        self.apply(&DryRunEvent::StatusUpdated { status });
        if status.is_terminal() {
            self.begin_finalize();
        } else {
            self.begin_streaming();
        }
    }

    fn begin_streaming(&mut self) {
        let Some(scope) = &self.scope else { return };

        if let Err(e) = self.resume.save(&ResumeMarker::new(
            scope.correlation_id.clone(),
            scope.team_id.clone(),
        )) {
            tracing::warn!(correlation_id = %scope.correlation_id, error = %e, "failed to save resume marker");
        }

        self.update(|view| {
            view.phase = Phase::Streaming;
            view.state.connectivity = Connectivity::Connecting;
        });

        let inbox = self.inbox.clone();
        let generation = scope.generation;
        let tag = scope.correlation_id.clone();
        self.connector.connect(
            scope.correlation_id.clone(),
            scope.team_id.clone(),
            self.auth_token.clone(),
            &scope.cancel,
            move |signal| {
                let _ = inbox.send(Tagged {
                    generation,
                    correlation_id: tag.clone(),
                    event: ScopeEvent::Stream(signal),
                });
            },
        );
    }

    fn on_stream(&mut self, signal: StreamSignal) {
        match signal {
            StreamSignal::Opened => self.update(|view| {
                view.state.connectivity = Connectivity::Connected;
                view.state.loading = false;
            }),
            StreamSignal::Event(event) => self.apply(&event),
            StreamSignal::Completed(_) => {
                self.connector.cancel();
                self.update(|view| view.state.connectivity = Connectivity::Disconnected);
                self.begin_finalize();
            }
            StreamSignal::Withdrawn => {
                self.connector.cancel();
                if let Some(scope) = &self.scope {
                    tracing::info!(correlation_id = %scope.correlation_id, "dry run withdrawn");
                    if let Err(e) = self.resume.clear(&scope.correlation_id) {
                        tracing::warn!(error = %e, "failed to clear resume marker");
                    }
                }
                self.update(|view| {
                    view.state.connectivity = Connectivity::Disconnected;
                    view.state.loading = false;
                    view.phase = Phase::Terminal(Outcome::Ok);
                });
            }
            StreamSignal::Rejected(message) => {
                self.connector.cancel();
                self.update(|view| view.state.connectivity = Connectivity::Disconnected);
                self.fail_with(message);
            }
            StreamSignal::Lost(reason) => {
                self.connector.cancel();
                self.update(|view| view.state.connectivity = Connectivity::Disconnected);
                self.fail(&PreviewError::TransportDrop { reason });
            }
        }
    }

    fn begin_finalize(&mut self) {
        let Some(scope) = &self.scope else { return };

        self.update(|view| {
            view.phase = Phase::FetchingFinal;
            view.state.loading = true;
        });

        let api = self.api.clone();
        let fetcher = self.fetcher.clone();
        let cancel = scope.cancel.clone();
        let inbox = self.inbox.clone();
        let generation = scope.generation;
        let correlation_id = scope.correlation_id.clone();
        let team_id = scope.team_id.clone();
        let span = tracing::info_span!("dry_run_finalize", %correlation_id, %team_id);
        tokio::spawn(
            async move {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = fetcher.fetch_final(api.as_ref(), &correlation_id, &team_id) => result,
                };
                let _ = inbox.send(Tagged {
                    generation,
                    correlation_id,
                    event: ScopeEvent::Finalized(result),
                });
            }
            .instrument(span),
        );
    }

    fn on_finalized(&mut self, result: Result<Snapshot>) {
        match result {
            Ok(snapshot) => self.update(|view| {
                view.state = reducer::apply_snapshot(std::mem::take(&mut view.state), snapshot);
                view.phase = Phase::Terminal(Outcome::Ok);
            }),
            // Whatever was streamed stays visible.
            Err(e) => self.fail(&e),
        }
    }

    fn apply(&self, event: &DryRunEvent) {
        self.update(|view| {
            view.state = reducer::apply(std::mem::take(&mut view.state), event);
        });
    }

    fn fail(&mut self, error: &PreviewError) {
        self.fail_with(error.to_string());
    }

    fn fail_with(&mut self, message: String) {
        if let Some(scope) = &self.scope {
            tracing::warn!(correlation_id = %scope.correlation_id, error = %message, "dry run tracking failed");
        }
        self.update(|view| {
            view.state.error = Some(message);
            view.state.loading = false;
            view.phase = Phase::Terminal(Outcome::Error);
        });
    }
}
