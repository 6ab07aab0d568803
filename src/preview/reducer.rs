//! Pure state transitions for the live preview.
//!
//! Nothing in here touches the network or reads the clock, so every transition can be
//! exercised directly in unit tests without a network.

use serde::Serialize;

use super::models::{DryRunEvent, JobStatus, Message, Snapshot};

/// State of the live connection as seen by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// Accumulated view of one job.
///
/// `messages` keeps first-insertion order; an update never moves an entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AggregateView {
    pub messages: Vec<Message>,
    pub status: Option<JobStatus>,
    pub description: Option<String>,
    pub connectivity: Connectivity,
    pub loading: bool,
    pub error: Option<String>,
}

impl AggregateView {
    /// Empty view for a job whose status is about to be probed.
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Default::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(JobStatus::is_terminal)
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }
}

/// Apply one streamed event.
pub fn apply(mut view: AggregateView, event: &DryRunEvent) -> AggregateView {
    match event {
        DryRunEvent::MessageAdded { message } => match view.position(message.id) {
            Some(idx) => view.messages[idx] = message.clone(),
            None => view.messages.push(message.clone()),
        },
        DryRunEvent::MessageUpdated {
            message_id,
            content,
        } => {
            // Updates for ids we have not seen are dropped, not buffered.
            if let Some(idx) = view.position(*message_id) {
                view.messages[idx].content = content.clone();
            }
        }
        DryRunEvent::DescriptionUpdated { description } => {
            view.description = Some(description.clone());
        }
        DryRunEvent::StatusUpdated { status } => {
            if !view.is_terminal() {
                view.status = Some(*status);
            }
        }
        DryRunEvent::Removed {} => {
            view.connectivity = Connectivity::Disconnected;
        }
    }
    view
}

/// Replace streamed content with the authoritative snapshot.
///
/// Messages and description are swapped wholesale; nothing from the live
/// phase is merged in. Status follows the same rule as `StatusUpdated`: a
/// terminal status already in the view is kept.
pub fn apply_snapshot(mut view: AggregateView, snapshot: Snapshot) -> AggregateView {
    view.messages = snapshot.messages;
    view.description = snapshot.description;
    match view.status {
        Some(current) if current.is_terminal() => {
            if current != snapshot.status {
                tracing::warn!(
                    %current,
                    snapshot = %snapshot.status,
                    "snapshot status disagrees with terminal status, keeping terminal"
                );
            }
        }
        _ => view.status = Some(snapshot.status),
    }
    view.loading = false;
    view
}
