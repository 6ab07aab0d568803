use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle identifying one dry-run job instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Team the job belongs to; every backend request is scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(String);

impl TeamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TeamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TeamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Server-side state of a dry run. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::InProgress => write!(f, "IN_PROGRESS"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineRange {
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

/// One review comment produced by the dry run. `id` is the merge key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_range: Option<LineRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_code: Option<String>,
}

impl Message {
    /// A message with only the required fields set.
    pub fn new(id: i64, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Authoritative terminal record of a job, as returned by the snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub messages: Vec<Message>,
    pub status: JobStatus,
    #[serde(default)]
    pub description: Option<String>,
}

/// Incremental change pushed over the live stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DryRunEvent {
    MessageAdded {
        message: Message,
    },
    MessageUpdated {
        #[serde(rename = "messageId")]
        message_id: i64,
        content: String,
    },
    DescriptionUpdated {
        description: String,
    },
    StatusUpdated {
        status: JobStatus,
    },
    Removed {},
}

impl DryRunEvent {
    /// The terminal status carried by a `StatusUpdated` event, if any.
    pub fn terminal_status(&self) -> Option<JobStatus> {
        match self {
            DryRunEvent::StatusUpdated { status } if status.is_terminal() => Some(*status),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DryRunEvent::MessageAdded { .. } => "MESSAGE_ADDED",
            DryRunEvent::MessageUpdated { .. } => "MESSAGE_UPDATED",
            DryRunEvent::DescriptionUpdated { .. } => "DESCRIPTION_UPDATED",
            DryRunEvent::StatusUpdated { .. } => "STATUS_UPDATED",
            DryRunEvent::Removed {} => "REMOVED",
        }
    }
}

/// The JSON object carried in each SSE `data` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEnvelope {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub dry_run_id: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(flatten)]
    pub event: DryRunEvent,
    #[serde(default)]
    pub timestamp: String,
}

impl StreamEnvelope {
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}
