//! Live preview of a server-side dry-run review.
//!
//! | Module         | Responsibility                                            |
//! |----------------|-----------------------------------------------------------|
//! | `models`       | Wire and domain types                                     |
//! | `reducer`      | Pure event application                                    |
//! | `prober`       | Status probe with bounded backoff                         |
//! | `stream`       | Single live SSE connection                                |
//! | `finalize`     | Authoritative snapshot once the job is terminal           |
//! | `orchestrator` | State machine that owns the published view               |
//! | `client`       | Backend trait and its HTTP implementation                 |
//! | `sse`          | Incremental `text/event-stream` decoding                  |
//! | `resume`       | Markers for jobs that can be picked up again              |

pub mod client;
pub mod finalize;
pub mod models;
pub mod orchestrator;
pub mod prober;
pub mod reducer;
pub mod resume;
pub mod sse;
pub mod stream;

pub use client::{DryRunApi, EventStream, HttpDryRunApi};
pub use models::{CorrelationId, DryRunEvent, JobStatus, Message, Snapshot, TeamId};
pub use orchestrator::{Orchestrator, OrchestratorOptions, Outcome, Phase, PreviewView};
pub use reducer::{AggregateView, Connectivity};
pub use resume::{FileResumeStore, MemoryResumeStore, ResumeMarker, ResumeStore};
