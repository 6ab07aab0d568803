use std::time::Duration;

use super::client::DryRunApi;
use super::models::{CorrelationId, JobStatus, TeamId};
use crate::errors::{PreviewError, Result};

/// Bounded exponential backoff for the status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(4000),
        }
    }
}

impl RetryPolicy {
    /// Wait after the 1-based `attempt` came back empty: `base * 2^(attempt-1)`, capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Every wait between attempts, in order. One fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.max_attempts).map(|attempt| self.delay_after(attempt))
    }
}

/// Polls the status endpoint until the backend knows about the job.
///
/// Only a "not yet known" answer is retried. A known status or an error is
/// returned immediately.
#[derive(Debug, Clone, Default)]
pub struct JobStatusProber {
    policy: RetryPolicy,
}

impl JobStatusProber {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn probe(
        &self,
        api: &dyn DryRunApi,
        correlation_id: &CorrelationId,
        team_id: &TeamId,
    ) -> Result<JobStatus> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if let Some(status) = api.fetch_status(correlation_id, team_id).await? {
                tracing::debug!(%correlation_id, attempt, %status, "job status resolved");
                return Ok(status);
            }
            if attempt < max_attempts {
                let delay = self.policy.delay_after(attempt);
                tracing::debug!(
                    %correlation_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "job status not known yet, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(PreviewError::JobNotFound {
            correlation_id: correlation_id.to_string(),
            attempts: max_attempts,
        })
    }
}
