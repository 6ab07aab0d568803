use std::sync::Arc;

use super::client::DryRunApi;
use super::models::{CorrelationId, Snapshot, TeamId};
use super::resume::ResumeStore;
use crate::errors::{PreviewError, Result};

/// Fetches the authoritative record of a job that reached a terminal status.
#[derive(Clone)]
pub struct FinalizationFetcher {
    resume: Arc<dyn ResumeStore>,
}

impl FinalizationFetcher {
    pub fn new(resume: Arc<dyn ResumeStore>) -> Self {
        Self { resume }
    }

    /// Fetch the final snapshot. The job's resume marker is cleared whether or
    /// not the fetch succeeds.
    pub async fn fetch_final(
        &self,
        api: &dyn DryRunApi,
        correlation_id: &CorrelationId,
        team_id: &TeamId,
    ) -> Result<Snapshot> {
        let result = api.fetch_snapshot(correlation_id, team_id).await;

        if let Err(e) = self.resume.clear(correlation_id) {
            tracing::warn!(%correlation_id, error = %e, "failed to clear resume marker");
        }

        match result {
            Ok(snapshot) => {
                tracing::info!(
                    %correlation_id,
                    status = %snapshot.status,
                    messages = snapshot.messages.len(),
                    "dry run finalized"
                );
                Ok(snapshot)
            }
            Err(e) => {
                tracing::warn!(%correlation_id, error = %e, "final snapshot fetch failed");
                Err(PreviewError::FinalizationFetch(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::client::EventStream;
    use crate::preview::models::{JobStatus, Message};
    use crate::preview::resume::{MemoryResumeStore, ResumeMarker};
    use async_trait::async_trait;

    struct SnapshotOnly(Option<Snapshot>);

    #[async_trait]
    impl DryRunApi for SnapshotOnly {
        async fn fetch_status(
            &self,
            _correlation_id: &CorrelationId,
            _team_id: &TeamId,
        ) -> Result<Option<JobStatus>> {
            unreachable!()
        }

        async fn fetch_snapshot(
            &self,
            _correlation_id: &CorrelationId,
            _team_id: &TeamId,
        ) -> Result<Snapshot> {
            self.0.clone().ok_or(PreviewError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        }

        async fn open_stream(
            &self,
            _correlation_id: &CorrelationId,
            _team_id: &TeamId,
            _auth_token: Option<&str>,
        ) -> Result<EventStream> {
            unreachable!()
        }
    }

    fn store_with_marker(id: &str) -> Arc<MemoryResumeStore> {
        let store = Arc::new(MemoryResumeStore::new());
        store
            .save(&ResumeMarker::new(id.into(), "t1".into()))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_success_clears_marker() {
        let store = store_with_marker("abc");
        let fetcher = FinalizationFetcher::new(store.clone());
        let api = SnapshotOnly(Some(Snapshot {
            messages: vec![Message::new(1, "hello (final)")],
            status: JobStatus::Completed,
            description: Some("done".into()),
        }));

        let snapshot = fetcher
            .fetch_final(&api, &"abc".into(), &"t1".into())
            .await
            .unwrap();

        assert_eq!(snapshot.messages[0].content, "hello (final)");
        assert!(store.load(&"abc".into()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_still_clears_marker() {
        let store = store_with_marker("abc");
        let fetcher = FinalizationFetcher::new(store.clone());

        let err = fetcher
            .fetch_final(&SnapshotOnly(None), &"abc".into(), &"t1".into())
            .await
            .unwrap_err();

        assert!(matches!(err, PreviewError::FinalizationFetch(_)));
        assert!(err.to_string().contains("503"));
        assert!(store.load(&"abc".into()).unwrap().is_none());
    }
}
