//! Persisted "resume" markers for jobs that were still streaming.
//!
//! A marker is written when live streaming starts and removed once the job is
//! finalized or withdrawn, so a later process can pick up an unfinished job.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::models::{CorrelationId, TeamId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeMarker {
    pub correlation_id: CorrelationId,
    pub team_id: TeamId,
    pub saved_at: DateTime<Utc>,
}

impl ResumeMarker {
    pub fn new(correlation_id: CorrelationId, team_id: TeamId) -> Self {
        Self {
            correlation_id,
            team_id,
            saved_at: Utc::now(),
        }
    }
}

pub trait ResumeStore: Send + Sync {
    fn save(&self, marker: &ResumeMarker) -> Result<()>;

    /// Removing a marker that does not exist is not an error.
    fn clear(&self, correlation_id: &CorrelationId) -> Result<()>;

    fn load(&self, correlation_id: &CorrelationId) -> Result<Option<ResumeMarker>>;

    /// All markers, newest first.
    fn list(&self) -> Result<Vec<ResumeMarker>>;
}

/// One JSON file per job under a directory.
pub struct FileResumeStore {
    dir: PathBuf,
}

impl FileResumeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a marker. ASCII letters, digits and `-` are kept; every
    /// other byte becomes `_xx` (lowercase hex), so distinct ids never share a file.
    fn marker_path(&self, correlation_id: &CorrelationId) -> PathBuf {
        let mut name = String::with_capacity(correlation_id.as_str().len());
        for byte in correlation_id.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("_{:02x}", byte));
            }
        }
        self.dir.join(format!("{}.json", name))
    }

    fn read_marker(&self, path: &Path) -> Result<ResumeMarker> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read resume marker: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse resume marker: {}", path.display()))
    }
}

impl ResumeStore for FileResumeStore {
    fn save(&self, marker: &ResumeMarker) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create resume directory: {}", self.dir.display())
        })?;
        let path = self.marker_path(&marker.correlation_id);
        let content =
            serde_json::to_string_pretty(marker).context("Failed to serialize resume marker")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write resume marker: {}", path.display()))
    }

    fn clear(&self, correlation_id: &CorrelationId) -> Result<()> {
        let path = self.marker_path(correlation_id);
        if let Ok(marker) = self.read_marker(&path)
            && marker.correlation_id != *correlation_id
        {
            tracing::warn!(
                path = %path.display(),
                stored = %marker.correlation_id,
                requested = %correlation_id,
                "resume marker belongs to another job, leaving it"
            );
            return Ok(());
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove resume marker: {}", path.display())),
        }
    }

    fn load(&self, correlation_id: &CorrelationId) -> Result<Option<ResumeMarker>> {
        let path = self.marker_path(correlation_id);
        if !path.exists() {
            return Ok(None);
        }
        let marker = self.read_marker(&path)?;
        Ok((marker.correlation_id == *correlation_id).then_some(marker))
    }

    fn list(&self) -> Result<Vec<ResumeMarker>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut markers = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read resume directory: {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_marker(&path) {
                Ok(marker) => markers.push(marker),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable resume marker"),
            }
        }

        markers.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(markers)
    }
}

/// Process-local store, used when markers are disabled and in tests.
#[derive(Default)]
pub struct MemoryResumeStore {
    markers: Mutex<HashMap<CorrelationId, ResumeMarker>>,
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResumeStore for MemoryResumeStore {
    fn save(&self, marker: &ResumeMarker) -> Result<()> {
        self.markers
            .lock()
            .map_err(|_| anyhow::anyhow!("resume store lock poisoned"))?
            .insert(marker.correlation_id.clone(), marker.clone());
        Ok(())
    }

    fn clear(&self, correlation_id: &CorrelationId) -> Result<()> {
        self.markers
            .lock()
            .map_err(|_| anyhow::anyhow!("resume store lock poisoned"))?
            .remove(correlation_id);
        Ok(())
    }

    fn load(&self, correlation_id: &CorrelationId) -> Result<Option<ResumeMarker>> {
        Ok(self
            .markers
            .lock()
            .map_err(|_| anyhow::anyhow!("resume store lock poisoned"))?
            .get(correlation_id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<ResumeMarker>> {
        let mut markers: Vec<ResumeMarker> = self
            .markers
            .lock()
            .map_err(|_| anyhow::anyhow!("resume store lock poisoned"))?
            .values()
            .cloned()
            .collect();
        markers.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(markers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn marker(id: &str, age_secs: i64) -> ResumeMarker {
        ResumeMarker {
            correlation_id: id.into(),
            team_id: "t1".into(),
            saved_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_file_store_round_trip_and_clear() {
        let dir = tempdir().unwrap();
        let store = FileResumeStore::new(dir.path().join("resume"));
        let m = marker("abc", 0);

        store.save(&m).unwrap();
        assert_eq!(store.load(&"abc".into()).unwrap(), Some(m));

        store.clear(&"abc".into()).unwrap();
        assert_eq!(store.load(&"abc".into()).unwrap(), None);
    }

    #[test]
    fn test_file_store_clear_missing_is_ok() {
        let dir = tempdir().unwrap();
        let store = FileResumeStore::new(dir.path());
        assert!(store.clear(&"never-saved".into()).is_ok());
    }

    #[test]
    fn test_file_store_sanitizes_ids() {
        let dir = tempdir().unwrap();
        let store = FileResumeStore::new(dir.path());
        store.save(&marker("../../etc/passwd", 0)).unwrap();

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(
            store
                .load(&"../../etc/passwd".into())
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_file_store_lists_newest_first_and_skips_junk() {
        let dir = tempdir().unwrap();
        let store = FileResumeStore::new(dir.path());
        store.save(&marker("old", 600)).unwrap();
        store.save(&marker("new", 5)).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let ids: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|m| m.correlation_id.to_string())
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_file_store_list_missing_dir() {
        let dir = tempdir().unwrap();
        let store = FileResumeStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryResumeStore::new();
        store.save(&marker("a", 10)).unwrap();
        store.save(&marker("b", 1)).unwrap();
        assert_eq!(store.list().unwrap()[0].correlation_id.as_str(), "b");
        store.clear(&"a".into()).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_keeps_similar_ids_apart() {
        let dir = tempdir().unwrap();
        let store = FileResumeStore::new(dir.path());
        for id in ["job.1", "job_1", "job/1"] {
            store.save(&marker(id, 0)).unwrap();
        }
        assert_eq!(store.list().unwrap().len(), 3);

        store.clear(&"job.1".into()).unwrap();

        assert!(store.load(&"job.1".into()).unwrap().is_none());
        let remaining = store.load(&"job_1".into()).unwrap().unwrap();
        assert_eq!(remaining.correlation_id.as_str(), "job_1");
        assert!(store.load(&"job/1".into()).unwrap().is_some());
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_file_store_ignores_marker_for_other_id() {
        let dir = tempdir().unwrap();
        let store = FileResumeStore::new(dir.path());
        store.save(&marker("abc", 0)).unwrap();
        // A file that decodes to "abc" but records a different job.
        let foreign = serde_json::to_string(&marker("xyz", 0)).unwrap();
        fs::write(dir.path().join("abc.json"), foreign).unwrap();

        assert!(store.load(&"abc".into()).unwrap().is_none());
        store.clear(&"abc".into()).unwrap();
        assert!(dir.path().join("abc.json").exists());
    }
}
