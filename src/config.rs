//! Configuration for the dry-run preview tracker.
//!
//! Settings are read from `.dryrun/dryrun.toml` and layered
//! file → environment → CLI flag. Every section is optional.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! base_url = "https://api.example.com"
//! status_path = "/dry-run/status"
//! snapshot_path = "/dry-run/snapshot"
//! stream_path = "/dry-run/stream"
//! request_timeout_secs = 30
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 500
//! max_delay_ms = 4000
//!
//! [resume]
//! enabled = true
//! dir = ".dryrun/resume"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::preview::prober::RetryPolicy;

/// Environment variable overriding `api.base_url`.
pub const API_URL_ENV: &str = "DRYRUN_API_URL";
/// Environment variable carrying the bearer token.
pub const TOKEN_ENV: &str = "DRYRUN_TOKEN";

/// Backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_status_path")]
    pub status_path: String,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// Applies to status and snapshot requests, never to the live stream.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_status_path() -> String {
    "/dry-run/status".to_string()
}

fn default_snapshot_path() -> String {
    "/dry-run/snapshot".to_string()
}

fn default_stream_path() -> String {
    "/dry-run/stream".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            status_path: default_status_path(),
            snapshot_path: default_snapshot_path(),
            stream_path: default_stream_path(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ApiSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Backoff used while the job status is not yet known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    4000
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Where resume markers are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeSection {
    #[serde(default = "default_resume_enabled")]
    pub enabled: bool,
    /// Relative paths resolve against the project directory.
    #[serde(default = "default_resume_dir")]
    pub dir: PathBuf,
}

fn default_resume_enabled() -> bool {
    true
}

fn default_resume_dir() -> PathBuf {
    PathBuf::from(".dryrun/resume")
}

impl Default for ResumeSection {
    fn default() -> Self {
        Self {
            enabled: default_resume_enabled(),
            dir: default_resume_dir(),
        }
    }
}

/// Contents of `dryrun.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunToml {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub resume: ResumeSection,
}

impl DryRunToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse dryrun.toml")
    }

    /// Load `<config_dir>/dryrun.toml`, or defaults when the file doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("dryrun.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings that would make the tracker misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.base_delay_ms == 0 {
            anyhow::bail!("retry.base_delay_ms must be greater than 0");
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            anyhow::bail!(
                "retry.max_delay_ms ({}) must not be below retry.base_delay_ms ({})",
                self.retry.max_delay_ms,
                self.retry.base_delay_ms
            );
        }
        reqwest::Url::parse(&self.api.base_url)
            .with_context(|| format!("api.base_url is not a valid URL: {}", self.api.base_url))?;
        Ok(())
    }
}

/// Effective configuration after layering the environment and CLI flags.
#[derive(Debug, Clone)]
pub struct DryRunConfig {
    pub toml: DryRunToml,
    pub auth_token: Option<String>,
    pub project_dir: PathBuf,
}

impl DryRunConfig {
    /// Directory holding `dryrun.toml` for a project.
    pub fn config_dir(project_dir: &Path) -> PathBuf {
        project_dir.join(".dryrun")
    }

    /// Load file settings, then apply the environment, then explicit flags.
    pub fn load(
        project_dir: &Path,
        api_url: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let mut toml = DryRunToml::load_or_default(&Self::config_dir(project_dir))?;

        if let Ok(url) = std::env::var(API_URL_ENV) {
            toml.api.base_url = url;
        }
        if let Some(url) = api_url {
            toml.api.base_url = url;
        }

        let auth_token = token.or_else(|| std::env::var(TOKEN_ENV).ok());

        toml.validate()?;

        Ok(Self {
            toml,
            auth_token,
            project_dir: project_dir.to_path_buf(),
        })
    }

    /// Resume marker directory, resolved against the project directory.
    pub fn resume_dir(&self) -> PathBuf {
        if self.toml.resume.dir.is_absolute() {
            self.toml.resume.dir.clone()
        } else {
            self.project_dir.join(&self.toml.resume.dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DryRunToml::parse("").unwrap();
        assert_eq!(config, DryRunToml::default());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.api.stream_path, "/dry-run/stream");
        assert!(config.resume.enabled);
    }

    #[test]
    fn test_partial_sections() {
        let config = DryRunToml::parse(
            r#"
[api]
base_url = "https://review.example.com/api"

[retry]
max_attempts = 3
"#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://review.example.com/api");
        assert_eq!(config.api.status_path, "/dry-run/status");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_delay_ms, 4000);
    }

    #[test]
    fn test_retry_policy_from_section() {
        let policy = RetrySection::default().policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_millis(4000));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = DryRunToml::parse("[retry]\nmax_attempts = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let config = DryRunToml::parse("[retry]\nbase_delay_ms = 500\nmax_delay_ms = 100\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = DryRunToml::parse("[api]\nbase_url = \"not a url\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(DryRunToml::parse("[retry\nmax_attempts = ").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = DryRunToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config, DryRunToml::default());
    }

    #[test]
    fn test_load_or_default_reads_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("dryrun.toml"),
            "[resume]\nenabled = false\ndir = \"/tmp/markers\"\n",
        )
        .unwrap();
        let config = DryRunToml::load_or_default(dir.path()).unwrap();
        assert!(!config.resume.enabled);
        assert_eq!(config.resume.dir, PathBuf::from("/tmp/markers"));
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempdir().unwrap();
        let config_dir = DryRunConfig::config_dir(dir.path());
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("dryrun.toml"),
            "[api]\nbase_url = \"http://file.example\"\n",
        )
        .unwrap();

        let config = DryRunConfig::load(
            dir.path(),
            Some("http://flag.example".into()),
            Some("secret".into()),
        )
        .unwrap();
        assert_eq!(config.toml.api.base_url, "http://flag.example");
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.resume_dir(), dir.path().join(".dryrun/resume"));
    }
}
