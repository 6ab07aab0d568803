//! Logging setup.
//!
//! Logs go to stderr so they never interleave with rendered preview output on
//! stdout. `RUST_LOG` always wins over the verbosity flag.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Keeps the background file writer alive; drop it last.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

/// Install the global subscriber. Later calls leave the first one in place.
pub fn init_logging(format: LogFormat, verbose: bool, log_file: Option<&Path>) -> Result<LogGuard> {
    let mut layers = Vec::new();

    layers.push(match format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    });

    let mut file_guard = None;
    if let Some(path) = log_file {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
        layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
        file_guard = Some(guard);
    }

    let _ = tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(layers)
        .try_init();

    Ok(LogGuard { _file: file_guard })
}
