//! Resume markers for `dryrun resume` and `dryrun markers`.

use anyhow::Result;
use std::path::Path;

use dryrun_preview::preview::{CorrelationId, FileResumeStore, ResumeStore};

use super::super::Cli;
use super::watch::{build_orchestrator, follow, load_config, report};

pub async fn cmd_resume(
    cli: &Cli,
    project_dir: &Path,
    correlation_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let store = FileResumeStore::new(config.resume_dir());

    let marker = match correlation_id {
        Some(id) => store.load(&CorrelationId::from(id))?,
        None => store.list()?.into_iter().next(),
    };
    let Some(marker) = marker else {
        match correlation_id {
            Some(id) => anyhow::bail!("No resume marker for dry run {}", id),
            None => anyhow::bail!("No resume markers found in {}", store.dir().display()),
        }
    };

    tracing::info!(
        correlation_id = %marker.correlation_id,
        team_id = %marker.team_id,
        saved_at = %marker.saved_at,
        "resuming dry run"
    );

    let orchestrator = build_orchestrator(&config)?;
    let view = follow(
        &orchestrator,
        marker.correlation_id.as_str(),
        marker.team_id.as_str(),
        json,
    )
    .await?;
    orchestrator.shutdown().await;

    report(marker.correlation_id.as_str(), view, json)
}

pub fn cmd_markers(cli: &Cli, project_dir: &Path) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let store = FileResumeStore::new(config.resume_dir());
    let markers = store.list()?;

    if markers.is_empty() {
        println!("No resume markers.");
        return Ok(());
    }

    println!("{:<40} {:<20} SAVED", "CORRELATION ID", "TEAM");
    for marker in markers {
        println!(
            "{:<40} {:<20} {}",
            marker.correlation_id,
            marker.team_id,
            marker.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}
