//! Live preview of one dry run for `dryrun watch`.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use dryrun_preview::config::DryRunConfig;
use dryrun_preview::preview::{
    FileResumeStore, HttpDryRunApi, MemoryResumeStore, Orchestrator, OrchestratorOptions,
    PreviewView, ResumeStore,
};
use dryrun_preview::ui::PreviewRenderer;

use super::super::Cli;

pub fn load_config(cli: &Cli, project_dir: &Path) -> Result<DryRunConfig> {
    DryRunConfig::load(project_dir, cli.api_url.clone(), cli.token.clone())
        .context("Failed to load configuration")
}

pub fn resume_store(config: &DryRunConfig) -> Arc<dyn ResumeStore> {
    if config.toml.resume.enabled {
        Arc::new(FileResumeStore::new(config.resume_dir()))
    } else {
        Arc::new(MemoryResumeStore::new())
    }
}

pub fn build_orchestrator(config: &DryRunConfig) -> Result<Orchestrator> {
    let api = HttpDryRunApi::new(config.toml.api.clone(), config.auth_token.clone())
        .context("Failed to build API client")?;
    Ok(Orchestrator::spawn(
        Arc::new(api),
        resume_store(config),
        OrchestratorOptions {
            retry: config.toml.retry.policy(),
            auth_token: config.auth_token.clone(),
        },
    ))
}

/// Track a job until its view is terminal or the user interrupts.
///
/// Returns `None` when interrupted.
pub async fn follow(
    orchestrator: &Orchestrator,
    correlation_id: &str,
    team_id: &str,
    json: bool,
) -> Result<Option<PreviewView>> {
    let mut rx = orchestrator
        .track(correlation_id, team_id)
        .await
        .context("Failed to start tracking")?;
    let mut renderer = (!json).then(PreviewRenderer::new);

    loop {
        let view = rx.borrow_and_update().clone();
        if let Some(renderer) = renderer.as_mut() {
            renderer.render(&view);
        }
        if view.is_terminal() {
            if let Some(renderer) = &renderer {
                renderer.finish(&view);
            }
            return Ok(Some(view));
        }

        tokio::select! {
            changed = rx.changed() => {
                changed.context("Preview orchestrator stopped unexpectedly")?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(correlation_id, "interrupted, stopping");
                orchestrator.stop().await?;
                return Ok(None);
            }
        }
    }
}

/// Print the final view and turn an errored view into a failing exit.
pub fn report(correlation_id: &str, view: Option<PreviewView>, json: bool) -> Result<()> {
    let Some(view) = view else {
        return Ok(());
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&view).context("Failed to serialize preview")?
        );
    }

    match view.error() {
        Some(error) => anyhow::bail!("Dry run {} ended with an error: {}", correlation_id, error),
        None => Ok(()),
    }
}

pub async fn cmd_watch(
    cli: &Cli,
    project_dir: &Path,
    correlation_id: &str,
    team_id: &str,
    json: bool,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let orchestrator = build_orchestrator(&config)?;

    let view = follow(&orchestrator, correlation_id, team_id, json).await?;
    orchestrator.shutdown().await;

    report(correlation_id, view, json)
}
