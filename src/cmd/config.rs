//! Configuration view and validation commands for `dryrun config`.

use anyhow::Result;
use std::path::Path;

use dryrun_preview::config::{DryRunConfig, DryRunToml};

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = DryRunConfig::config_dir(project_dir).join("dryrun.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = DryRunConfig::load(project_dir, cli.api_url.clone(), cli.token.clone())?;

            println!();
            println!("Dry-run Preview Configuration");
            println!("=============================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("Config file: (none, using defaults)");
            }
            println!();

            let api = &config.toml.api;
            println!("[api]");
            println!("  base_url = \"{}\"", api.base_url);
            println!("  status_path = \"{}\"", api.status_path);
            println!("  snapshot_path = \"{}\"", api.snapshot_path);
            println!("  stream_path = \"{}\"", api.stream_path);
            println!("  request_timeout_secs = {}", api.request_timeout_secs);
            println!();

            let retry = &config.toml.retry;
            println!("[retry]");
            println!("  max_attempts = {}", retry.max_attempts);
            println!("  base_delay_ms = {}", retry.base_delay_ms);
            println!("  max_delay_ms = {}", retry.max_delay_ms);
            println!();

            println!("[resume]");
            println!("  enabled = {}", config.toml.resume.enabled);
            println!("  dir = \"{}\"", config.resume_dir().display());
            println!();

            println!(
                "Auth token: {}",
                if config.auth_token.is_some() {
                    "set"
                } else {
                    "not set"
                }
            );
        }
        Some(ConfigCommands::Validate) => {
            if !config_path.exists() {
                println!("No config file at {}; defaults are valid.", config_path.display());
                return Ok(());
            }

            let toml = DryRunToml::load(&config_path)?;
            toml.validate()?;
            println!("Configuration is valid: {}", config_path.display());
        }
    }

    Ok(())
}
