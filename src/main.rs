use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dryrun_preview::telemetry::{LogFormat, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "dryrun")]
#[command(version, about = "Live preview of server-side dry-run code reviews")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Backend base URL. Overrides dryrun.toml and DRYRUN_API_URL.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Bearer token for the live stream. Overrides DRYRUN_TOKEN.
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow a dry run until it finishes
    Watch {
        /// Correlation id of the dry run
        correlation_id: String,

        /// Team that owns the dry run
        #[arg(short, long)]
        team: String,

        /// Print the final view as JSON instead of live output
        #[arg(long)]
        json: bool,
    },
    /// Continue following a dry run from its saved resume marker
    Resume {
        /// Correlation id to resume (defaults to the most recent marker)
        correlation_id: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// List saved resume markers
    Markers,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate .dryrun/dryrun.toml
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    // A missing .env is fine; only an unreadable one is worth reporting.
    if let Err(e) = dotenvy::from_path(project_dir.join(".env"))
        && !e.not_found()
    {
        eprintln!("Warning: failed to load .env: {}", e);
    }

    let _log_guard = init_logging(cli.log_format, cli.verbose, cli.log_file.as_deref())?;

    match &cli.command {
        Commands::Watch {
            correlation_id,
            team,
            json,
        } => {
            cmd::cmd_watch(&cli, &project_dir, correlation_id, team, *json).await?;
        }
        Commands::Resume {
            correlation_id,
            json,
        } => {
            cmd::cmd_resume(&cli, &project_dir, correlation_id.as_deref(), *json).await?;
        }
        Commands::Markers => cmd::cmd_markers(&cli, &project_dir)?,
        Commands::Config { command } => cmd::cmd_config(&cli, &project_dir, command.clone())?,
    }

    Ok(())
}
