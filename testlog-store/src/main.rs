//! `testlog-store` - maintenance commands against the configured backend.
//!
//! Configuration comes from the environment (see [`ServiceConfig`]); an
//! invalid configuration exits with status 1 before any backend is touched.

#![forbid(unsafe_code)]

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use testlog_store::logging::init_logging;
use testlog_store::{LogFormat, LogLevel, LogService, ProjectId, ServiceConfig};

#[derive(Parser, Debug)]
#[command(
    name = "testlog-store",
    about = "Maintenance commands for the test log store",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Override `LOGGING_LEVEL` (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Override `LOG_FORMAT` (json, text)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the backend and print what it supports
    Check,

    /// Remove a project's store and lifecycle artifacts
    DeleteProject {
        /// Project identifier
        #[arg(long)]
        project: ProjectId,
    },

    /// Delete logs older than the retention period (stores without lifecycle management)
    Purge {
        /// Project identifier
        #[arg(long)]
        project: ProjectId,

        /// Days of logs to keep
        #[arg(long)]
        keep_days: u32,
    },

    /// Change a project's retention policy
    UpdatePolicy {
        /// Project identifier
        #[arg(long)]
        project: ProjectId,

        /// Days of logs to keep
        #[arg(long)]
        keep_days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_logging(
        cli.log_level.unwrap_or(config.log_level),
        cli.log_format.unwrap_or(config.log_format),
    )?;

    let service = LogService::connect(&config).await?;

    match cli.command {
        Command::Check => {
            let caps = service.capabilities();
            println!("backend: {}", service.kind());
            println!("ranked search: {}", caps.ranked_search);
            println!("native retention: {}", caps.native_retention);
            println!("pattern syntax: {:?}", caps.pattern_syntax);
        }
        Command::DeleteProject { project } => {
            println!("{}", service.delete_project(project).await);
        }
        Command::Purge { project, keep_days } => {
            if service.capabilities().native_retention {
                bail!(
                    "{} expires logs through its lifecycle policy; use update-policy",
                    service.kind()
                );
            }
            let today = chrono::Utc::now().date_naive();
            println!("{}", service.expire_logs(project, keep_days, today).await);
        }
        Command::UpdatePolicy { project, keep_days } => {
            let updated = service.update_policy(project, keep_days).await;
            println!("{updated}");
            if updated == 0 {
                bail!("retention policy for project {project} was not updated");
            }
        }
    }

    Ok(())
}
