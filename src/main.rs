//! Server Backup Tool
//!
//! Archives files and database dumps into one compressed file and pushes it
//! to remote storage.

// serverbackup/src/main.rs
mod backup;
mod config;
mod errors;
mod notify;
mod registry;
mod upload;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "serverbackup", version, about = "Back up files and databases into one archive")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a new archive and upload it to every configured target
    Backup {
        /// Archive path; overrides `archive_path` from the config file
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Only build the archive
        #[arg(long)]
        skip_upload: bool,
    },
    /// Upload an existing archive to every configured target
    Upload {
        #[arg(long, short)]
        archive: PathBuf,
    },
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run_app(Cli::parse()).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    // Secrets referenced as `*_env` in the config may live in .env
    dotenv::dotenv().ok();

    let app_config = AppConfig::load_from_json(&cli.config).context(format!(
        "Failed to load application configuration from {}",
        cli.config.display()
    ))?;

    match cli.command {
        Command::Backup {
            output,
            skip_upload,
        } => {
            println!("🚀 Starting Backup Process...");
            backup::run_backup_flow(&app_config, output, skip_upload)
                .await
                .context("Backup process failed")?;
        }
        Command::Upload { archive } => {
            println!("📤 Starting Upload Process...");
            if app_config.uploads.is_empty() {
                anyhow::bail!("No upload targets configured in {}", cli.config.display());
            }
            let mut pipeline = backup::BackupPipeline::new(
                std::sync::Arc::new(backup::SqlDumpExporter),
                notify::Notifier::default(),
            );
            pipeline
                .adopt_archive(&archive)
                .with_context(|| format!("Cannot upload {}", archive.display()))?;
            upload::run_upload_flow(
                &mut pipeline,
                &app_config.uploads,
                app_config.remove_local_after_upload,
            )
            .await
            .context("Upload process failed")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_backup_command() {
        let cli = Cli::parse_from(["serverbackup", "--config", "prod.json", "backup", "-o", "out.tar.gz"]);
        assert_eq!(cli.config, PathBuf::from("prod.json"));
        match cli.command {
            Command::Backup { output, skip_upload } => {
                assert_eq!(output, Some(PathBuf::from("out.tar.gz")));
                assert!(!skip_upload);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_upload_command() {
        let cli = Cli::parse_from(["serverbackup", "upload", "--archive", "a.tar.gz"]);
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert!(matches!(cli.command, Command::Upload { .. }));
    }
}
