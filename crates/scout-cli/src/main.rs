use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scout_storage::Store;
use scout_sync::{AppConfig, Scheduler, SettingsHandle, SyncOutcome};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scout-cli")]
#[command(about = "FTC scouting mirror command-line interface")]
struct Cli {
    /// SQLite database file (overrides SCOUT_DB_PATH).
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Season year (overrides SCOUT_SEASON).
    #[arg(long, global = true)]
    season: Option<String>,
    /// Event code (overrides SCOUT_EVENT_CODE).
    #[arg(long, global = true)]
    event: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one reconciliation pass and exit.
    Sync,
    /// Keep syncing on the configured interval until interrupted.
    Run,
    /// Create the database schema if it is missing.
    Migrate,
    /// Print teams, interviews and matches as JSON.
    Export,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(cli: &Cli) -> AppConfig {
    let mut config = AppConfig::from_env();
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(season) = &cli.season {
        config.settings.season = season.clone();
    }
    if let Some(event) = &cli.event {
        config.settings.event_code = event.clone();
    }
    config
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli);

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let reconciler = scout_sync::build_reconciler(&config).await?;
            match reconciler.perform_sync(&config.settings).await {
                SyncOutcome::Completed(summary) => {
                    println!(
                        "sync complete: run_id={} event={}/{} teams={} bios={}/{} matches={} skipped={}",
                        summary.run_id,
                        summary.season,
                        summary.event_code,
                        summary.teams_seen,
                        summary.bios_applied,
                        summary.bios_requested,
                        summary.matches_written,
                        summary.matches_skipped
                    );
                }
                SyncOutcome::Failed { run_id, error } => {
                    eprintln!("sync failed: run_id={run_id} error={error}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Run => {
            let reconciler = Arc::new(scout_sync::build_reconciler(&config).await?);
            let scheduler = Scheduler::new(reconciler, SettingsHandle::new(config.settings.clone())).await?;
            scheduler.start().await?;
            tokio::signal::ctrl_c()
                .await
                .context("waiting for ctrl-c")?;
            info!("interrupt received; stopping");
            scheduler.shutdown().await?;
        }
        Commands::Migrate => {
            Store::open(&config.db_path)
                .await
                .with_context(|| format!("opening store {}", config.db_path.display()))?;
            println!("schema ready: {}", config.db_path.display());
        }
        Commands::Export => {
            let store = Store::open(&config.db_path)
                .await
                .with_context(|| format!("opening store {}", config.db_path.display()))?;
            let snapshot = store.export_snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}
