//! Lexa CLI - offline-first vocabulary sessions from the terminal
//!
//! Sessions live in a local backup file and are reconciled with the remote
//! store on demand; test statistics are queued while the remote is away.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, QueueCommands, SessionCommands, StatsCommands, SyncCommands};
use crate::commands::common::AppContext;
use crate::commands::completions::run_completions;
use crate::commands::queue::{run_queue_dead_letters, run_queue_list, run_queue_process};
use crate::commands::session::{run_session_add, run_session_delete};
use crate::commands::stats::{run_stats_record, run_stats_show, RecordArgs};
use crate::commands::status::run_status;
use crate::commands::sync::{
    run_sync, run_sync_conflicts, run_sync_resolve, run_sync_retry, run_sync_session,
};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lexa=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let context = AppContext::resolve(cli.data_dir, cli.user, cli.remote_db)?;

    match cli.command {
        Commands::Status { json } => run_status(json, &context).await?,
        Commands::Session { command } => match command {
            SessionCommands::Add {
                tag,
                target,
                words,
            } => {
                run_session_add(&tag, target, &words, &context).await?;
            }
            SessionCommands::Delete { id } => run_session_delete(&id, &context).await?,
        },
        Commands::Sync { command } => match command {
            None => {
                run_sync(&context).await?;
            }
            Some(SyncCommands::Session { id }) => {
                run_sync_session(&id, &context).await?;
            }
            Some(SyncCommands::Retry) => {
                run_sync_retry(&context).await?;
            }
            Some(SyncCommands::Resolve { id, keep }) => {
                run_sync_resolve(&id, keep, &context).await?;
            }
            Some(SyncCommands::Conflicts { json }) => run_sync_conflicts(json, &context).await?,
        },
        Commands::Stats { command } => match command {
            StatsCommands::Record {
                tests,
                correct,
                points,
                date,
                expected_version,
            } => {
                let args = RecordArgs {
                    tests,
                    correct,
                    points,
                    date,
                    expected_version,
                };
                run_stats_record(&args, &context).await?;
            }
            StatsCommands::Show { date, json } => run_stats_show(date, json, &context).await?,
        },
        Commands::Queue { command } => match command {
            QueueCommands::Process => {
                run_queue_process(&context).await?;
            }
            QueueCommands::List { json } => run_queue_list(json, &context).await?,
            QueueCommands::DeadLetters { clear, json } => {
                run_queue_dead_letters(clear, json, &context).await?;
            }
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}
