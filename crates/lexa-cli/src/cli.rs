use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "lexa")]
#[command(about = "Offline-first vocabulary sessions with cloud sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the local backup, queue and settings
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Account the remote data belongs to
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// Use a libSQL database file as the remote store instead of Supabase
    #[arg(long, global = true, value_name = "PATH")]
    pub remote_db: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show local sessions and their sync state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage local sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Reconcile local sessions with the remote store
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Record test statistics
    Stats {
        #[command(subcommand)]
        command: StatsCommands,
    },
    /// Inspect and drain the pending statistics queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Create a session from a list of words
    Add {
        /// Library the words come from
        #[arg(long, default_value = "default")]
        tag: String,
        /// Number of words the session aims for (defaults to the word count)
        #[arg(long)]
        target: Option<u32>,
        /// Words to add
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Mark a session deleted; the deletion syncs on the next pass
    Delete {
        /// Session ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Sync a single session now
    Session {
        /// Session ID or unique ID prefix
        id: String,
    },
    /// Move failed sessions back to pending
    Retry,
    /// Settle a conflict by keeping one side
    Resolve {
        /// Session ID or unique ID prefix
        id: String,
        /// Side to keep
        #[arg(long, value_enum)]
        keep: KeepSide,
    },
    /// List sessions waiting for a conflict decision
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum StatsCommands {
    /// Commit a test result, queueing it when offline
    Record {
        /// Number of words tested
        #[arg(long)]
        tests: u32,
        /// Number answered correctly
        #[arg(long)]
        correct: u32,
        /// Points earned
        #[arg(long)]
        points: i64,
        /// Date the result counts towards (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
        /// Ledger version the result was computed against
        #[arg(long, value_name = "VERSION")]
        expected_version: Option<i64>,
    },
    /// Show the remote aggregate for a date
    Show {
        /// Date to show (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Retry every due item once
    Process,
    /// List queued deltas
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List deltas discarded after exhausting their retries
    DeadLetters {
        /// Forget the listed deltas
        #[arg(long)]
        clear: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KeepSide {
    Local,
    Remote,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}
