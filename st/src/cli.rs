//! CLI argument parsing for the issuestore inspection binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "issuestore")]
#[command(version, about = "Inspect an IssueBot store", long_about = None)]
pub struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "issuebot.db")]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List watched repositories
    Repos,

    /// List tracked issues
    Issues {
        /// Filter by status (pending, queued, blocked, in_progress, awaiting_approval, completed, failed, cooldown)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show recent audit events
    Events {
        /// Number of events to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show iteration history and spend for one issue
    History {
        /// Tracked issue id
        #[arg(required = true)]
        issue_id: i64,
    },
}
