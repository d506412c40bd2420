//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// IssueBot - autonomous issue-resolution orchestrator
#[derive(Parser)]
#[command(
    name = "ib",
    about = "Polls watched repos and drives agent-ready issues through implement/CI/review/merge",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground
    Run,

    /// Run a single poll cycle and wait for dispatched workflows
    Once,

    /// Show store counts and recent events
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Probe the configured tools and upstream access
    Check,

    /// Approve an issue waiting in AWAITING_APPROVAL
    Approve {
        /// Repository as owner/name
        repo: String,

        /// Issue number
        issue: u64,
    },

    /// Reject an issue waiting in AWAITING_APPROVAL, with feedback
    Reject {
        /// Repository as owner/name
        repo: String,

        /// Issue number
        issue: u64,

        /// Feedback threaded into the next implementation attempt
        #[arg(short, long)]
        message: String,
    },
}

/// Output format for status
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Split an `owner/name` argument
pub fn parse_repo_arg(arg: &str) -> Option<(&str, &str)> {
    let (owner, name) = arg.split_once('/')?;
    if owner.is_empty() || name.is_empty() {
        return None;
    }
    Some((owner, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_arg() {
        assert_eq!(parse_repo_arg("octocat/hello-world"), Some(("octocat", "hello-world")));
        assert!(parse_repo_arg("nodash").is_none());
        assert!(parse_repo_arg("/name").is_none());
        assert!(parse_repo_arg("owner/").is_none());
    }
}
