//! IssueBot - autonomous issue-resolution orchestrator
//!
//! CLI entry point for the daemon and its operator commands.

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use issuebot::cli::{Cli, Command, OutputFormat, parse_repo_arg};
use issuebot::config::Config;
use issuebot::daemon;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > INFO default
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    match cli.command {
        Some(Command::Run) | None => daemon::run(&config).await,
        Some(Command::Once) => daemon::run_once(&config).await,
        Some(Command::Status { format }) => cmd_status(&config, format).await,
        Some(Command::Check) => cmd_check(&config).await,
        Some(Command::Approve { repo, issue }) => cmd_approve(&config, &repo, issue).await,
        Some(Command::Reject { repo, issue, message }) => cmd_reject(&config, &repo, issue, &message).await,
    }
}

/// Show store counts and recent events
async fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    let components = daemon::build(config).await?;
    let counts = components.state.count_issues_by_status().await?;
    let events = components.state.recent_events(20).await?;

    match format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "issues": counts.iter().map(|(s, n)| (s.clone(), n)).collect::<std::collections::BTreeMap<_, _>>(),
                "recent_events": events,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        OutputFormat::Text => {
            println!("Tracked issues:");
            if counts.is_empty() {
                println!("  (none)");
            }
            for (status, count) in counts {
                println!("  {:<20} {}", status, count);
            }
            println!("\nRecent events:");
            for event in events {
                let issue = event.issue_id.map(|id| format!(" issue={}", id)).unwrap_or_default();
                println!("  [{}]{} {}", event.event_type, issue, event.message);
            }
        }
    }
    components.state.shutdown().await;
    Ok(())
}

/// Probe the configured tools and upstream access
async fn cmd_check(config: &Config) -> Result<()> {
    let components = daemon::build(config).await?;

    let codegen_ok = components.codegen.probe().await;
    println!("code-generation tool: {}", if codegen_ok { "ok" } else { "UNAVAILABLE" });

    let reviewer_ok = components.reviewer.probe().await;
    println!("reviewer tool:        {}", if reviewer_ok { "ok" } else { "UNAVAILABLE" });

    let token = config.github_token();
    println!(
        "upstream credentials: {}",
        if token.is_some() { "present" } else { "absent (read-only)" }
    );
    println!(
        "admin auth:           {}",
        if config.admin_auth_enabled() { "enabled" } else { "disabled" }
    );

    components.state.shutdown().await;
    if !codegen_ok {
        eyre::bail!("code-generation tool probe failed");
    }
    Ok(())
}

/// Approve an issue waiting for a human verdict
async fn cmd_approve(config: &Config, repo_arg: &str, number: u64) -> Result<()> {
    let (owner, name) = parse_repo_arg(repo_arg).ok_or_else(|| eyre::eyre!("repo must be owner/name"))?;
    let components = daemon::build(config).await?;

    let (repo, mut issue) = find_tracked(&components, owner, name, number).await?;
    components.engine.approve(&repo, &mut issue).await?;
    println!("approved and merged #{} in {}", number, repo_arg);

    components.state.shutdown().await;
    Ok(())
}

/// Reject an issue with feedback; re-runs the workflow inline
async fn cmd_reject(config: &Config, repo_arg: &str, number: u64, message: &str) -> Result<()> {
    let (owner, name) = parse_repo_arg(repo_arg).ok_or_else(|| eyre::eyre!("repo must be owner/name"))?;
    let components = daemon::build(config).await?;

    let (repo, mut issue) = find_tracked(&components, owner, name, number).await?;
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let outcome = components.engine.reject(&repo, &mut issue, message, cancel_rx).await?;
    println!("rejection recorded for #{}; workflow outcome: {:?}", number, outcome);

    components.state.shutdown().await;
    Ok(())
}

async fn find_tracked(
    components: &daemon::Components,
    owner: &str,
    name: &str,
    number: u64,
) -> Result<(issuestore::WatchedRepo, issuestore::TrackedIssue)> {
    let repo = components
        .state
        .list_repos()
        .await?
        .into_iter()
        .find(|r| r.owner == owner && r.name == name)
        .ok_or_else(|| eyre::eyre!("{}/{} is not a watched repo", owner, name))?;
    let issue = components
        .state
        .find_issue(repo.id, number)
        .await?
        .ok_or_else(|| eyre::eyre!("issue #{} is not tracked", number))?;
    Ok((repo, issue))
}
