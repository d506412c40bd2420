use clap::Parser;

use issuestore::cli::{Cli, Command};
use issuestore::{Database, IssueStatus, StoreError};

fn main() -> Result<(), StoreError> {
    let cli = Cli::parse();
    let db = Database::open(&cli.db)?;

    match cli.command {
        Command::Repos => {
            for repo in db.list_repos()? {
                println!("{}", serde_json::to_string(&repo).expect("repo serializes"));
            }
        }
        Command::Issues { status } => {
            let statuses: Vec<IssueStatus> = match status {
                Some(s) => vec![s.parse()?],
                None => vec![
                    IssueStatus::Pending,
                    IssueStatus::Queued,
                    IssueStatus::Blocked,
                    IssueStatus::InProgress,
                    IssueStatus::AwaitingApproval,
                    IssueStatus::Completed,
                    IssueStatus::Failed,
                    IssueStatus::Cooldown,
                ],
            };
            for status in statuses {
                for issue in db.list_issues_by_status(status)? {
                    println!("{}", serde_json::to_string(&issue).expect("issue serializes"));
                }
            }
        }
        Command::Events { limit } => {
            for event in db.recent_events(limit)? {
                println!("{}", serde_json::to_string(&event).expect("event serializes"));
            }
        }
        Command::History { issue_id } => {
            for record in db.list_iterations(issue_id)? {
                println!("{}", serde_json::to_string(&record).expect("iteration serializes"));
            }
            println!("total estimated cost: ${:.4}", db.total_cost(issue_id)?);
        }
    }

    Ok(())
}
