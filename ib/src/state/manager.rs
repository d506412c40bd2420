//! StateManager - actor that owns the issue store
//!
//! Processes commands via channels for thread-safe access to persistent
//! state. One command is one transaction; status transitions that must not
//! race go through [`StateManager::update_issue_if_status`], which re-reads
//! the stored status inside the transaction and aborts on a mismatch.

use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use issuestore::{CostRecord, Database, EventRecord, IssueStatus, IterationRecord, TrackedIssue, WatchedRepo};

use super::messages::{StateCommand, StateError, StateResponse};

/// Handle to send commands to the StateManager actor
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Open the store and spawn the actor task
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        let db = Database::open(store_path.as_ref())?;
        Ok(Self::spawn_with(db))
    }

    /// Spawn over an already-open database (tests use the in-memory store)
    pub fn spawn_with(db: Database) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(db, rx));
        info!("state manager spawned");
        Self { tx }
    }

    async fn send<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand,
    ) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Watched repo operations ===

    pub async fn upsert_repo(&self, repo: WatchedRepo) -> StateResponse<i64> {
        debug!(repo = %repo.full_name(), "upsert_repo");
        self.send(|reply| StateCommand::UpsertRepo { repo, reply }).await
    }

    pub async fn get_repo(&self, id: i64) -> StateResponse<Option<WatchedRepo>> {
        self.send(|reply| StateCommand::GetRepo { id, reply }).await
    }

    pub async fn get_repo_required(&self, id: i64) -> Result<WatchedRepo, StateError> {
        self.get_repo(id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("watched repo {}", id)))
    }

    pub async fn list_repos(&self) -> StateResponse<Vec<WatchedRepo>> {
        self.send(|reply| StateCommand::ListRepos { reply }).await
    }

    // === Tracked issue operations ===

    pub async fn create_issue(&self, issue: TrackedIssue) -> StateResponse<i64> {
        debug!(repo_id = issue.repo_id, number = issue.issue_number, "create_issue");
        self.send(|reply| StateCommand::CreateIssue { issue, reply }).await
    }

    pub async fn get_issue(&self, id: i64) -> StateResponse<Option<TrackedIssue>> {
        self.send(|reply| StateCommand::GetIssue { id, reply }).await
    }

    pub async fn get_issue_required(&self, id: i64) -> Result<TrackedIssue, StateError> {
        self.get_issue(id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("tracked issue {}", id)))
    }

    pub async fn find_issue(&self, repo_id: i64, number: u64) -> StateResponse<Option<TrackedIssue>> {
        self.send(|reply| StateCommand::FindIssue { repo_id, number, reply }).await
    }

    pub async fn update_issue(&self, issue: TrackedIssue) -> StateResponse<()> {
        debug!(issue_id = issue.id, status = %issue.status, "update_issue");
        self.send(|reply| StateCommand::UpdateIssue { issue, reply }).await
    }

    /// Persist only if the stored status still matches `expected`
    pub async fn update_issue_if_status(&self, issue: TrackedIssue, expected: IssueStatus) -> StateResponse<bool> {
        debug!(issue_id = issue.id, %expected, new = %issue.status, "update_issue_if_status");
        self.send(|reply| StateCommand::UpdateIssueIfStatus { issue, expected, reply })
            .await
    }

    pub async fn list_issues_by_status(&self, status: IssueStatus) -> StateResponse<Vec<TrackedIssue>> {
        self.send(|reply| StateCommand::ListIssuesByStatus { status, reply }).await
    }

    pub async fn count_issues_by_status(&self) -> StateResponse<Vec<(String, u64)>> {
        self.send(|reply| StateCommand::CountIssuesByStatus { reply }).await
    }

    // === Iteration operations ===

    pub async fn create_iteration(&self, record: IterationRecord) -> StateResponse<i64> {
        debug!(issue_id = record.issue_id, iteration = record.iteration_num, "create_iteration");
        self.send(|reply| StateCommand::CreateIteration { record, reply }).await
    }

    pub async fn update_iteration(&self, record: IterationRecord) -> StateResponse<()> {
        self.send(|reply| StateCommand::UpdateIteration { record, reply }).await
    }

    pub async fn list_iterations(&self, issue_id: i64) -> StateResponse<Vec<IterationRecord>> {
        self.send(|reply| StateCommand::ListIterations { issue_id, reply }).await
    }

    pub async fn latest_iteration(&self, issue_id: i64) -> StateResponse<Option<IterationRecord>> {
        self.send(|reply| StateCommand::LatestIteration { issue_id, reply }).await
    }

    // === Cost operations ===

    pub async fn record_cost(&self, record: CostRecord) -> StateResponse<i64> {
        debug!(issue_id = record.issue_id, phase = %record.phase, "record_cost");
        self.send(|reply| StateCommand::RecordCost { record, reply }).await
    }

    // === Event operations ===

    pub async fn append_event(&self, event: EventRecord) -> StateResponse<i64> {
        debug!(event_type = %event.event_type, "append_event");
        self.send(|reply| StateCommand::AppendEvent { event, reply }).await
    }

    pub async fn recent_events(&self, limit: usize) -> StateResponse<Vec<EventRecord>> {
        self.send(|reply| StateCommand::RecentEvents { limit, reply }).await
    }

    pub async fn latest_event_of_type(&self, issue_id: i64, event_type: &str) -> StateResponse<Option<EventRecord>> {
        let event_type = event_type.to_string();
        self.send(|reply| StateCommand::LatestEventOfType {
            issue_id,
            event_type,
            reply,
        })
        .await
    }

    /// Request actor shutdown (pending commands are drained first)
    pub async fn shutdown(&self) {
        let _ = self.tx.send(StateCommand::Shutdown).await;
    }
}

/// The actor: owns the database, processes commands until Shutdown
async fn actor_loop(mut db: Database, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("state actor started");
    while let Some(command) = rx.recv().await {
        match command {
            StateCommand::UpsertRepo { repo, reply } => {
                let _ = reply.send(db.upsert_repo(&repo).map_err(Into::into));
            }
            StateCommand::GetRepo { id, reply } => {
                let _ = reply.send(db.find_repo(id).map_err(Into::into));
            }
            StateCommand::ListRepos { reply } => {
                let _ = reply.send(db.list_repos().map_err(Into::into));
            }
            StateCommand::CreateIssue { issue, reply } => {
                let _ = reply.send(db.insert_issue(&issue).map_err(Into::into));
            }
            StateCommand::GetIssue { id, reply } => {
                let _ = reply.send(db.find_issue(id).map_err(Into::into));
            }
            StateCommand::FindIssue { repo_id, number, reply } => {
                let _ = reply.send(db.find_issue_by_number(repo_id, number).map_err(Into::into));
            }
            StateCommand::UpdateIssue { issue, reply } => {
                let _ = reply.send(db.update_issue(&issue).map_err(Into::into));
            }
            StateCommand::UpdateIssueIfStatus { issue, expected, reply } => {
                let _ = reply.send(db.update_issue_if_status(&issue, expected).map_err(Into::into));
            }
            StateCommand::ListIssuesByStatus { status, reply } => {
                let _ = reply.send(db.list_issues_by_status(status).map_err(Into::into));
            }
            StateCommand::CountIssuesByStatus { reply } => {
                let _ = reply.send(db.count_issues_by_status().map_err(Into::into));
            }
            StateCommand::CreateIteration { record, reply } => {
                let _ = reply.send(db.insert_iteration(&record).map_err(Into::into));
            }
            StateCommand::UpdateIteration { record, reply } => {
                let _ = reply.send(db.update_iteration(&record).map_err(Into::into));
            }
            StateCommand::ListIterations { issue_id, reply } => {
                let _ = reply.send(db.list_iterations(issue_id).map_err(Into::into));
            }
            StateCommand::LatestIteration { issue_id, reply } => {
                let _ = reply.send(db.latest_iteration(issue_id).map_err(Into::into));
            }
            StateCommand::RecordCost { record, reply } => {
                let _ = reply.send(db.insert_cost(&record).map_err(Into::into));
            }
            StateCommand::AppendEvent { event, reply } => {
                let _ = reply.send(db.append_event(&event).map_err(Into::into));
            }
            StateCommand::RecentEvents { limit, reply } => {
                let _ = reply.send(db.recent_events(limit).map_err(Into::into));
            }
            StateCommand::LatestEventOfType {
                issue_id,
                event_type,
                reply,
            } => {
                let _ = reply.send(db.latest_event_of_type(issue_id, &event_type).map_err(Into::into));
            }
            StateCommand::Shutdown => {
                debug!("state actor shutting down");
                break;
            }
        }
    }
    if !rx.is_empty() {
        warn!("state actor exited with commands still queued");
    }
    debug!("state actor stopped");
}
