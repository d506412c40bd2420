//! TrackedIssue entity and the workflow status vocabulary
//!
//! `status` is the single source of truth for where an issue sits in the
//! workflow; every other field follows it.

use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{Database, StoreError};
use crate::now_ms;

/// Workflow status of a tracked issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Discovered, not yet gated or queued
    #[default]
    Pending,
    /// Ready to run, waiting for dispatch
    Queued,
    /// Has unresolved blockers
    Blocked,
    /// A workflow is (or should be) driving it
    InProgress,
    /// Change pushed, waiting for a human verdict
    AwaitingApproval,
    /// Merged and closed
    Completed,
    /// Escalated to a human
    Failed,
    /// Quiet period after escalation before automatic retry
    Cooldown,
}

impl IssueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Blocked => "blocked",
            Self::InProgress => "in_progress",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cooldown => "cooldown",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for IssueStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "blocked" => Ok(Self::Blocked),
            "in_progress" => Ok(Self::InProgress),
            "awaiting_approval" => Ok(Self::AwaitingApproval),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cooldown" => Ok(Self::Cooldown),
            other => Err(StoreError::InvalidField(format!("issue status: {}", other))),
        }
    }
}

/// Phase within one workflow iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Implementation,
    SelfAssessment,
    CiWait,
    Review,
    Merge,
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Implementation => "implementation",
            Self::SelfAssessment => "self_assessment",
            Self::CiWait => "ci_wait",
            Self::Review => "review",
            Self::Merge => "merge",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for WorkflowPhase {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "implementation" => Ok(Self::Implementation),
            "self_assessment" => Ok(Self::SelfAssessment),
            "ci_wait" => Ok(Self::CiWait),
            "review" => Ok(Self::Review),
            "merge" => Ok(Self::Merge),
            other => Err(StoreError::InvalidField(format!("workflow phase: {}", other))),
        }
    }
}

/// An upstream issue the daemon has picked up for automated work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedIssue {
    /// Surrogate id (0 until saved)
    pub id: i64,
    pub repo_id: i64,
    pub issue_number: u64,
    pub issue_title: String,
    pub status: IssueStatus,
    pub current_iteration: u32,
    pub current_review_iteration: u32,
    pub branch_name: Option<String>,
    pub current_phase: Option<WorkflowPhase>,
    /// Set iff status is [`IssueStatus::Cooldown`]; stale values from past
    /// cooldowns are kept as an audit trail and are inert
    pub cooldown_until: Option<i64>,
    /// Comma-separated blocker issue numbers, ascending
    pub blocked_by_issues: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TrackedIssue {
    pub fn new(repo_id: i64, issue_number: u64, title: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: 0,
            repo_id,
            issue_number,
            issue_title: title.into(),
            status: IssueStatus::Pending,
            current_iteration: 0,
            current_review_iteration: 0,
            branch_name: None,
            current_phase: None,
            cooldown_until: None,
            blocked_by_issues: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: IssueStatus) {
        debug!(issue = self.issue_number, %status, "status change");
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn set_phase(&mut self, phase: Option<WorkflowPhase>) {
        self.current_phase = phase;
        self.updated_at = now_ms();
    }

    pub fn set_branch(&mut self, branch: impl Into<String>) {
        self.branch_name = Some(branch.into());
        self.updated_at = now_ms();
    }

    /// Store the blocker set, ascending and deduplicated
    pub fn set_blocked_by(&mut self, blockers: &[u64]) {
        let mut sorted: Vec<u64> = blockers.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        self.blocked_by_issues = sorted.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
        self.updated_at = now_ms();
    }

    /// Blocker numbers parsed from the stored CSV; unparseable entries dropped
    pub fn blocked_by_list(&self) -> Vec<u64> {
        parse_csv_numbers(&self.blocked_by_issues)
    }

    /// Reset counters and status for a fresh attempt.
    ///
    /// Leaves `cooldown_until` untouched: the stale timestamp documents when
    /// the last escalation ended and is ignored outside COOLDOWN status.
    pub fn reset_for_retry(&mut self) {
        self.status = IssueStatus::Pending;
        self.current_iteration = 0;
        self.current_review_iteration = 0;
        self.current_phase = None;
        self.updated_at = now_ms();
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(4)?;
        let phase: Option<String> = row.get(8)?;
        Ok(Self {
            id: row.get(0)?,
            repo_id: row.get(1)?,
            issue_number: row.get::<_, i64>(2)? as u64,
            issue_title: row.get(3)?,
            status: status
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?,
            current_iteration: row.get(5)?,
            current_review_iteration: row.get(6)?,
            branch_name: row.get(7)?,
            current_phase: phase
                .map(|p| p.parse())
                .transpose()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e)))?,
            cooldown_until: row.get(9)?,
            blocked_by_issues: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

/// Parse a CSV of positive integers, dropping anything unparseable
pub fn parse_csv_numbers(csv: &str) -> Vec<u64> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .collect()
}

const ISSUE_COLUMNS: &str = "id, repo_id, issue_number, issue_title, status, current_iteration, \
                             current_review_iteration, branch_name, current_phase, cooldown_until, \
                             blocked_by_issues, created_at, updated_at";

impl Database {
    /// Insert a new tracked issue; returns its id
    pub fn insert_issue(&self, issue: &TrackedIssue) -> Result<i64, StoreError> {
        self.conn().execute(
            "INSERT INTO tracked_issues (repo_id, issue_number, issue_title, status, current_iteration, \
             current_review_iteration, branch_name, current_phase, cooldown_until, blocked_by_issues, \
             created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                issue.repo_id,
                issue.issue_number as i64,
                issue.issue_title,
                issue.status.to_string(),
                issue.current_iteration,
                issue.current_review_iteration,
                issue.branch_name,
                issue.current_phase.map(|p| p.to_string()),
                issue.cooldown_until,
                issue.blocked_by_issues,
                issue.created_at,
                issue.updated_at,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Persist all mutable fields of an existing issue
    pub fn update_issue(&self, issue: &TrackedIssue) -> Result<(), StoreError> {
        let n = self.conn().execute(
            "UPDATE tracked_issues SET issue_title = ?2, status = ?3, current_iteration = ?4, \
             current_review_iteration = ?5, branch_name = ?6, current_phase = ?7, cooldown_until = ?8, \
             blocked_by_issues = ?9, updated_at = ?10 WHERE id = ?1",
            params![
                issue.id,
                issue.issue_title,
                issue.status.to_string(),
                issue.current_iteration,
                issue.current_review_iteration,
                issue.branch_name,
                issue.current_phase.map(|p| p.to_string()),
                issue.cooldown_until,
                issue.blocked_by_issues,
                issue.updated_at,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("tracked issue {}", issue.id)));
        }
        Ok(())
    }

    /// Optimistic check-then-update: persist only if the stored status still
    /// matches `expected`. Returns false (and writes nothing) on a mismatch.
    pub fn update_issue_if_status(&mut self, issue: &TrackedIssue, expected: IssueStatus) -> Result<bool, StoreError> {
        let tx = self.conn_mut().transaction()?;
        let current: String = tx.query_row(
            "SELECT status FROM tracked_issues WHERE id = ?1",
            params![issue.id],
            |row| row.get(0),
        )?;
        if current != expected.to_string() {
            debug!(issue = issue.issue_number, %current, expected = %expected, "status changed underneath, aborting");
            return Ok(false);
        }
        tx.execute(
            "UPDATE tracked_issues SET issue_title = ?2, status = ?3, current_iteration = ?4, \
             current_review_iteration = ?5, branch_name = ?6, current_phase = ?7, cooldown_until = ?8, \
             blocked_by_issues = ?9, updated_at = ?10 WHERE id = ?1",
            params![
                issue.id,
                issue.issue_title,
                issue.status.to_string(),
                issue.current_iteration,
                issue.current_review_iteration,
                issue.branch_name,
                issue.current_phase.map(|p| p.to_string()),
                issue.cooldown_until,
                issue.blocked_by_issues,
                issue.updated_at,
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn find_issue(&self, id: i64) -> Result<Option<TrackedIssue>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {} FROM tracked_issues WHERE id = ?1", ISSUE_COLUMNS))?;
        let mut rows = stmt.query_map(params![id], TrackedIssue::from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn find_issue_by_number(&self, repo_id: i64, number: u64) -> Result<Option<TrackedIssue>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM tracked_issues WHERE repo_id = ?1 AND issue_number = ?2",
            ISSUE_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![repo_id, number as i64], TrackedIssue::from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// All issues in the given status, ascending by (repo, number)
    pub fn list_issues_by_status(&self, status: IssueStatus) -> Result<Vec<TrackedIssue>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM tracked_issues WHERE status = ?1 ORDER BY repo_id, issue_number",
            ISSUE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![status.to_string()], TrackedIssue::from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Status histogram for the status CLI
    pub fn count_issues_by_status(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT status, COUNT(*) FROM tracked_issues GROUP BY status ORDER BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::WatchedRepo;

    fn db_with_repo() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let repo_id = db.upsert_repo(&WatchedRepo::new("octocat", "hello-world")).unwrap();
        (db, repo_id)
    }

    #[test]
    fn test_insert_and_find_by_number() {
        let (db, repo_id) = db_with_repo();
        let issue = TrackedIssue::new(repo_id, 7, "Fix the parser");
        let id = db.insert_issue(&issue).unwrap();
        assert!(id > 0);

        let found = db.find_issue_by_number(repo_id, 7).unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.status, IssueStatus::Pending);
        assert_eq!(found.issue_title, "Fix the parser");
    }

    #[test]
    fn test_update_roundtrips_all_fields() {
        let (db, repo_id) = db_with_repo();
        let mut issue = TrackedIssue::new(repo_id, 7, "Fix the parser");
        issue.id = db.insert_issue(&issue).unwrap();

        issue.set_status(IssueStatus::InProgress);
        issue.current_iteration = 2;
        issue.set_phase(Some(WorkflowPhase::CiWait));
        issue.set_branch("issuebot/issue-7-fix-the-parser");
        issue.set_blocked_by(&[15, 10, 10]);
        db.update_issue(&issue).unwrap();

        let found = db.find_issue(issue.id).unwrap().unwrap();
        assert_eq!(found.status, IssueStatus::InProgress);
        assert_eq!(found.current_phase, Some(WorkflowPhase::CiWait));
        assert_eq!(found.blocked_by_issues, "10,15");
        assert_eq!(found.blocked_by_list(), vec![10, 15]);
    }

    #[test]
    fn test_update_if_status_detects_conflict() {
        let (mut db, repo_id) = db_with_repo();
        let mut issue = TrackedIssue::new(repo_id, 7, "t");
        issue.set_status(IssueStatus::Queued);
        issue.id = db.insert_issue(&issue).unwrap();

        // Expected status matches: write goes through.
        let mut dispatched = issue.clone();
        dispatched.set_status(IssueStatus::InProgress);
        assert!(db.update_issue_if_status(&dispatched, IssueStatus::Queued).unwrap());

        // Now the stored status is in_progress; a second dispatch must abort.
        let mut racing = issue.clone();
        racing.set_status(IssueStatus::InProgress);
        assert!(!db.update_issue_if_status(&racing, IssueStatus::Queued).unwrap());
    }

    #[test]
    fn test_reset_for_retry_keeps_cooldown_timestamp() {
        let mut issue = TrackedIssue::new(1, 7, "t");
        issue.set_status(IssueStatus::Cooldown);
        issue.cooldown_until = Some(12345);
        issue.current_iteration = 4;

        issue.reset_for_retry();
        assert_eq!(issue.status, IssueStatus::Pending);
        assert_eq!(issue.current_iteration, 0);
        assert_eq!(issue.current_review_iteration, 0);
        assert_eq!(issue.cooldown_until, Some(12345));
    }

    #[test]
    fn test_parse_csv_numbers_drops_garbage() {
        assert_eq!(parse_csv_numbers("10,15"), vec![10, 15]);
        assert_eq!(parse_csv_numbers(" 10 , x, 15 , 0, -3,"), vec![10, 15]);
        assert!(parse_csv_numbers("").is_empty());
    }

    #[test]
    fn test_list_by_status_orders_by_repo_and_number() {
        let (db, repo_id) = db_with_repo();
        for n in [20u64, 7, 15] {
            let mut issue = TrackedIssue::new(repo_id, n, "t");
            issue.set_status(IssueStatus::Queued);
            db.insert_issue(&issue).unwrap();
        }
        let queued = db.list_issues_by_status(IssueStatus::Queued).unwrap();
        let numbers: Vec<u64> = queued.iter().map(|i| i.issue_number).collect();
        assert_eq!(numbers, vec![7, 15, 20]);
    }
}
