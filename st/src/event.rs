//! Append-only audit log

use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

use crate::db::{Database, StoreError};
use crate::now_ms;

/// One durable audit event.
///
/// `event_type` is a free-form tag ("MAX_ITERATIONS_REACHED",
/// "HUMAN_REJECTION", ...); consumers match on it, the store does not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Surrogate id (0 until saved)
    pub id: i64,
    pub created_at: i64,
    pub event_type: String,
    pub repo_id: Option<i64>,
    pub issue_id: Option<i64>,
    pub message: String,
}

impl EventRecord {
    pub fn new(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            created_at: now_ms(),
            event_type: event_type.into(),
            repo_id: None,
            issue_id: None,
            message: message.into(),
        }
    }

    pub fn with_repo(mut self, repo_id: i64) -> Self {
        self.repo_id = Some(repo_id);
        self
    }

    pub fn with_issue(mut self, issue_id: i64) -> Self {
        self.issue_id = Some(issue_id);
        self
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        id: row.get(0)?,
        created_at: row.get(1)?,
        event_type: row.get(2)?,
        repo_id: row.get(3)?,
        issue_id: row.get(4)?,
        message: row.get(5)?,
    })
}

impl Database {
    pub fn append_event(&self, event: &EventRecord) -> Result<i64, StoreError> {
        self.conn().execute(
            "INSERT INTO events (created_at, event_type, repo_id, issue_id, message) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.created_at,
                event.event_type,
                event.repo_id,
                event.issue_id,
                event.message
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Most recent events, newest first
    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, created_at, event_type, repo_id, issue_id, message FROM events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Events for one issue, newest first
    pub fn events_for_issue(&self, issue_id: i64) -> Result<Vec<EventRecord>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, created_at, event_type, repo_id, issue_id, message FROM events \
             WHERE issue_id = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![issue_id], from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Newest event of a given type for an issue, if any
    pub fn latest_event_of_type(&self, issue_id: i64, event_type: &str) -> Result<Option<EventRecord>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, created_at, event_type, repo_id, issue_id, message FROM events \
             WHERE issue_id = ?1 AND event_type = ?2 ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![issue_id, event_type], from_row)?;
        rows.next().transpose().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::TrackedIssue;
    use crate::repo::WatchedRepo;

    #[test]
    fn test_append_and_query() {
        let db = Database::open_in_memory().unwrap();
        let repo_id = db.upsert_repo(&WatchedRepo::new("o", "r")).unwrap();
        let issue_id = db.insert_issue(&TrackedIssue::new(repo_id, 7, "t")).unwrap();

        db.append_event(&EventRecord::new("DETECTED", "found issue #7").with_issue(issue_id))
            .unwrap();
        db.append_event(
            &EventRecord::new("HUMAN_REJECTION", "Missing null check in parser")
                .with_repo(repo_id)
                .with_issue(issue_id),
        )
        .unwrap();

        let recent = db.recent_events(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, "HUMAN_REJECTION");

        let rejection = db.latest_event_of_type(issue_id, "HUMAN_REJECTION").unwrap().unwrap();
        assert!(rejection.message.contains("null check"));

        assert!(db.latest_event_of_type(issue_id, "MERGED").unwrap().is_none());
    }
}
