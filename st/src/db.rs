//! Database handle and schema migration

use std::fs;
use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid field value: {0}")]
    InvalidField(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Schema, applied idempotently on open.
///
/// Timestamps are Unix milliseconds. Enum-valued columns store the
/// snake_case rendering of the corresponding Rust enum.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS watched_repos (
    id                      INTEGER PRIMARY KEY,
    owner                   TEXT NOT NULL,
    name                    TEXT NOT NULL,
    default_branch          TEXT NOT NULL DEFAULT 'main',
    mode                    TEXT NOT NULL DEFAULT 'autonomous',
    max_iterations          INTEGER NOT NULL DEFAULT 5,
    max_review_iterations   INTEGER NOT NULL DEFAULT 2,
    ci_enabled              INTEGER NOT NULL DEFAULT 1,
    ci_timeout_minutes      INTEGER NOT NULL DEFAULT 15,
    auto_merge              INTEGER NOT NULL DEFAULT 0,
    security_review_enabled INTEGER NOT NULL DEFAULT 0,
    allowed_paths           TEXT,
    created_at              INTEGER NOT NULL,
    updated_at              INTEGER NOT NULL,
    UNIQUE(owner, name)
);

CREATE TABLE IF NOT EXISTS tracked_issues (
    id                       INTEGER PRIMARY KEY,
    repo_id                  INTEGER NOT NULL REFERENCES watched_repos(id),
    issue_number             INTEGER NOT NULL,
    issue_title              TEXT NOT NULL DEFAULT '',
    status                   TEXT NOT NULL DEFAULT 'pending',
    current_iteration        INTEGER NOT NULL DEFAULT 0,
    current_review_iteration INTEGER NOT NULL DEFAULT 0,
    branch_name              TEXT,
    current_phase            TEXT,
    cooldown_until           INTEGER,
    blocked_by_issues        TEXT NOT NULL DEFAULT '',
    created_at               INTEGER NOT NULL,
    updated_at               INTEGER NOT NULL,
    UNIQUE(repo_id, issue_number)
);
CREATE INDEX IF NOT EXISTS idx_tracked_issues_status ON tracked_issues(status);

CREATE TABLE IF NOT EXISTS iterations (
    id              INTEGER PRIMARY KEY,
    issue_id        INTEGER NOT NULL REFERENCES tracked_issues(id),
    iteration_num   INTEGER NOT NULL,
    agent_output    TEXT,
    self_assessment TEXT,
    ci_result       TEXT,
    diff            TEXT,
    review_json     TEXT,
    review_passed   INTEGER,
    review_model    TEXT,
    started_at      INTEGER NOT NULL,
    completed_at    INTEGER
);
CREATE INDEX IF NOT EXISTS idx_iterations_issue ON iterations(issue_id);

CREATE TABLE IF NOT EXISTS cost_tracking (
    id             INTEGER PRIMARY KEY,
    issue_id       INTEGER NOT NULL REFERENCES tracked_issues(id),
    iteration_num  INTEGER NOT NULL,
    input_tokens   INTEGER NOT NULL,
    output_tokens  INTEGER NOT NULL,
    estimated_cost REAL NOT NULL,
    model_used     TEXT NOT NULL,
    phase          TEXT NOT NULL,
    created_at     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id         INTEGER PRIMARY KEY,
    created_at INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    repo_id    INTEGER,
    issue_id   INTEGER,
    message    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_issue ON events(issue_id);
"#;

/// Owning handle to the SQLite database.
///
/// Single-writer by design: the daemon wraps this in an actor task and all
/// components go through that actor, so no internal locking is needed here.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and apply the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "opened issue store");
        Ok(Self { conn })
    }

    /// In-memory database for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        debug!("opened in-memory issue store");
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
