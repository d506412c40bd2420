//! WatchedRepo entity and queries

use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

use crate::db::{Database, StoreError};
use crate::now_ms;

/// Merge policy for a watched repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepoMode {
    /// Merges proceed without human approval when all gates pass
    #[default]
    Autonomous,
    /// Every change waits in AWAITING_APPROVAL for a human decision
    ApprovalGated,
}

impl std::fmt::Display for RepoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Autonomous => write!(f, "autonomous"),
            Self::ApprovalGated => write!(f, "approval_gated"),
        }
    }
}

impl std::str::FromStr for RepoMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "autonomous" => Ok(Self::Autonomous),
            "approval_gated" => Ok(Self::ApprovalGated),
            other => Err(StoreError::InvalidField(format!("repo mode: {}", other))),
        }
    }
}

/// A repository the daemon polls for `agent-ready` issues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedRepo {
    /// Surrogate id (0 until saved)
    pub id: i64,
    pub owner: String,
    pub name: String,
    /// Branch pull requests target; also the branch the engine refuses to push to
    pub default_branch: String,
    pub mode: RepoMode,
    /// Implementation iteration budget per issue attempt
    pub max_iterations: u32,
    /// Independent-review iteration budget per issue attempt
    pub max_review_iterations: u32,
    pub ci_enabled: bool,
    pub ci_timeout_minutes: u32,
    pub auto_merge: bool,
    /// Enables the independent reviewer pass
    pub security_review_enabled: bool,
    /// Comma-separated path prefixes the code-generation tool may touch
    pub allowed_paths: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl WatchedRepo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: 0,
            owner: owner.into(),
            name: name.into(),
            default_branch: "main".to_string(),
            mode: RepoMode::Autonomous,
            max_iterations: 5,
            max_review_iterations: 2,
            ci_enabled: true,
            ci_timeout_minutes: 15,
            auto_merge: false,
            security_review_enabled: false,
            allowed_paths: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `owner/name` as used in upstream API paths
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Allowed paths as a list; empty when unrestricted
    pub fn allowed_paths_list(&self) -> Vec<String> {
        self.allowed_paths
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mode: String = row.get(4)?;
        Ok(Self {
            id: row.get(0)?,
            owner: row.get(1)?,
            name: row.get(2)?,
            default_branch: row.get(3)?,
            mode: mode
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?,
            max_iterations: row.get(5)?,
            max_review_iterations: row.get(6)?,
            ci_enabled: row.get(7)?,
            ci_timeout_minutes: row.get(8)?,
            auto_merge: row.get(9)?,
            security_review_enabled: row.get(10)?,
            allowed_paths: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

const REPO_COLUMNS: &str = "id, owner, name, default_branch, mode, max_iterations, max_review_iterations, \
                            ci_enabled, ci_timeout_minutes, auto_merge, security_review_enabled, allowed_paths, \
                            created_at, updated_at";

impl Database {
    /// Insert or update a watched repo by (owner, name); returns its id
    pub fn upsert_repo(&self, repo: &WatchedRepo) -> Result<i64, StoreError> {
        self.conn().execute(
            "INSERT INTO watched_repos (owner, name, default_branch, mode, max_iterations, max_review_iterations, \
             ci_enabled, ci_timeout_minutes, auto_merge, security_review_enabled, allowed_paths, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
             ON CONFLICT(owner, name) DO UPDATE SET \
             default_branch = excluded.default_branch, mode = excluded.mode, \
             max_iterations = excluded.max_iterations, max_review_iterations = excluded.max_review_iterations, \
             ci_enabled = excluded.ci_enabled, ci_timeout_minutes = excluded.ci_timeout_minutes, \
             auto_merge = excluded.auto_merge, security_review_enabled = excluded.security_review_enabled, \
             allowed_paths = excluded.allowed_paths, updated_at = excluded.updated_at",
            params![
                repo.owner,
                repo.name,
                repo.default_branch,
                repo.mode.to_string(),
                repo.max_iterations,
                repo.max_review_iterations,
                repo.ci_enabled,
                repo.ci_timeout_minutes,
                repo.auto_merge,
                repo.security_review_enabled,
                repo.allowed_paths,
                repo.created_at,
                now_ms(),
            ],
        )?;
        let id: i64 = self.conn().query_row(
            "SELECT id FROM watched_repos WHERE owner = ?1 AND name = ?2",
            params![repo.owner, repo.name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn find_repo(&self, id: i64) -> Result<Option<WatchedRepo>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {} FROM watched_repos WHERE id = ?1", REPO_COLUMNS))?;
        let mut rows = stmt.query_map(params![id], WatchedRepo::from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn find_repo_by_name(&self, owner: &str, name: &str) -> Result<Option<WatchedRepo>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM watched_repos WHERE owner = ?1 AND name = ?2",
            REPO_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![owner, name], WatchedRepo::from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// All watched repos, stable order
    pub fn list_repos(&self) -> Result<Vec<WatchedRepo>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {} FROM watched_repos ORDER BY id", REPO_COLUMNS))?;
        let rows = stmt.query_map([], WatchedRepo::from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_find() {
        let db = Database::open_in_memory().unwrap();
        let mut repo = WatchedRepo::new("octocat", "hello-world");
        repo.auto_merge = true;

        let id = db.upsert_repo(&repo).unwrap();
        assert!(id > 0);

        let found = db.find_repo_by_name("octocat", "hello-world").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(found.auto_merge);
        assert_eq!(found.mode, RepoMode::Autonomous);
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let db = Database::open_in_memory().unwrap();
        let mut repo = WatchedRepo::new("octocat", "hello-world");
        let id = db.upsert_repo(&repo).unwrap();

        repo.max_iterations = 9;
        repo.mode = RepoMode::ApprovalGated;
        let id2 = db.upsert_repo(&repo).unwrap();
        assert_eq!(id, id2);

        let found = db.find_repo(id).unwrap().unwrap();
        assert_eq!(found.max_iterations, 9);
        assert_eq!(found.mode, RepoMode::ApprovalGated);
        assert_eq!(db.list_repos().unwrap().len(), 1);
    }

    #[test]
    fn test_allowed_paths_list() {
        let mut repo = WatchedRepo::new("a", "b");
        assert!(repo.allowed_paths_list().is_empty());

        repo.allowed_paths = Some("src/, docs/api, ".to_string());
        assert_eq!(repo.allowed_paths_list(), vec!["src/", "docs/api"]);
    }
}
