//! issuestore - SQLite persistence for IssueBot
//!
//! One table per entity, a thin repository surface (save / find / named
//! queries returning plain records), and no implicit mutation: `updated_at`
//! is stamped explicitly by the entity mutators, never by the data layer.
//!
//! # Modules
//!
//! - [`db`] - connection handling, schema migration, [`StoreError`]
//! - [`repo`] - watched repositories and their per-repo options
//! - [`issue`] - tracked issues and the workflow status vocabulary
//! - [`iteration`] - append-only per-iteration records
//! - [`cost`] - append-only token/cost accounting
//! - [`event`] - append-only audit log

pub mod cli;
pub mod cost;
pub mod db;
pub mod event;
pub mod issue;
pub mod iteration;
pub mod repo;

pub use cost::{CostPhase, CostRecord};
pub use db::{Database, StoreError};
pub use event::EventRecord;
pub use issue::{IssueStatus, TrackedIssue, WorkflowPhase};
pub use iteration::IterationRecord;
pub use repo::{RepoMode, WatchedRepo};

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
