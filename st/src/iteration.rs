//! Append-only per-iteration records

use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

use crate::db::{Database, StoreError};
use crate::now_ms;

/// One complete attempt at (implementation -> CI -> optional review).
///
/// Rows are append-only: a new row per attempt, fields filled in as the
/// iteration progresses, never rewritten after `completed_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Surrogate id (0 until saved)
    pub id: i64,
    pub issue_id: i64,
    pub iteration_num: u32,
    /// Final text emitted by the code-generation tool
    pub agent_output: Option<String>,
    /// The tool's own verdict on whether the change satisfies the issue
    pub self_assessment: Option<String>,
    /// "passed" | "failed" | "timeout"
    pub ci_result: Option<String>,
    pub diff: Option<String>,
    /// Raw reviewer verdict, stored for audit even when unparseable
    pub review_json: Option<String>,
    pub review_passed: Option<bool>,
    pub review_model: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

impl IterationRecord {
    pub fn new(issue_id: i64, iteration_num: u32) -> Self {
        Self {
            id: 0,
            issue_id,
            iteration_num,
            agent_output: None,
            self_assessment: None,
            ci_result: None,
            diff: None,
            review_json: None,
            review_passed: None,
            review_model: None,
            started_at: now_ms(),
            completed_at: None,
        }
    }

    pub fn mark_completed(&mut self) {
        self.completed_at = Some(now_ms());
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            issue_id: row.get(1)?,
            iteration_num: row.get(2)?,
            agent_output: row.get(3)?,
            self_assessment: row.get(4)?,
            ci_result: row.get(5)?,
            diff: row.get(6)?,
            review_json: row.get(7)?,
            review_passed: row.get(8)?,
            review_model: row.get(9)?,
            started_at: row.get(10)?,
            completed_at: row.get(11)?,
        })
    }
}

const ITERATION_COLUMNS: &str = "id, issue_id, iteration_num, agent_output, self_assessment, ci_result, diff, \
                                 review_json, review_passed, review_model, started_at, completed_at";

impl Database {
    pub fn insert_iteration(&self, record: &IterationRecord) -> Result<i64, StoreError> {
        self.conn().execute(
            "INSERT INTO iterations (issue_id, iteration_num, agent_output, self_assessment, ci_result, diff, \
             review_json, review_passed, review_model, started_at, completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.issue_id,
                record.iteration_num,
                record.agent_output,
                record.self_assessment,
                record.ci_result,
                record.diff,
                record.review_json,
                record.review_passed,
                record.review_model,
                record.started_at,
                record.completed_at,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn update_iteration(&self, record: &IterationRecord) -> Result<(), StoreError> {
        let n = self.conn().execute(
            "UPDATE iterations SET agent_output = ?2, self_assessment = ?3, ci_result = ?4, diff = ?5, \
             review_json = ?6, review_passed = ?7, review_model = ?8, completed_at = ?9 WHERE id = ?1",
            params![
                record.id,
                record.agent_output,
                record.self_assessment,
                record.ci_result,
                record.diff,
                record.review_json,
                record.review_passed,
                record.review_model,
                record.completed_at,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("iteration {}", record.id)));
        }
        Ok(())
    }

    /// Iterations for an issue, newest first
    pub fn list_iterations(&self, issue_id: i64) -> Result<Vec<IterationRecord>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM iterations WHERE issue_id = ?1 ORDER BY iteration_num DESC",
            ITERATION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![issue_id], IterationRecord::from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn latest_iteration(&self, issue_id: i64) -> Result<Option<IterationRecord>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM iterations WHERE issue_id = ?1 ORDER BY iteration_num DESC LIMIT 1",
            ITERATION_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![issue_id], IterationRecord::from_row)?;
        rows.next().transpose().map_err(Into::into)
    }
}
