//! Append-only token/cost accounting

use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

use crate::db::{Database, StoreError};
use crate::now_ms;

/// Flat per-million-token rates used for the cost estimate (USD)
const INPUT_COST_PER_MTOK: f64 = 3.0;
const OUTPUT_COST_PER_MTOK: f64 = 15.0;

/// Which tool invocation a cost row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostPhase {
    Implementation,
    Review,
}

impl std::fmt::Display for CostPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Implementation => write!(f, "implementation"),
            Self::Review => write!(f, "review"),
        }
    }
}

impl std::str::FromStr for CostPhase {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "implementation" => Ok(Self::Implementation),
            "review" => Ok(Self::Review),
            other => Err(StoreError::InvalidField(format!("cost phase: {}", other))),
        }
    }
}

/// One row per tool invocation; never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// Surrogate id (0 until saved)
    pub id: i64,
    pub issue_id: i64,
    pub iteration_num: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost: f64,
    pub model_used: String,
    pub phase: CostPhase,
    pub created_at: i64,
}

impl CostRecord {
    pub fn new(issue_id: i64, iteration_num: u32, phase: CostPhase, model: impl Into<String>) -> Self {
        Self {
            id: 0,
            issue_id,
            iteration_num,
            input_tokens: 0,
            output_tokens: 0,
            estimated_cost: 0.0,
            model_used: model.into(),
            phase,
            created_at: now_ms(),
        }
    }

    /// Set token counts and derive the cost estimate
    pub fn with_tokens(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.estimated_cost = estimate_cost(input_tokens, output_tokens);
        self
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let phase: String = row.get(7)?;
        Ok(Self {
            id: row.get(0)?,
            issue_id: row.get(1)?,
            iteration_num: row.get(2)?,
            input_tokens: row.get::<_, i64>(3)? as u64,
            output_tokens: row.get::<_, i64>(4)? as u64,
            estimated_cost: row.get(5)?,
            model_used: row.get(6)?,
            phase: phase
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e)))?,
            created_at: row.get(8)?,
        })
    }
}

/// Estimated USD cost for a token pair
pub fn estimate_cost(input_tokens: u64, output_tokens: u64) -> f64 {
    (input_tokens as f64 * INPUT_COST_PER_MTOK + output_tokens as f64 * OUTPUT_COST_PER_MTOK) / 1_000_000.0
}

impl Database {
    pub fn insert_cost(&self, record: &CostRecord) -> Result<i64, StoreError> {
        self.conn().execute(
            "INSERT INTO cost_tracking (issue_id, iteration_num, input_tokens, output_tokens, estimated_cost, \
             model_used, phase, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.issue_id,
                record.iteration_num,
                record.input_tokens as i64,
                record.output_tokens as i64,
                record.estimated_cost,
                record.model_used,
                record.phase.to_string(),
                record.created_at,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn list_costs(&self, issue_id: i64) -> Result<Vec<CostRecord>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, issue_id, iteration_num, input_tokens, output_tokens, estimated_cost, model_used, phase, \
             created_at FROM cost_tracking WHERE issue_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![issue_id], CostRecord::from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Total estimated spend for an issue across all iterations and phases
    pub fn total_cost(&self, issue_id: i64) -> Result<f64, StoreError> {
        let total: f64 = self.conn().query_row(
            "SELECT COALESCE(SUM(estimated_cost), 0.0) FROM cost_tracking WHERE issue_id = ?1",
            params![issue_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::TrackedIssue;
    use crate::repo::WatchedRepo;

    #[test]
    fn test_estimate_cost() {
        // 1M input at $3 + 1M output at $15
        let cost = estimate_cost(1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
        assert_eq!(estimate_cost(0, 0), 0.0);
    }

    #[test]
    fn test_insert_and_total() {
        let db = Database::open_in_memory().unwrap();
        let repo_id = db.upsert_repo(&WatchedRepo::new("o", "r")).unwrap();
        let issue_id = db.insert_issue(&TrackedIssue::new(repo_id, 7, "t")).unwrap();

        let impl_cost =
            CostRecord::new(issue_id, 1, CostPhase::Implementation, "claude-sonnet-4").with_tokens(10_000, 2_000);
        let review_cost = CostRecord::new(issue_id, 1, CostPhase::Review, "claude-opus-4").with_tokens(5_000, 500);
        db.insert_cost(&impl_cost).unwrap();
        db.insert_cost(&review_cost).unwrap();

        let rows = db.list_costs(issue_id).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].phase, CostPhase::Implementation);
        assert_eq!(rows[1].phase, CostPhase::Review);

        let total = db.total_cost(issue_id).unwrap();
        assert!((total - (impl_cost.estimated_cost + review_cost.estimated_cost)).abs() < 1e-9);
    }
}
