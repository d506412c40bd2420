//! Event tags and operator notices
//!
//! Durable audit events carry a free-form string tag; the well-known tags
//! live here so call sites and tests agree on spelling. Notices are the
//! in-process, non-durable operator channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// === Well-known audit event tags ===

pub const DETECTED: &str = "DETECTED";
pub const DISPATCHED: &str = "DISPATCHED";
pub const ITERATION_START: &str = "ITERATION_START";
pub const ITERATION_SUCCESS: &str = "ITERATION_SUCCESS";
pub const MERGED: &str = "MERGED";
pub const MAX_ITERATIONS_REACHED: &str = "MAX_ITERATIONS_REACHED";
pub const MAX_REVIEW_ITERATIONS_REACHED: &str = "MAX_REVIEW_ITERATIONS_REACHED";
pub const HUMAN_REJECTION: &str = "HUMAN_REJECTION";
pub const DEPENDENCY_CYCLE: &str = "DEPENDENCY_CYCLE";
pub const CANCELLED: &str = "CANCELLED";
pub const REPO_GONE: &str = "REPO_GONE";
pub const BRANCH_SAFETY_VIOLATION: &str = "BRANCH_SAFETY_VIOLATION";
pub const UPSTREAM_DEGRADED: &str = "UPSTREAM_DEGRADED";

/// Severity of an operator notice; only Warn/Error escalate outward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A human-visible notice, delivered over the in-process bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub level: NoticeLevel,
    pub message: String,
    /// `owner/name` when the notice concerns one repo
    pub repo: Option<String>,
    pub issue_number: Option<u64>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            repo: None,
            issue_number: None,
        }
    }

    /// Should this notice escalate beyond the log?
    pub fn escalates(&self) -> bool {
        self.level >= NoticeLevel::Warn
    }
}
