//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use issuestore::{CostRecord, EventRecord, IssueStatus, IterationRecord, TrackedIssue, WatchedRepo};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("channel error")]
    ChannelError,
}

impl From<issuestore::StoreError> for StateError {
    fn from(err: issuestore::StoreError) -> Self {
        match err {
            issuestore::StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Watched repo operations
    UpsertRepo {
        repo: WatchedRepo,
        reply: oneshot::Sender<StateResponse<i64>>,
    },
    GetRepo {
        id: i64,
        reply: oneshot::Sender<StateResponse<Option<WatchedRepo>>>,
    },
    ListRepos {
        reply: oneshot::Sender<StateResponse<Vec<WatchedRepo>>>,
    },

    // Tracked issue operations
    CreateIssue {
        issue: TrackedIssue,
        reply: oneshot::Sender<StateResponse<i64>>,
    },
    GetIssue {
        id: i64,
        reply: oneshot::Sender<StateResponse<Option<TrackedIssue>>>,
    },
    FindIssue {
        repo_id: i64,
        number: u64,
        reply: oneshot::Sender<StateResponse<Option<TrackedIssue>>>,
    },
    UpdateIssue {
        issue: TrackedIssue,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    UpdateIssueIfStatus {
        issue: TrackedIssue,
        expected: IssueStatus,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    ListIssuesByStatus {
        status: IssueStatus,
        reply: oneshot::Sender<StateResponse<Vec<TrackedIssue>>>,
    },
    CountIssuesByStatus {
        reply: oneshot::Sender<StateResponse<Vec<(String, u64)>>>,
    },

    // Iteration operations
    CreateIteration {
        record: IterationRecord,
        reply: oneshot::Sender<StateResponse<i64>>,
    },
    UpdateIteration {
        record: IterationRecord,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListIterations {
        issue_id: i64,
        reply: oneshot::Sender<StateResponse<Vec<IterationRecord>>>,
    },
    LatestIteration {
        issue_id: i64,
        reply: oneshot::Sender<StateResponse<Option<IterationRecord>>>,
    },

    // Cost operations
    RecordCost {
        record: CostRecord,
        reply: oneshot::Sender<StateResponse<i64>>,
    },

    // Event operations
    AppendEvent {
        event: EventRecord,
        reply: oneshot::Sender<StateResponse<i64>>,
    },
    RecentEvents {
        limit: usize,
        reply: oneshot::Sender<StateResponse<Vec<EventRecord>>>,
    },
    LatestEventOfType {
        issue_id: i64,
        event_type: String,
        reply: oneshot::Sender<StateResponse<Option<EventRecord>>>,
    },

    // Shutdown
    Shutdown,
}
