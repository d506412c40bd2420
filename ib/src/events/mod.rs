//! Event log and operator notifications
//!
//! Two channels with different durability: [`EventLog`] appends structured
//! records to the store (the audit trail), the [`bus`] broadcasts transient
//! operator notices in-process.

pub mod bus;
pub mod types;

pub use bus::{NotificationBus, Notifier, spawn_notice_logger};
pub use types::{Notice, NoticeLevel};

use issuestore::EventRecord;
use tracing::warn;

use crate::redact;
use crate::state::StateManager;

/// Append-only sink for durable audit events.
///
/// Recording is best-effort by design: a store failure is logged and
/// swallowed so an audit write can never take down the workflow that
/// produced it.
#[derive(Clone)]
pub struct EventLog {
    state: StateManager,
}

impl EventLog {
    pub fn new(state: StateManager) -> Self {
        Self { state }
    }

    /// Append an event; the message passes through the redactor first
    pub async fn record(&self, event_type: &str, repo_id: Option<i64>, issue_id: Option<i64>, message: &str) {
        let mut event = EventRecord::new(event_type, redact::sanitize(message));
        event.repo_id = repo_id;
        event.issue_id = issue_id;
        if let Err(e) = self.state.append_event(event).await {
            warn!(event_type, error = %e, "failed to append audit event");
        }
    }
}
