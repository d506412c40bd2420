//! Notification bus - broadcast channel for operator notices
//!
//! Components hold cheap [`Notifier`] handles; consumers (the daemon's
//! notice logger, an admin surface) subscribe. Delivery is fire-and-forget:
//! no subscribers means the notice is dropped, which is fine because the
//! durable record lives in the event log.

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::types::{Notice, NoticeLevel};

/// Default channel capacity (notices)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Central bus for operator notices
pub struct NotificationBus {
    tx: broadcast::Sender<Notice>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Create an emitter handle for components
    pub fn notifier(&self) -> Notifier {
        Notifier { tx: self.tx.clone() }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for emitting notices without owning the bus
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn emit(&self, notice: Notice) {
        debug!(level = %notice.level, message = %notice.message, "notice");
        let _ = self.tx.send(notice);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Notice::new(NoticeLevel::Info, message));
    }

    pub fn warn_for(&self, repo: &str, issue_number: u64, message: impl Into<String>) {
        let mut notice = Notice::new(NoticeLevel::Warn, message);
        notice.repo = Some(repo.to_string());
        notice.issue_number = Some(issue_number);
        self.emit(notice);
    }

    pub fn error_for(&self, repo: &str, issue_number: u64, message: impl Into<String>) {
        let mut notice = Notice::new(NoticeLevel::Error, message);
        notice.repo = Some(repo.to_string());
        notice.issue_number = Some(issue_number);
        self.emit(notice);
    }
}

/// Drain the bus and surface escalating notices in the daemon log.
///
/// This is the seam where an external operator channel would attach; the
/// daemon ships with the log sink only.
pub fn spawn_notice_logger(bus: &NotificationBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notice) if notice.escalates() => {
                    let repo = notice.repo.as_deref().unwrap_or("-");
                    let issue = notice.issue_number.map(|n| n.to_string()).unwrap_or_default();
                    match notice.level {
                        NoticeLevel::Error => error!(repo, issue, "{}", notice.message),
                        _ => warn!(repo, issue, "{}", notice.message),
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "notice logger lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
