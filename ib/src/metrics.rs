//! Process-wide counters
//!
//! Created once at startup and injected as `Arc<Metrics>`; components never
//! reach for a global.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Metrics {
    pub issues_dispatched: AtomicU64,
    pub iterations_run: AtomicU64,
    pub reviews_run: AtomicU64,
    pub merges: AtomicU64,
    pub escalations: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            issues_dispatched: self.issues_dispatched.load(Ordering::Relaxed),
            iterations_run: self.iterations_run.load(Ordering::Relaxed),
            reviews_run: self.reviews_run.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values for the status CLI
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub issues_dispatched: u64,
    pub iterations_run: u64,
    pub reviews_run: u64,
    pub merges: u64,
    pub escalations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = Metrics::new();
        metrics.issues_dispatched.fetch_add(3, Ordering::Relaxed);
        metrics.merges.fetch_add(1, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.issues_dispatched, 3);
        assert_eq!(snap.merges, 1);
        assert_eq!(snap.escalations, 0);
    }
}
