//! Per-issue exclusion locks
//!
//! At most one workflow may act on a `(repo_id, issue_number)` at a time.
//! A sharded registry of in-flight keys with RAII release keeps the
//! critical sections synchronous, so no lock is ever held across an await.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

const SHARDS: usize = 16;

type IssueKey = (i64, u64);

/// Sharded registry of issues with a workflow in flight
#[derive(Clone)]
pub struct IssueLocks {
    shards: Arc<Vec<Mutex<HashSet<IssueKey>>>>,
}

impl IssueLocks {
    pub fn new() -> Self {
        Self {
            shards: Arc::new((0..SHARDS).map(|_| Mutex::new(HashSet::new())).collect()),
        }
    }

    fn shard(&self, key: &IssueKey) -> &Mutex<HashSet<IssueKey>> {
        let index = (key.0 as u64 ^ key.1) as usize % SHARDS;
        &self.shards[index]
    }

    /// Try to claim the issue; None when a workflow already holds it
    pub fn try_acquire(&self, repo_id: i64, issue_number: u64) -> Option<IssueGuard> {
        let key = (repo_id, issue_number);
        let mut held = self.shard(&key).lock().expect("lock shard poisoned");
        if !held.insert(key) {
            debug!(repo_id, issue_number, "issue already locked");
            return None;
        }
        Some(IssueGuard {
            locks: self.clone(),
            key,
        })
    }

    fn release(&self, key: &IssueKey) {
        let mut held = self.shard(key).lock().expect("lock shard poisoned");
        held.remove(key);
    }
}

impl Default for IssueLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the issue on drop
pub struct IssueGuard {
    locks: IssueLocks,
    key: IssueKey,
}

impl Drop for IssueGuard {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let locks = IssueLocks::new();
        let guard = locks.try_acquire(1, 7);
        assert!(guard.is_some());
        assert!(locks.try_acquire(1, 7).is_none());
    }

    #[test]
    fn test_drop_releases() {
        let locks = IssueLocks::new();
        {
            let _guard = locks.try_acquire(1, 7).unwrap();
        }
        assert!(locks.try_acquire(1, 7).is_some());
    }

    #[test]
    fn test_distinct_issues_are_independent() {
        let locks = IssueLocks::new();
        let _a = locks.try_acquire(1, 7).unwrap();
        assert!(locks.try_acquire(1, 8).is_some());
        assert!(locks.try_acquire(2, 7).is_some());
    }
}
