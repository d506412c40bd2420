//! Transitive blocker resolution
//!
//! Walks the blocker graph declared in upstream issue bodies and decides
//! whether an issue is runnable. The resolver never errors upward: an
//! upstream fetch failure degrades to "no blockers known for that node"
//! with a warning event, so one flaky call cannot wedge the polling cycle.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use issuestore::{IssueStatus, WatchedRepo, issue::parse_csv_numbers};

use crate::events::{EventLog, types as event_types};
use crate::github::{RepoRef, RepoService};
use crate::state::StateManager;

use super::parser::parse_blocked_by;

/// Result of transitive blocker resolution
#[derive(Debug, Clone, Default)]
pub struct ResolvedDeps {
    /// Every transitive blocker, ascending
    pub all_blockers: Vec<u64>,
    /// Blockers neither closed upstream nor completed locally, ascending
    pub unresolved_blockers: Vec<u64>,
    /// Human-readable description for events and the admin surface
    pub chain: String,
    pub has_cycle: bool,
}

impl ResolvedDeps {
    pub fn is_runnable(&self) -> bool {
        self.unresolved_blockers.is_empty()
    }
}

/// Resolves blocker declarations against upstream and the local store
#[derive(Clone)]
pub struct DepResolver {
    github: Arc<dyn RepoService>,
    state: StateManager,
    events: EventLog,
}

impl DepResolver {
    pub fn new(github: Arc<dyn RepoService>, state: StateManager, events: EventLog) -> Self {
        Self { github, state, events }
    }

    /// Resolve the transitive blockers of `issue_number`.
    ///
    /// `body` is the issue body when the caller already fetched it; pass
    /// None to have the resolver fetch the origin issue itself.
    pub async fn resolve(&self, repo: &WatchedRepo, issue_number: u64, body: Option<&str>) -> ResolvedDeps {
        let repo_ref = RepoRef::new(&repo.owner, &repo.name);

        let direct = match body {
            Some(body) => parse_blocked_by(Some(body)),
            None => self.fetch_node(repo, &repo_ref, issue_number).await.1,
        };
        debug!(issue = issue_number, ?direct, "resolving blockers");

        let mut visited: BTreeSet<u64> = BTreeSet::from([issue_number]);
        let mut all_blockers: BTreeSet<u64> = BTreeSet::new();
        let mut unresolved: BTreeSet<u64> = BTreeSet::new();
        let mut has_cycle = false;

        // Iterative DFS with explicit frames so the ancestor path is exact:
        // a child already on the path is a back edge (cycle), a child merely
        // visited on another branch is a diamond and stays silent.
        let mut on_path: BTreeSet<u64> = BTreeSet::from([issue_number]);
        let mut path: Vec<Frame> = vec![Frame::new(issue_number, direct)];

        while !path.is_empty() {
            let top = path.len() - 1;
            let Some(number) = path[top].next_child() else {
                let finished = path[top].number;
                on_path.remove(&finished);
                path.pop();
                continue;
            };

            if number == issue_number || on_path.contains(&number) {
                has_cycle = true;
                continue;
            }
            if visited.contains(&number) {
                continue;
            }
            visited.insert(number);
            all_blockers.insert(number);

            let (resolved, sub_blockers) = self.blocker_state(repo, &repo_ref, number).await;
            if !resolved {
                unresolved.insert(number);
            }
            on_path.insert(number);
            path.push(Frame::new(number, sub_blockers));
        }

        let deps = ResolvedDeps {
            all_blockers: all_blockers.into_iter().collect(),
            unresolved_blockers: unresolved.into_iter().collect(),
            chain: String::new(),
            has_cycle,
        };
        let chain = describe_chain(issue_number, &deps);
        ResolvedDeps { chain, ..deps }
    }

    /// True iff every number in the CSV is closed upstream or completed
    /// locally; empty and absent lists are trivially resolved
    pub async fn all_blockers_resolved(&self, repo: &WatchedRepo, csv: Option<&str>) -> bool {
        let blockers = parse_csv_numbers(csv.unwrap_or(""));
        let repo_ref = RepoRef::new(&repo.owner, &repo.name);
        for number in blockers {
            let (resolved, _) = self.blocker_state(repo, &repo_ref, number).await;
            if !resolved {
                return false;
            }
        }
        true
    }

    /// (resolved?, sub-blockers) for one node
    async fn blocker_state(&self, repo: &WatchedRepo, repo_ref: &RepoRef, number: u64) -> (bool, Vec<u64>) {
        let (closed_upstream, sub_blockers) = self.fetch_node(repo, repo_ref, number).await;
        if closed_upstream {
            return (true, sub_blockers);
        }
        let completed_locally = matches!(
            self.state.find_issue(repo.id, number).await,
            Ok(Some(issue)) if issue.status == IssueStatus::Completed
        );
        (completed_locally, sub_blockers)
    }

    /// (closed?, declared blockers) from upstream; degrades on fetch failure
    async fn fetch_node(&self, repo: &WatchedRepo, repo_ref: &RepoRef, number: u64) -> (bool, Vec<u64>) {
        match self.github.get_issue(repo_ref, number).await {
            Ok(issue) => (issue.is_closed(), parse_blocked_by(issue.body.as_deref())),
            Err(e) => {
                warn!(repo = %repo_ref, issue = number, error = %e, "blocker fetch failed, assuming no blockers");
                self.events
                    .record(
                        event_types::UPSTREAM_DEGRADED,
                        Some(repo.id),
                        None,
                        &format!("no blockers known for #{}: {}", number, e),
                    )
                    .await;
                (false, Vec::new())
            }
        }
    }
}

/// One DFS frame: a node and its not-yet-expanded blockers
struct Frame {
    number: u64,
    children: Vec<u64>,
    next: usize,
}

impl Frame {
    fn new(number: u64, children: Vec<u64>) -> Self {
        Self {
            number,
            children,
            next: 0,
        }
    }

    fn next_child(&mut self) -> Option<u64> {
        let child = self.children.get(self.next).copied();
        if child.is_some() {
            self.next += 1;
        }
        child
    }
}

fn describe_chain(origin: u64, deps: &ResolvedDeps) -> String {
    let mut chain = if deps.all_blockers.is_empty() {
        format!("#{} has no blockers", origin)
    } else {
        let refs: Vec<String> = deps.all_blockers.iter().map(|n| format!("#{}", n)).collect();
        format!("#{} blocked by {}", origin, refs.join(", "))
    };
    if !deps.unresolved_blockers.is_empty() {
        let refs: Vec<String> = deps.unresolved_blockers.iter().map(|n| format!("#{}", n)).collect();
        chain.push_str(&format!(" (unresolved: {})", refs.join(", ")));
    }
    if deps.has_cycle {
        chain.push_str(" [dependency cycle detected]");
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{BranchDiff, CiStatus, GithubError, Issue, PullRequest};
    use async_trait::async_trait;
    use issuestore::Database;
    use std::collections::HashMap;
    use std::path::Path;

    /// Upstream fake: a map of issue number -> (state, body)
    struct FakeUpstream {
        issues: HashMap<u64, (&'static str, &'static str)>,
    }

    #[async_trait]
    impl RepoService for FakeUpstream {
        async fn list_open_issues(&self, _: &RepoRef, _: &str) -> Result<Vec<Issue>, GithubError> {
            Ok(Vec::new())
        }

        async fn get_issue(&self, _: &RepoRef, number: u64) -> Result<Issue, GithubError> {
            let (state, body) = self
                .issues
                .get(&number)
                .ok_or_else(|| GithubError::NotFound(format!("issue {}", number)))?;
            Ok(Issue {
                number,
                title: format!("issue {}", number),
                body: Some(body.to_string()),
                state: state.to_string(),
                labels: Vec::new(),
                pull_request: None,
            })
        }

        async fn add_labels(&self, _: &RepoRef, _: u64, _: &[&str]) -> Result<(), GithubError> {
            Ok(())
        }
        async fn remove_label(&self, _: &RepoRef, _: u64, _: &str) -> Result<(), GithubError> {
            Ok(())
        }
        async fn add_comment(&self, _: &RepoRef, _: u64, _: &str) -> Result<(), GithubError> {
            Ok(())
        }
        async fn close_issue(&self, _: &RepoRef, _: u64) -> Result<(), GithubError> {
            Ok(())
        }
        async fn create_or_update_pull_request(
            &self,
            _: &RepoRef,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<PullRequest, GithubError> {
            unimplemented!("not exercised")
        }
        async fn merge_pull_request(&self, _: &RepoRef, _: u64) -> Result<(), GithubError> {
            Ok(())
        }
        async fn get_ci_status(&self, _: &RepoRef, _: &str) -> Result<CiStatus, GithubError> {
            Ok(CiStatus::NotApplicable)
        }
        async fn prepare_workdir(&self, _: &RepoRef, _: &str, _: &str, _: &Path) -> Result<(), GithubError> {
            Ok(())
        }
        async fn push_branch(&self, _: &RepoRef, _: &str, _: &Path, _: &str) -> Result<bool, GithubError> {
            Ok(true)
        }
        async fn diff_against_base(&self, _: &RepoRef, _: &str, _: &Path) -> Result<BranchDiff, GithubError> {
            Ok(BranchDiff::default())
        }
    }

    async fn resolver_with(issues: HashMap<u64, (&'static str, &'static str)>) -> (DepResolver, StateManager, WatchedRepo) {
        let state = StateManager::spawn_with(Database::open_in_memory().unwrap());
        let mut repo = WatchedRepo::new("octocat", "hello-world");
        repo.id = state.upsert_repo(repo.clone()).await.unwrap();
        let events = EventLog::new(state.clone());
        let resolver = DepResolver::new(Arc::new(FakeUpstream { issues }), state.clone(), events);
        (resolver, state, repo)
    }

    #[tokio::test]
    async fn test_no_blockers_is_runnable() {
        let (resolver, _, repo) = resolver_with(HashMap::new()).await;
        let deps = resolver.resolve(&repo, 7, Some("just a description")).await;
        assert!(deps.is_runnable());
        assert!(deps.all_blockers.is_empty());
        assert!(!deps.has_cycle);
    }

    #[tokio::test]
    async fn test_open_blockers_are_unresolved() {
        let issues = HashMap::from([(10, ("open", "")), (15, ("open", ""))]);
        let (resolver, _, repo) = resolver_with(issues).await;

        let deps = resolver.resolve(&repo, 20, Some("**Blocked by:** #10, #15")).await;
        assert_eq!(deps.all_blockers, vec![10, 15]);
        assert_eq!(deps.unresolved_blockers, vec![10, 15]);
        assert!(!deps.is_runnable());
    }

    #[tokio::test]
    async fn test_closed_upstream_blocker_is_resolved() {
        let issues = HashMap::from([(10, ("closed", "")), (15, ("open", ""))]);
        let (resolver, _, repo) = resolver_with(issues).await;

        let deps = resolver.resolve(&repo, 20, Some("**Blocked by:** #10, #15")).await;
        assert_eq!(deps.all_blockers, vec![10, 15]);
        assert_eq!(deps.unresolved_blockers, vec![15]);
    }

    #[tokio::test]
    async fn test_locally_completed_blocker_is_resolved() {
        let issues = HashMap::from([(10, ("open", ""))]);
        let (resolver, state, repo) = resolver_with(issues).await;

        let mut blocker = issuestore::TrackedIssue::new(repo.id, 10, "done earlier");
        blocker.set_status(IssueStatus::Completed);
        state.create_issue(blocker).await.unwrap();

        let deps = resolver.resolve(&repo, 20, Some("**Blocked by:** #10")).await;
        assert!(deps.unresolved_blockers.is_empty());
        assert!(deps.is_runnable());
    }

    #[tokio::test]
    async fn test_transitive_blockers_are_walked() {
        // 20 -> 15 -> 10, all open
        let issues = HashMap::from([(15, ("open", "**Blocked by:** #10")), (10, ("open", ""))]);
        let (resolver, _, repo) = resolver_with(issues).await;

        let deps = resolver.resolve(&repo, 20, Some("**Blocked by:** #15")).await;
        assert_eq!(deps.all_blockers, vec![10, 15]);
        assert_eq!(deps.unresolved_blockers, vec![10, 15]);
    }

    #[tokio::test]
    async fn test_two_node_cycle() {
        // 10 <-> 5
        let issues = HashMap::from([(5, ("open", "**Blocked by:** #10")), (10, ("open", "**Blocked by:** #5"))]);
        let (resolver, _, repo) = resolver_with(issues).await;

        let deps = resolver.resolve(&repo, 10, Some("**Blocked by:** #5")).await;
        assert!(deps.has_cycle);
        assert_eq!(deps.all_blockers, vec![5]);
        assert_eq!(deps.unresolved_blockers, vec![5]);
        assert!(deps.chain.contains("cycle"));
    }

    #[tokio::test]
    async fn test_indirect_cycle_not_touching_origin() {
        // 20 -> 5, 5 -> 7, 7 -> 5: the back edge closes on #5, not on the
        // origin, and must still flag a cycle.
        let issues = HashMap::from([(5, ("open", "**Blocked by:** #7")), (7, ("open", "**Blocked by:** #5"))]);
        let (resolver, _, repo) = resolver_with(issues).await;

        let deps = resolver.resolve(&repo, 20, Some("**Blocked by:** #5")).await;
        assert!(deps.has_cycle);
        assert_eq!(deps.all_blockers, vec![5, 7]);
        assert_eq!(deps.unresolved_blockers, vec![5, 7]);
        assert!(deps.chain.contains("cycle"));
    }

    #[tokio::test]
    async fn test_diamond_is_not_a_cycle() {
        // 20 -> {5, 7}, both -> 3: #3 is re-visited on a second branch but
        // never while on the path.
        let issues = HashMap::from([
            (5, ("open", "**Blocked by:** #3")),
            (7, ("open", "**Blocked by:** #3")),
            (3, ("open", "")),
        ]);
        let (resolver, _, repo) = resolver_with(issues).await;

        let deps = resolver.resolve(&repo, 20, Some("**Blocked by:** #5, #7")).await;
        assert!(!deps.has_cycle);
        assert_eq!(deps.all_blockers, vec![3, 5, 7]);
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_with_event() {
        // #10 is unknown upstream: resolver must not error, and the node is
        // unresolved (we cannot prove it closed) with no sub-blockers.
        let (resolver, state, repo) = resolver_with(HashMap::new()).await;

        let deps = resolver.resolve(&repo, 20, Some("**Blocked by:** #10")).await;
        assert_eq!(deps.unresolved_blockers, vec![10]);

        let events = state.recent_events(5).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == event_types::UPSTREAM_DEGRADED));
    }

    #[tokio::test]
    async fn test_all_blockers_resolved_on_empty_and_null() {
        let (resolver, _, repo) = resolver_with(HashMap::new()).await;
        assert!(resolver.all_blockers_resolved(&repo, Some("")).await);
        assert!(resolver.all_blockers_resolved(&repo, None).await);
    }

    #[tokio::test]
    async fn test_all_blockers_resolved_mixed() {
        let issues = HashMap::from([(10, ("closed", "")), (15, ("open", ""))]);
        let (resolver, _, repo) = resolver_with(issues).await;
        assert!(resolver.all_blockers_resolved(&repo, Some("10")).await);
        assert!(!resolver.all_blockers_resolved(&repo, Some("10,15")).await);
    }
}
