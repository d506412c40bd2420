//! Integration tests for IssueBot
//!
//! These drive the polling service and workflow engine end-to-end against
//! in-memory mock adapters: a scriptable upstream, a recording
//! code-generation tool, and a scriptable reviewer.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use issuebot::events::{EventLog, NotificationBus, types as event_types};
use issuebot::github::{BranchDiff, CiStatus, GithubError, Issue, Label, PullRequest, RepoRef, RepoService};
use issuebot::metrics::Metrics;
use issuebot::poller::{PollService, PollServiceConfig};
use issuebot::state::StateManager;
use issuebot::tools::{
    CodegenOutcome, CodegenTool, ReviewOutcome, ReviewVerdict, ReviewerTool, ToolError,
};
use issuebot::DepResolver;
use issuebot::workflow::{IssueLocks, IterationManager, WorkflowEngine, WorkflowOutcome};

use issuestore::{Database, IssueStatus, RepoMode, TrackedIssue, WatchedRepo, now_ms};

// =============================================================================
// Mock adapters
// =============================================================================

#[derive(Clone)]
struct MockIssue {
    title: String,
    body: String,
    state: &'static str,
    labels: Vec<&'static str>,
}

impl MockIssue {
    fn open(title: &str, body: &str, labels: Vec<&'static str>) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            state: "open",
            labels,
        }
    }
}

/// Scriptable upstream: issues are mutated between poll cycles, CI verdicts
/// are consumed from a queue (empty queue = success).
#[derive(Default)]
struct MockUpstream {
    issues: Mutex<HashMap<u64, MockIssue>>,
    ci_script: Mutex<VecDeque<CiStatus>>,
    merged_prs: Mutex<Vec<u64>>,
    closed_issues: Mutex<Vec<u64>>,
    comments: Mutex<Vec<(u64, String)>>,
    labels_added: Mutex<Vec<(u64, String)>>,
    pushes: Mutex<Vec<String>>,
}

impl MockUpstream {
    fn set_issue(&self, number: u64, issue: MockIssue) {
        self.issues.lock().unwrap().insert(number, issue);
    }

    fn close(&self, number: u64) {
        if let Some(issue) = self.issues.lock().unwrap().get_mut(&number) {
            issue.state = "closed";
        }
    }

    fn script_ci(&self, results: Vec<CiStatus>) {
        *self.ci_script.lock().unwrap() = results.into();
    }
}

#[async_trait]
impl RepoService for MockUpstream {
    async fn list_open_issues(&self, _: &RepoRef, label: &str) -> Result<Vec<Issue>, GithubError> {
        let issues = self.issues.lock().unwrap();
        Ok(issues
            .iter()
            .filter(|(_, i)| i.state == "open" && i.labels.iter().any(|l| *l == label))
            .map(|(number, i)| Issue {
                number: *number,
                title: i.title.clone(),
                body: Some(i.body.clone()),
                state: i.state.to_string(),
                labels: i.labels.iter().map(|l| Label { name: l.to_string() }).collect(),
                pull_request: None,
            })
            .collect())
    }

    async fn get_issue(&self, _: &RepoRef, number: u64) -> Result<Issue, GithubError> {
        let issues = self.issues.lock().unwrap();
        let issue = issues
            .get(&number)
            .ok_or_else(|| GithubError::NotFound(format!("issue {}", number)))?;
        Ok(Issue {
            number,
            title: issue.title.clone(),
            body: Some(issue.body.clone()),
            state: issue.state.to_string(),
            labels: issue.labels.iter().map(|l| Label { name: l.to_string() }).collect(),
            pull_request: None,
        })
    }

    async fn add_labels(&self, _: &RepoRef, number: u64, labels: &[&str]) -> Result<(), GithubError> {
        let mut added = self.labels_added.lock().unwrap();
        for label in labels {
            added.push((number, label.to_string()));
        }
        Ok(())
    }

    async fn remove_label(&self, _: &RepoRef, _: u64, _: &str) -> Result<(), GithubError> {
        Ok(())
    }

    async fn add_comment(&self, _: &RepoRef, number: u64, body: &str) -> Result<(), GithubError> {
        self.comments.lock().unwrap().push((number, body.to_string()));
        Ok(())
    }

    async fn close_issue(&self, _: &RepoRef, number: u64) -> Result<(), GithubError> {
        self.closed_issues.lock().unwrap().push(number);
        self.close(number);
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
        Ok(PullRequest {
            number: 1000,
            html_url: "https://example.test/pr/1000".to_string(),
        })
    }

    async fn merge_pull_request(&self, _: &RepoRef, number: u64) -> Result<(), GithubError> {
        self.merged_prs.lock().unwrap().push(number);
        Ok(())
    }

    async fn get_ci_status(&self, _: &RepoRef, _: &str) -> Result<CiStatus, GithubError> {
        Ok(self.ci_script.lock().unwrap().pop_front().unwrap_or(CiStatus::Success))
    }

    async fn prepare_workdir(&self, _: &RepoRef, _: &str, _: &str, workdir: &Path) -> Result<(), GithubError> {
        tokio::fs::create_dir_all(workdir)
            .await
            .map_err(|e| GithubError::Git(e.to_string()))
    }

    async fn push_branch(&self, _: &RepoRef, branch: &str, _: &Path, _: &str) -> Result<bool, GithubError> {
        self.pushes.lock().unwrap().push(branch.to_string());
        Ok(true)
    }

    async fn diff_against_base(&self, _: &RepoRef, _: &str, _: &Path) -> Result<BranchDiff, GithubError> {
        Ok(BranchDiff {
            files: vec!["src/lib.rs".to_string()],
            patch: "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@\n+fixed\n".to_string(),
        })
    }
}

/// Recording code-generation tool; optionally slow for contention tests
struct MockCodegen {
    prompts: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

impl MockCodegen {
    fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodegenTool for MockCodegen {
    async fn run(&self, prompt_file: &Path, _: &Path) -> Result<CodegenOutcome, ToolError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let prompt = std::fs::read_to_string(prompt_file).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);
        Ok(CodegenOutcome {
            result_text: "implemented the change".to_string(),
            model: "mock-model".to_string(),
            input_tokens: 1_000,
            output_tokens: 100,
            raw_output: String::new(),
        })
    }

    async fn probe(&self) -> bool {
        true
    }
}

/// Scriptable reviewer (empty queue = passing verdict)
#[derive(Default)]
struct MockReviewer {
    verdicts: Mutex<VecDeque<ReviewVerdict>>,
}

fn passing_verdict() -> ReviewVerdict {
    serde_json::from_value(serde_json::json!({
        "passed": true,
        "summary": "looks good",
        "specComplianceScore": 0.9,
        "correctnessScore": 0.9,
        "codeQualityScore": 0.9,
        "testCoverageScore": 0.9,
        "architectureFitScore": 0.9,
        "regressionsScore": 0.9,
        "securityScore": 0.9,
        "findings": [],
        "advice": ""
    }))
    .unwrap()
}

fn failing_verdict() -> ReviewVerdict {
    let mut verdict = passing_verdict();
    verdict.correctness_score = 0.4;
    verdict.summary = "off-by-one in the loop bound".to_string();
    verdict.normalize();
    verdict
}

#[async_trait]
impl ReviewerTool for MockReviewer {
    async fn review(&self, _: &Path, _: &Path) -> Result<ReviewOutcome, ToolError> {
        let mut verdict = self.verdicts.lock().unwrap().pop_front().unwrap_or_else(passing_verdict);
        verdict.normalize();
        Ok(ReviewOutcome {
            raw_output: serde_json::to_string(&verdict).unwrap(),
            verdict,
            model: "mock-reviewer".to_string(),
        })
    }

    async fn probe(&self) -> bool {
        true
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    state: StateManager,
    upstream: Arc<MockUpstream>,
    codegen: Arc<MockCodegen>,
    reviewer: Arc<MockReviewer>,
    engine: Arc<WorkflowEngine>,
    poller: PollService,
    repo: WatchedRepo,
    _work_root: tempfile::TempDir,
}

async fn harness(configure: impl FnOnce(&mut WatchedRepo)) -> Harness {
    let state = StateManager::spawn_with(Database::open_in_memory().unwrap());

    let mut repo = WatchedRepo::new("octocat", "hello-world");
    configure(&mut repo);
    repo.id = state.upsert_repo(repo.clone()).await.unwrap();

    let upstream = Arc::new(MockUpstream::default());
    let codegen = Arc::new(MockCodegen::new());
    let reviewer = Arc::new(MockReviewer::default());

    let bus = NotificationBus::with_default_capacity();
    let events = EventLog::new(state.clone());
    let metrics = Metrics::new();
    let work_root = tempfile::TempDir::new().unwrap();

    let budget = IterationManager::new(
        state.clone(),
        upstream.clone(),
        events.clone(),
        bus.notifier(),
    );
    let engine = Arc::new(WorkflowEngine::new(
        state.clone(),
        upstream.clone(),
        codegen.clone(),
        reviewer.clone(),
        budget,
        events.clone(),
        bus.notifier(),
        metrics.clone(),
        IssueLocks::new(),
        work_root.path().to_path_buf(),
    ));
    let resolver = DepResolver::new(upstream.clone(), state.clone(), events.clone());
    let poller = PollService::new(
        PollServiceConfig {
            interval_secs: 60,
            max_concurrent_workflows: 4,
        },
        state.clone(),
        upstream.clone(),
        resolver,
        engine.clone(),
        events.clone(),
        bus.notifier(),
        metrics,
    );

    Harness {
        state,
        upstream,
        codegen,
        reviewer,
        engine,
        poller,
        repo,
        _work_root: work_root,
    }
}

impl Harness {
    async fn poll_and_drain(&mut self) {
        self.poller.poll_once().await.unwrap();
        self.poller.drain().await;
    }

    async fn tracked(&self, number: u64) -> TrackedIssue {
        self.state.find_issue(self.repo.id, number).await.unwrap().unwrap()
    }

    async fn event_types_for(&self, issue_id: i64) -> Vec<String> {
        self.state
            .recent_events(100)
            .await
            .unwrap()
            .into_iter()
            .rev()
            .filter(|e| e.issue_id == Some(issue_id))
            .map(|e| e.event_type)
            .collect()
    }
}

// =============================================================================
// Happy path, autonomous
// =============================================================================

#[tokio::test]
async fn test_happy_path_autonomous_merges() {
    let mut h = harness(|repo| {
        repo.auto_merge = true;
        repo.ci_enabled = true;
        repo.security_review_enabled = false;
    })
    .await;
    h.upstream
        .set_issue(7, MockIssue::open("Fix the parser", "It crashes on empty input.", vec!["agent-ready"]));

    h.poll_and_drain().await;

    let issue = h.tracked(7).await;
    assert_eq!(issue.status, IssueStatus::Completed);
    assert_eq!(issue.current_iteration, 1);

    // One iteration row with a passing CI result.
    let iterations = h.state.list_iterations(issue.id).await.unwrap();
    assert_eq!(iterations.len(), 1);
    assert_eq!(iterations[0].ci_result.as_deref(), Some("passed"));
    assert!(iterations[0].completed_at.is_some());

    // Merged and closed upstream.
    assert_eq!(h.upstream.merged_prs.lock().unwrap().as_slice(), &[1000]);
    assert_eq!(h.upstream.closed_issues.lock().unwrap().as_slice(), &[7]);
    assert!(h.upstream.pushes.lock().unwrap()[0].starts_with("issuebot/issue-7-"));

    // Event trail in order.
    let trail = h.event_types_for(issue.id).await;
    assert_eq!(
        trail,
        vec![
            event_types::DETECTED,
            event_types::DISPATCHED,
            event_types::ITERATION_START,
            event_types::ITERATION_SUCCESS,
            event_types::MERGED,
        ]
    );
}

// =============================================================================
// Blocker chain
// =============================================================================

#[tokio::test]
async fn test_blocker_chain_unblocks_as_blockers_close() {
    let mut h = harness(|repo| {
        repo.auto_merge = true;
        repo.ci_enabled = false;
    })
    .await;
    h.upstream
        .set_issue(20, MockIssue::open("Dependent work", "**Blocked by:** #10, #15", vec!["agent-ready"]));
    h.upstream.set_issue(10, MockIssue::open("First blocker", "", vec![]));
    h.upstream.set_issue(15, MockIssue::open("Second blocker", "", vec![]));

    // Cycle 1: both blockers open.
    h.poll_and_drain().await;
    let issue = h.tracked(20).await;
    assert_eq!(issue.status, IssueStatus::Blocked);
    assert_eq!(issue.blocked_by_issues, "10,15");

    // Cycle 2: only #10 closed, still blocked.
    h.upstream.close(10);
    h.poll_and_drain().await;
    assert_eq!(h.tracked(20).await.status, IssueStatus::Blocked);

    // Cycle 3: both closed; queued, dispatched, and completed.
    h.upstream.close(15);
    h.poll_and_drain().await;
    let issue = h.tracked(20).await;
    assert_eq!(issue.status, IssueStatus::Completed);
}

// =============================================================================
// Max iterations escalation
// =============================================================================

#[tokio::test]
async fn test_max_iterations_escalates_with_label_comment_cooldown() {
    let mut h = harness(|repo| {
        repo.auto_merge = true;
        repo.ci_enabled = true;
        repo.max_iterations = 2;
    })
    .await;
    h.upstream
        .set_issue(7, MockIssue::open("Fix the parser", "crashes", vec!["agent-ready"]));
    h.upstream.script_ci(vec![CiStatus::Failure, CiStatus::Failure]);

    h.poll_and_drain().await;

    let issue = h.tracked(7).await;
    assert_eq!(issue.status, IssueStatus::Cooldown);
    assert_eq!(issue.current_iteration, 2);

    // Cooldown roughly a day out.
    let until = issue.cooldown_until.unwrap();
    let expected = now_ms() + 24 * 3_600_000;
    assert!((until - expected).abs() < 60_000);

    // Label and comment landed upstream.
    let labels = h.upstream.labels_added.lock().unwrap().clone();
    assert!(labels.contains(&(7, "needs-human".to_string())));
    let comments = h.upstream.comments.lock().unwrap().clone();
    let body = &comments.iter().find(|(n, _)| *n == 7).unwrap().1;
    assert!(body.contains("Max Iterations Reached"));
    assert!(body.contains("Failed after 2 iterations"));

    // Durable escalation event.
    assert!(
        h.state
            .latest_event_of_type(issue.id, event_types::MAX_ITERATIONS_REACHED)
            .await
            .unwrap()
            .is_some()
    );

    // Both iterations recorded CI failure.
    let iterations = h.state.list_iterations(issue.id).await.unwrap();
    assert_eq!(iterations.len(), 2);
    assert!(iterations.iter().all(|r| r.ci_result.as_deref() == Some("failed")));
}

// =============================================================================
// Cooldown reset
// =============================================================================

#[tokio::test]
async fn test_expired_cooldown_resets_then_fresh_pickup() {
    let mut h = harness(|repo| {
        repo.auto_merge = true;
        repo.ci_enabled = false;
    })
    .await;
    h.upstream
        .set_issue(7, MockIssue::open("Fix the parser", "crashes", vec!["agent-ready"]));

    // Seed an expired-cooldown row as an earlier escalation would leave it.
    let mut seeded = TrackedIssue::new(h.repo.id, 7, "Fix the parser");
    seeded.set_status(IssueStatus::Cooldown);
    seeded.cooldown_until = Some(now_ms() - 3_600_000);
    seeded.current_iteration = 5;
    seeded.id = h.state.create_issue(seeded.clone()).await.unwrap();

    // Cycle 1: reset-and-skip; counters zeroed, stale timestamp retained.
    h.poll_and_drain().await;
    let issue = h.tracked(7).await;
    assert_eq!(issue.status, IssueStatus::Pending);
    assert_eq!(issue.current_iteration, 0);
    assert!(issue.cooldown_until.is_some());

    // Cycle 2: picked up as fresh work and completed.
    h.poll_and_drain().await;
    assert_eq!(h.tracked(7).await.status, IssueStatus::Completed);
}

// =============================================================================
// Review gate
// =============================================================================

#[tokio::test]
async fn test_review_failure_consumes_review_budget_then_passes() {
    let mut h = harness(|repo| {
        repo.auto_merge = true;
        repo.ci_enabled = false;
        repo.security_review_enabled = true;
        repo.max_review_iterations = 2;
    })
    .await;
    h.upstream
        .set_issue(7, MockIssue::open("Fix the parser", "crashes", vec!["agent-ready"]));
    h.reviewer.verdicts.lock().unwrap().push_back(failing_verdict());

    h.poll_and_drain().await;

    let issue = h.tracked(7).await;
    assert_eq!(issue.status, IssueStatus::Completed);
    assert_eq!(issue.current_review_iteration, 1);
    assert_eq!(issue.current_iteration, 2);

    // Second implementation prompt carried the review findings.
    let prompts = h.codegen.prompts();
    assert!(prompts.iter().any(|p| p.contains("off-by-one in the loop bound")));

    let iterations = h.state.list_iterations(issue.id).await.unwrap();
    assert_eq!(iterations[0].review_passed, Some(true));
    assert_eq!(iterations[1].review_passed, Some(false));
}

#[tokio::test]
async fn test_review_budget_exhaustion_escalates() {
    let mut h = harness(|repo| {
        repo.auto_merge = true;
        repo.ci_enabled = false;
        repo.security_review_enabled = true;
        repo.max_review_iterations = 1;
    })
    .await;
    h.upstream
        .set_issue(7, MockIssue::open("Fix the parser", "crashes", vec!["agent-ready"]));
    h.reviewer
        .verdicts
        .lock()
        .unwrap()
        .extend([failing_verdict(), failing_verdict()]);

    h.poll_and_drain().await;

    let issue = h.tracked(7).await;
    assert_eq!(issue.status, IssueStatus::Cooldown);
    assert!(
        h.state
            .latest_event_of_type(issue.id, event_types::MAX_REVIEW_ITERATIONS_REACHED)
            .await
            .unwrap()
            .is_some()
    );
    let comments = h.upstream.comments.lock().unwrap().clone();
    assert!(comments.iter().any(|(_, body)| body.contains("Max Review Iterations Reached")));
}

// =============================================================================
// Approval-gated flow
// =============================================================================

#[tokio::test]
async fn test_approval_gated_rejection_threads_feedback() {
    let mut h = harness(|repo| {
        repo.mode = RepoMode::ApprovalGated;
        repo.auto_merge = false;
        repo.ci_enabled = false;
    })
    .await;
    h.upstream
        .set_issue(7, MockIssue::open("Fix the parser", "crashes", vec!["agent-ready"]));

    h.poll_and_drain().await;
    let mut issue = h.tracked(7).await;
    assert_eq!(issue.status, IssueStatus::AwaitingApproval);
    assert_eq!(issue.current_iteration, 1);
    assert!(h.upstream.merged_prs.lock().unwrap().is_empty());

    // Human rejects with feedback; the engine re-enters within the budget.
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let outcome = h
        .engine
        .reject(&h.repo, &mut issue, "Missing null check in parser", cancel_rx)
        .await
        .unwrap();
    assert_eq!(outcome, WorkflowOutcome::AwaitingApproval);

    let issue = h.tracked(7).await;
    assert_eq!(issue.current_iteration, 2);
    assert!(
        h.state
            .latest_event_of_type(issue.id, event_types::HUMAN_REJECTION)
            .await
            .unwrap()
            .unwrap()
            .message
            .contains("Missing null check")
    );

    // The feedback reached the next implementation prompt.
    let prompts = h.codegen.prompts();
    assert!(prompts.iter().any(|p| p.contains("Missing null check in parser")));
}

#[tokio::test]
async fn test_approval_merges_and_completes() {
    let mut h = harness(|repo| {
        repo.mode = RepoMode::ApprovalGated;
        repo.auto_merge = false;
        repo.ci_enabled = false;
    })
    .await;
    h.upstream
        .set_issue(7, MockIssue::open("Fix the parser", "crashes", vec!["agent-ready"]));

    h.poll_and_drain().await;
    let mut issue = h.tracked(7).await;
    assert_eq!(issue.status, IssueStatus::AwaitingApproval);

    h.engine.approve(&h.repo, &mut issue).await.unwrap();

    let issue = h.tracked(7).await;
    assert_eq!(issue.status, IssueStatus::Completed);
    assert_eq!(h.upstream.merged_prs.lock().unwrap().as_slice(), &[1000]);
    assert!(
        h.state
            .latest_event_of_type(issue.id, event_types::MERGED)
            .await
            .unwrap()
            .is_some()
    );
}

// =============================================================================
// Branch safety
// =============================================================================

#[tokio::test]
async fn test_unsafe_push_target_fails_with_distinct_event() {
    // The generated branch name collides with the default branch, so the
    // safety check must refuse before any upstream side effect.
    let mut h = harness(|repo| {
        repo.auto_merge = true;
        repo.ci_enabled = false;
        repo.default_branch = "issuebot/issue-9-unsafe".to_string();
    })
    .await;
    h.upstream
        .set_issue(9, MockIssue::open("unsafe", "body", vec!["agent-ready"]));

    h.poll_and_drain().await;

    let issue = h.tracked(9).await;
    assert_eq!(issue.status, IssueStatus::Failed);
    assert!(h.upstream.pushes.lock().unwrap().is_empty());
    assert!(
        h.state
            .latest_event_of_type(issue.id, event_types::BRANCH_SAFETY_VIOLATION)
            .await
            .unwrap()
            .is_some()
    );
}

// =============================================================================
// At-most-one workflow per issue
// =============================================================================

#[tokio::test]
async fn test_concurrent_runs_on_same_issue_are_rejected() {
    let h = harness(|repo| {
        repo.auto_merge = true;
        repo.ci_enabled = false;
    })
    .await;
    // Slow the tool down so the first run holds the lock.
    h.codegen.set_delay(Duration::from_millis(300));
    h.upstream
        .set_issue(7, MockIssue::open("Fix the parser", "crashes", vec!["agent-ready"]));

    // Track the issue and mark it dispatched by hand.
    let mut issue = TrackedIssue::new(h.repo.id, 7, "Fix the parser");
    issue.set_status(IssueStatus::InProgress);
    issue.id = h.state.create_issue(issue.clone()).await.unwrap();

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let first = {
        let engine = h.engine.clone();
        let repo = h.repo.clone();
        let issue = issue.clone();
        let cancel = cancel_rx.clone();
        tokio::spawn(async move { engine.run_issue(repo, issue, cancel).await })
    };

    // Give the first run time to take the lock, then collide.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = h.engine.run_issue(h.repo.clone(), issue, cancel_rx).await;
    assert!(second.is_err());

    let first = first.await.unwrap().unwrap();
    assert_eq!(first, WorkflowOutcome::Completed);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancellation_fails_issue_with_event() {
    let h = harness(|repo| {
        repo.auto_merge = true;
        repo.ci_enabled = false;
    })
    .await;
    h.codegen.set_delay(Duration::from_millis(300));
    h.upstream
        .set_issue(7, MockIssue::open("Fix the parser", "crashes", vec!["agent-ready"]));

    let mut issue = TrackedIssue::new(h.repo.id, 7, "Fix the parser");
    issue.set_status(IssueStatus::InProgress);
    issue.id = h.state.create_issue(issue.clone()).await.unwrap();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let run = {
        let engine = h.engine.clone();
        let repo = h.repo.clone();
        let issue = issue.clone();
        tokio::spawn(async move { engine.run_issue(repo, issue, cancel_rx).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel_tx.send(true).unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, WorkflowOutcome::Cancelled);

    let stored = h.tracked(7).await;
    assert_eq!(stored.status, IssueStatus::Failed);
    assert!(
        h.state
            .latest_event_of_type(stored.id, event_types::CANCELLED)
            .await
            .unwrap()
            .is_some()
    );
}
