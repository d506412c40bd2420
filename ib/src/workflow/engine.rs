//! Per-issue workflow engine
//!
//! Drives one tracked issue through implementation, self-assessment, CI
//! wait, optional independent review, and merge or approval. Budgets and
//! escalation live in [`IterationManager`]; this module owns the state
//! machine and the suspension points, every one of which observes the
//! cancellation flag.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use issuestore::{
    CostPhase, CostRecord, IssueStatus, IterationRecord, TrackedIssue, WatchedRepo, WorkflowPhase,
};

use crate::events::{EventLog, Notifier, types as event_types};
use crate::github::{CiStatus, GithubError, RepoRef, RepoService};
use crate::metrics::Metrics;
use crate::state::StateManager;
use crate::tools::{CodegenTool, ReviewerTool, ToolError};

use super::branch;
use super::budget::IterationManager;
use super::locks::IssueLocks;
use super::prompt::{self, PromptInput};

/// Stored diff cap, characters
const DIFF_LIMIT: usize = 100_000;

/// Stored tool output cap, characters
const OUTPUT_LIMIT: usize = 50_000;

/// First CI poll delay; grows by half each round up to the cap
const CI_POLL_INITIAL: Duration = Duration::from_secs(10);
const CI_POLL_MAX: Duration = Duration::from_secs(60);

/// Terminal verdict of one workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed,
    AwaitingApproval,
    Failed,
    Cancelled,
}

/// What one iteration decided
enum IterationVerdict {
    /// Merged and closed
    Merged,
    /// Change is up as a PR, waiting for a human
    AwaitingApproval,
    /// CI failed or timed out; retry within the implementation budget
    CiFailed,
    /// Review verdict failed; retry within the review budget
    ReviewFailed,
    /// Tool or upstream trouble consumed this iteration; retry within budget
    Aborted,
    /// Code-generation tool cannot run at all
    FatalTool(String),
    /// The upstream repository is gone
    RepoGone(String),
    /// Refused to touch an unsafe branch
    SafetyViolation(String),
    Cancelled,
}

/// Outcome of the CI wait
enum CiWait {
    Passed,
    Failed,
    TimedOut,
    Cancelled,
}

/// The per-issue workflow engine
pub struct WorkflowEngine {
    state: StateManager,
    github: Arc<dyn RepoService>,
    codegen: Arc<dyn CodegenTool>,
    reviewer: Arc<dyn ReviewerTool>,
    budget: IterationManager,
    events: EventLog,
    notifier: Notifier,
    metrics: Arc<Metrics>,
    locks: IssueLocks,
    work_root: PathBuf,
}

impl WorkflowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: StateManager,
        github: Arc<dyn RepoService>,
        codegen: Arc<dyn CodegenTool>,
        reviewer: Arc<dyn ReviewerTool>,
        budget: IterationManager,
        events: EventLog,
        notifier: Notifier,
        metrics: Arc<Metrics>,
        locks: IssueLocks,
        work_root: PathBuf,
    ) -> Self {
        Self {
            state,
            github,
            codegen,
            reviewer,
            budget,
            events,
            notifier,
            metrics,
            locks,
            work_root,
        }
    }

    /// Run the workflow for one dispatched issue.
    ///
    /// The caller must have transitioned the issue to IN_PROGRESS. Rejects
    /// (with an error) when a workflow already holds the issue's lock.
    pub async fn run_issue(
        &self,
        repo: WatchedRepo,
        mut issue: TrackedIssue,
        cancel: watch::Receiver<bool>,
    ) -> Result<WorkflowOutcome> {
        let _guard = self.locks.try_acquire(repo.id, issue.issue_number).ok_or_else(|| {
            eyre::eyre!(
                "workflow already active for {}#{}",
                repo.full_name(),
                issue.issue_number
            )
        })?;

        info!(repo = %repo.full_name(), issue = issue.issue_number, "workflow starting");
        let outcome = self.drive(&repo, &mut issue, &cancel).await;

        if let Ok(WorkflowOutcome::Completed | WorkflowOutcome::Failed | WorkflowOutcome::Cancelled) = outcome {
            self.release_workdir(&repo, issue.issue_number).await;
        }
        outcome
    }

    /// A human approved the change waiting in AWAITING_APPROVAL
    pub async fn approve(&self, repo: &WatchedRepo, issue: &mut TrackedIssue) -> Result<()> {
        if issue.status != IssueStatus::AwaitingApproval {
            eyre::bail!("issue #{} is {} and not awaiting approval", issue.issue_number, issue.status);
        }
        let repo_ref = RepoRef::new(&repo.owner, &repo.name);
        let branch = issue
            .branch_name
            .clone()
            .ok_or_else(|| eyre::eyre!("issue #{} has no working branch", issue.issue_number))?;

        // The existing PR is refreshed, never duplicated.
        let pr = self
            .github
            .create_or_update_pull_request(
                &repo_ref,
                &branch,
                &repo.default_branch,
                &pr_title(issue),
                &pr_body(issue),
            )
            .await
            .context("failed to locate the pull request for approval")?;
        self.github.merge_pull_request(&repo_ref, pr.number).await?;
        self.github.close_issue(&repo_ref, issue.issue_number).await?;

        issue.set_status(IssueStatus::Completed);
        issue.set_phase(None);
        self.state.update_issue(issue.clone()).await?;
        self.metrics.merges.fetch_add(1, Ordering::Relaxed);
        self.events
            .record(
                event_types::MERGED,
                Some(repo.id),
                Some(issue.id),
                &format!("#{} merged after human approval (PR #{})", issue.issue_number, pr.number),
            )
            .await;
        self.release_workdir(repo, issue.issue_number).await;
        Ok(())
    }

    /// A human rejected the change: thread the feedback into a fresh
    /// implementation iteration under the same budget
    pub async fn reject(
        &self,
        repo: &WatchedRepo,
        issue: &mut TrackedIssue,
        feedback: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<WorkflowOutcome> {
        if issue.status != IssueStatus::AwaitingApproval {
            eyre::bail!("issue #{} is {} and not awaiting approval", issue.issue_number, issue.status);
        }
        self.budget.handle_human_rejection(issue, feedback).await?;
        self.run_issue(repo.clone(), issue.clone(), cancel).await
    }

    /// The iteration loop: runs until a terminal verdict or budget
    /// exhaustion
    async fn drive(
        &self,
        repo: &WatchedRepo,
        issue: &mut TrackedIssue,
        cancel: &watch::Receiver<bool>,
    ) -> Result<WorkflowOutcome> {
        loop {
            if *cancel.borrow() {
                return self.cancel_issue(repo, issue).await;
            }

            if !IterationManager::can_iterate(issue, repo) {
                self.budget.handle_max_iterations_reached(repo, issue).await?;
                self.metrics.escalations.fetch_add(1, Ordering::Relaxed);
                return Ok(WorkflowOutcome::Failed);
            }

            issue.current_iteration += 1;
            issue.set_status(IssueStatus::InProgress);
            issue.set_phase(Some(WorkflowPhase::Implementation));
            self.state.update_issue(issue.clone()).await?;

            let mut record = IterationRecord::new(issue.id, issue.current_iteration);
            record.id = self.state.create_iteration(record.clone()).await?;
            self.metrics.iterations_run.fetch_add(1, Ordering::Relaxed);
            self.events
                .record(
                    event_types::ITERATION_START,
                    Some(repo.id),
                    Some(issue.id),
                    &format!(
                        "#{} iteration {}/{}",
                        issue.issue_number, issue.current_iteration, repo.max_iterations
                    ),
                )
                .await;

            let verdict = self.run_iteration(repo, issue, &mut record, cancel).await?;

            record.mark_completed();
            self.state.update_iteration(record).await?;

            match verdict {
                IterationVerdict::Merged => {
                    issue.set_status(IssueStatus::Completed);
                    issue.set_phase(None);
                    self.state.update_issue(issue.clone()).await?;
                    self.metrics.merges.fetch_add(1, Ordering::Relaxed);
                    info!(issue = issue.issue_number, "workflow completed, merged");
                    return Ok(WorkflowOutcome::Completed);
                }
                IterationVerdict::AwaitingApproval => {
                    issue.set_status(IssueStatus::AwaitingApproval);
                    issue.set_phase(Some(WorkflowPhase::Merge));
                    self.state.update_issue(issue.clone()).await?;
                    info!(issue = issue.issue_number, "workflow paused, awaiting approval");
                    return Ok(WorkflowOutcome::AwaitingApproval);
                }
                IterationVerdict::CiFailed => {
                    debug!(issue = issue.issue_number, "CI failed, re-entering within budget");
                }
                IterationVerdict::Aborted => {
                    debug!(issue = issue.issue_number, "iteration aborted, re-entering within budget");
                }
                IterationVerdict::ReviewFailed => {
                    if IterationManager::can_review_iterate(issue, repo) {
                        issue.current_review_iteration += 1;
                        self.state.update_issue(issue.clone()).await?;
                        debug!(
                            issue = issue.issue_number,
                            review_iteration = issue.current_review_iteration,
                            "review failed, re-entering with feedback"
                        );
                    } else {
                        self.budget.handle_max_review_iterations_reached(repo, issue).await?;
                        self.metrics.escalations.fetch_add(1, Ordering::Relaxed);
                        return Ok(WorkflowOutcome::Failed);
                    }
                }
                IterationVerdict::FatalTool(reason) => {
                    warn!(issue = issue.issue_number, %reason, "code-generation tool unavailable");
                    self.budget.handle_max_iterations_reached(repo, issue).await?;
                    self.metrics.escalations.fetch_add(1, Ordering::Relaxed);
                    return Ok(WorkflowOutcome::Failed);
                }
                IterationVerdict::RepoGone(reason) => {
                    // No escalation comment: there is nowhere to post it.
                    warn!(issue = issue.issue_number, %reason, "upstream repository gone");
                    issue.set_status(IssueStatus::Failed);
                    issue.set_phase(None);
                    self.state.update_issue(issue.clone()).await?;
                    self.events
                        .record(event_types::REPO_GONE, Some(repo.id), Some(issue.id), &reason)
                        .await;
                    self.notifier.error_for(&repo.full_name(), issue.issue_number, reason);
                    return Ok(WorkflowOutcome::Failed);
                }
                IterationVerdict::SafetyViolation(branch_name) => {
                    warn!(issue = issue.issue_number, branch = %branch_name, "refusing unsafe push target");
                    issue.set_status(IssueStatus::Failed);
                    issue.set_phase(None);
                    self.state.update_issue(issue.clone()).await?;
                    self.events
                        .record(
                            event_types::BRANCH_SAFETY_VIOLATION,
                            Some(repo.id),
                            Some(issue.id),
                            &format!("refused to push branch {}", branch_name),
                        )
                        .await;
                    self.notifier.error_for(
                        &repo.full_name(),
                        issue.issue_number,
                        format!("branch safety check refused {}", branch_name),
                    );
                    self.metrics.escalations.fetch_add(1, Ordering::Relaxed);
                    return Ok(WorkflowOutcome::Failed);
                }
                IterationVerdict::Cancelled => {
                    return self.cancel_issue(repo, issue).await;
                }
            }
        }
    }

    /// One iteration: implement, assess, push, CI, review, merge
    async fn run_iteration(
        &self,
        repo: &WatchedRepo,
        issue: &mut TrackedIssue,
        record: &mut IterationRecord,
        cancel: &watch::Receiver<bool>,
    ) -> Result<IterationVerdict> {
        let repo_ref = RepoRef::new(&repo.owner, &repo.name);
        let work_branch = branch::branch_name(issue.issue_number, &issue.issue_title);

        // 1. Working branch, with the safety invariant checked before any
        //    upstream side effect.
        if !branch::is_safe_to_push(&work_branch, &repo.default_branch) {
            return Ok(IterationVerdict::SafetyViolation(work_branch));
        }
        issue.set_branch(work_branch.clone());
        self.state.update_issue(issue.clone()).await?;

        let workdir = self.checkout_dir(repo, issue.issue_number);
        match self
            .github
            .prepare_workdir(&repo_ref, &work_branch, &repo.default_branch, &workdir)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(IterationVerdict::RepoGone(e.to_string())),
            Err(e) => {
                warn!(issue = issue.issue_number, error = %e, "workdir preparation failed");
                return Ok(IterationVerdict::Aborted);
            }
        }

        if *cancel.borrow() {
            return Ok(IterationVerdict::Cancelled);
        }

        // 2-3. Code generation.
        let history = self.state.list_iterations(issue.id).await?;
        let prior: Vec<IterationRecord> = history.into_iter().filter(|r| r.id != record.id).collect();
        let feedback = self.fresh_human_feedback(issue, &prior).await;
        let allowed = repo.allowed_paths_list();
        let impl_prompt = prompt::build_implementation_prompt(&PromptInput {
            issue_number: issue.issue_number,
            title: &issue.issue_title,
            body: &self.issue_body(&repo_ref, issue).await,
            allowed_paths: &allowed,
            human_feedback: feedback.as_deref(),
            history: &prior,
        });
        let prompt_file = self
            .write_prompt(repo, issue.issue_number, record.iteration_num, "impl", &impl_prompt)
            .await?;

        match self.codegen.run(&prompt_file, &workdir).await {
            Ok(outcome) => {
                record.agent_output = Some(truncate(&outcome.result_text, OUTPUT_LIMIT));
                self.state
                    .record_cost(
                        CostRecord::new(issue.id, record.iteration_num, CostPhase::Implementation, &outcome.model)
                            .with_tokens(outcome.input_tokens, outcome.output_tokens),
                    )
                    .await?;

                // Self-assessment: a second pass over the same tool; a
                // failure here degrades, it does not fail the iteration.
                issue.set_phase(Some(WorkflowPhase::SelfAssessment));
                self.state.update_issue(issue.clone()).await?;
                record.self_assessment = self
                    .run_self_assessment(repo, issue, record.iteration_num, &outcome.result_text, &workdir)
                    .await;
            }
            Err(ToolError::Spawn(reason)) => return Ok(IterationVerdict::FatalTool(reason)),
            Err(e) => {
                // Parse trouble and timeouts consume one budget slot; the
                // raw stream is kept for audit.
                warn!(issue = issue.issue_number, error = %e, "code-generation failed this iteration");
                record.agent_output = e.raw_output().map(|raw| truncate(raw, OUTPUT_LIMIT));
                return Ok(IterationVerdict::Aborted);
            }
        }

        if *cancel.borrow() {
            return Ok(IterationVerdict::Cancelled);
        }

        // 4. Commit and push.
        let message = format!("Issue #{}: {} (iteration {})", issue.issue_number, issue.issue_title, record.iteration_num);
        match self.github.push_branch(&repo_ref, &work_branch, &workdir, &message).await {
            Ok(pushed) => {
                if !pushed {
                    debug!(issue = issue.issue_number, "no changes to push this iteration");
                }
            }
            Err(e) if e.is_not_found() => return Ok(IterationVerdict::RepoGone(e.to_string())),
            Err(e) => {
                warn!(issue = issue.issue_number, error = %e, "push failed");
                return Ok(IterationVerdict::Aborted);
            }
        }

        let diff = self
            .github
            .diff_against_base(&repo_ref, &repo.default_branch, &workdir)
            .await
            .unwrap_or_default();
        record.diff = Some(truncate(&diff.patch, DIFF_LIMIT));

        // 5. CI wait.
        if repo.ci_enabled {
            issue.set_phase(Some(WorkflowPhase::CiWait));
            self.state.update_issue(issue.clone()).await?;
            match self.wait_for_ci(&repo_ref, &work_branch, repo.ci_timeout_minutes, cancel).await {
                CiWait::Passed => record.ci_result = Some("passed".to_string()),
                CiWait::Failed => {
                    record.ci_result = Some("failed".to_string());
                    return Ok(IterationVerdict::CiFailed);
                }
                CiWait::TimedOut => {
                    record.ci_result = Some("timeout".to_string());
                    return Ok(IterationVerdict::CiFailed);
                }
                CiWait::Cancelled => return Ok(IterationVerdict::Cancelled),
            }
        }

        // 6. Independent review.
        if repo.security_review_enabled {
            issue.set_phase(Some(WorkflowPhase::Review));
            self.state.update_issue(issue.clone()).await?;
            self.metrics.reviews_run.fetch_add(1, Ordering::Relaxed);

            let brief = prompt::build_review_brief(
                issue.issue_number,
                &issue.issue_title,
                &self.issue_body(&repo_ref, issue).await,
                &diff.files,
                &truncate(&diff.patch, DIFF_LIMIT),
            );
            let brief_file = self
                .write_prompt(repo, issue.issue_number, record.iteration_num, "review", &brief)
                .await?;

            match self.reviewer.review(&brief_file, &workdir).await {
                Ok(review) => {
                    record.review_json =
                        Some(serde_json::to_string(&review.verdict).unwrap_or_else(|_| review.raw_output.clone()));
                    record.review_passed = Some(review.verdict.passed);
                    record.review_model = Some(review.model.clone());
                    let usage = review.verdict.usage.unwrap_or_default();
                    self.state
                        .record_cost(
                            CostRecord::new(issue.id, record.iteration_num, CostPhase::Review, &review.model)
                                .with_tokens(usage.input_tokens, usage.output_tokens),
                        )
                        .await?;

                    if !review.verdict.passed {
                        return Ok(IterationVerdict::ReviewFailed);
                    }
                }
                Err(e) => {
                    warn!(issue = issue.issue_number, error = %e, "reviewer failed this iteration");
                    record.review_json = e.raw_output().map(|raw| truncate(raw, OUTPUT_LIMIT));
                    record.review_passed = Some(false);
                    return Ok(IterationVerdict::Aborted);
                }
            }
        }

        // 7. Merge or hand to a human.
        issue.set_phase(Some(WorkflowPhase::Merge));
        self.state.update_issue(issue.clone()).await?;
        self.events
            .record(
                event_types::ITERATION_SUCCESS,
                Some(repo.id),
                Some(issue.id),
                &format!("#{} iteration {} succeeded", issue.issue_number, record.iteration_num),
            )
            .await;

        let pr = match self
            .github
            .create_or_update_pull_request(
                &repo_ref,
                &work_branch,
                &repo.default_branch,
                &pr_title(issue),
                &pr_body(issue),
            )
            .await
        {
            Ok(pr) => pr,
            Err(e) if e.is_not_found() => return Ok(IterationVerdict::RepoGone(e.to_string())),
            Err(e) => {
                warn!(issue = issue.issue_number, error = %e, "pull request creation failed");
                return Ok(IterationVerdict::Aborted);
            }
        };

        if repo.auto_merge && repo.mode == issuestore::RepoMode::Autonomous {
            self.github.merge_pull_request(&repo_ref, pr.number).await?;
            self.github.close_issue(&repo_ref, issue.issue_number).await?;
            self.events
                .record(
                    event_types::MERGED,
                    Some(repo.id),
                    Some(issue.id),
                    &format!("#{} merged (PR #{})", issue.issue_number, pr.number),
                )
                .await;
            return Ok(IterationVerdict::Merged);
        }

        Ok(IterationVerdict::AwaitingApproval)
    }

    /// Poll CI with a growing delay until verdict, timeout, or cancellation
    async fn wait_for_ci(
        &self,
        repo_ref: &RepoRef,
        git_ref: &str,
        timeout_minutes: u32,
        cancel: &watch::Receiver<bool>,
    ) -> CiWait {
        let deadline = Instant::now() + Duration::from_secs(u64::from(timeout_minutes) * 60);
        let mut delay = CI_POLL_INITIAL;
        let mut cancel = cancel.clone();

        loop {
            if *cancel.borrow() {
                return CiWait::Cancelled;
            }
            match self.github.get_ci_status(repo_ref, git_ref).await {
                Ok(CiStatus::Success | CiStatus::NotApplicable) => return CiWait::Passed,
                Ok(CiStatus::Failure | CiStatus::TimedOut) => return CiWait::Failed,
                Ok(CiStatus::Pending) => {}
                Err(e) if e.is_transient() => {
                    debug!(error = %e, "transient error polling CI, will retry");
                }
                Err(e) => {
                    warn!(error = %e, "permanent error polling CI");
                    return CiWait::Failed;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return CiWait::TimedOut;
            }
            let sleep_for = delay.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancel.changed() => {}
            }
            delay = (delay + delay / 2).min(CI_POLL_MAX);
        }
    }

    /// Second codegen pass judging the implementation; degrades to None
    async fn run_self_assessment(
        &self,
        repo: &WatchedRepo,
        issue: &TrackedIssue,
        iteration_num: u32,
        implementation_summary: &str,
        workdir: &Path,
    ) -> Option<String> {
        let assessment_prompt =
            prompt::build_assessment_prompt(issue.issue_number, &issue.issue_title, implementation_summary);
        let prompt_file = self
            .write_prompt(repo, issue.issue_number, iteration_num, "assess", &assessment_prompt)
            .await
            .ok()?;

        match self.codegen.run(&prompt_file, workdir).await {
            Ok(outcome) => {
                let _ = self
                    .state
                    .record_cost(
                        CostRecord::new(issue.id, iteration_num, CostPhase::Implementation, &outcome.model)
                            .with_tokens(outcome.input_tokens, outcome.output_tokens),
                    )
                    .await;
                Some(truncate(&outcome.result_text, OUTPUT_LIMIT))
            }
            Err(e) => {
                warn!(issue = issue.issue_number, error = %e, "self-assessment failed, continuing without it");
                None
            }
        }
    }

    /// Latest human rejection feedback, but only if it arrived after the
    /// last completed iteration (stale feedback is not re-threaded)
    async fn fresh_human_feedback(&self, issue: &TrackedIssue, prior: &[IterationRecord]) -> Option<String> {
        let rejection = self
            .state
            .latest_event_of_type(issue.id, event_types::HUMAN_REJECTION)
            .await
            .ok()
            .flatten()?;
        let last_done = prior.first().and_then(|r| r.completed_at).unwrap_or(0);
        (rejection.created_at >= last_done).then_some(rejection.message)
    }

    /// Current issue body from upstream; empty when the fetch fails
    async fn issue_body(&self, repo_ref: &RepoRef, issue: &TrackedIssue) -> String {
        match self.github.get_issue(repo_ref, issue.issue_number).await {
            Ok(upstream) => upstream.body.unwrap_or_default(),
            Err(e) => {
                debug!(issue = issue.issue_number, error = %e, "could not refresh issue body");
                String::new()
            }
        }
    }

    async fn cancel_issue(&self, repo: &WatchedRepo, issue: &mut TrackedIssue) -> Result<WorkflowOutcome> {
        info!(issue = issue.issue_number, "workflow cancelled");
        issue.set_status(IssueStatus::Failed);
        issue.set_phase(None);
        self.state.update_issue(issue.clone()).await?;
        self.events
            .record(
                event_types::CANCELLED,
                Some(repo.id),
                Some(issue.id),
                &format!("#{} cancelled by operator", issue.issue_number),
            )
            .await;
        self.notifier
            .warn_for(&repo.full_name(), issue.issue_number, "workflow cancelled");
        Ok(WorkflowOutcome::Cancelled)
    }

    /// Scoped working area for one issue
    fn issue_dir(&self, repo: &WatchedRepo, issue_number: u64) -> PathBuf {
        self.work_root
            .join(format!("{}-{}-issue-{}", repo.owner, repo.name, issue_number))
    }

    fn checkout_dir(&self, repo: &WatchedRepo, issue_number: u64) -> PathBuf {
        self.issue_dir(repo, issue_number).join("checkout")
    }

    /// Prompt files live beside the checkout so they never dirty the tree
    async fn write_prompt(
        &self,
        repo: &WatchedRepo,
        issue_number: u64,
        iteration_num: u32,
        kind: &str,
        content: &str,
    ) -> Result<PathBuf> {
        let dir = self.issue_dir(repo, issue_number);
        tokio::fs::create_dir_all(&dir).await.context("creating issue work dir")?;
        let path = dir.join(format!("{}-iter-{}.md", kind, iteration_num));
        tokio::fs::write(&path, content).await.context("writing prompt file")?;
        Ok(path)
    }

    /// Best-effort cleanup on terminal status
    async fn release_workdir(&self, repo: &WatchedRepo, issue_number: u64) {
        let dir = self.issue_dir(repo, issue_number);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(dir = %dir.display(), error = %e, "failed to release working directory");
        }
    }
}

fn pr_title(issue: &TrackedIssue) -> String {
    format!("Fix #{}: {}", issue.issue_number, issue.issue_title)
}

fn pr_body(issue: &TrackedIssue) -> String {
    format!(
        "Automated change for #{} after {} iteration(s).\n\nCloses #{}",
        issue.issue_number, issue.current_iteration, issue.issue_number
    )
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit).collect();
    out.push_str("\n[truncated]");
    out
}
