//! Iteration budgets, cooldown, and escalation
//!
//! Budget exhaustion is a designed outcome, not an error: the issue is
//! handed back to humans with a label, a summary comment, and a cooldown.
//! The upstream steps (label, comment) are best-effort; a failure in either
//! never stops the remaining escalation steps.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use issuestore::{IssueStatus, TrackedIssue, WatchedRepo, now_ms};

use crate::events::{EventLog, Notifier, types as event_types};
use crate::github::{RepoRef, RepoService};
use crate::redact;
use crate::state::{StateManager, StateResponse};

/// Quiet period after escalation before automatic retry
pub const COOLDOWN_HOURS: i64 = 24;

/// Label applied on escalation
pub const NEEDS_HUMAN_LABEL: &str = "needs-human";

/// Truncation limits for fields embedded in escalation comments
const SHORT_FIELD_LIMIT: usize = 500;
const LONG_FIELD_LIMIT: usize = 1_000;

/// Enforces per-issue budgets and runs the escalation ladder
#[derive(Clone)]
pub struct IterationManager {
    state: StateManager,
    github: Arc<dyn RepoService>,
    events: EventLog,
    notifier: Notifier,
}

impl IterationManager {
    pub fn new(state: StateManager, github: Arc<dyn RepoService>, events: EventLog, notifier: Notifier) -> Self {
        Self {
            state,
            github,
            events,
            notifier,
        }
    }

    pub fn can_iterate(issue: &TrackedIssue, repo: &WatchedRepo) -> bool {
        issue.current_iteration < repo.max_iterations
    }

    pub fn can_review_iterate(issue: &TrackedIssue, repo: &WatchedRepo) -> bool {
        issue.current_review_iteration < repo.max_review_iterations
    }

    /// Expired unless the issue is actually sitting in an active cooldown
    pub fn is_cooldown_expired(issue: &TrackedIssue) -> bool {
        issue.status != IssueStatus::Cooldown
            || match issue.cooldown_until {
                None => true,
                Some(until) => now_ms() > until,
            }
    }

    /// Move the issue into cooldown for [`COOLDOWN_HOURS`]
    pub async fn enter_cooldown(&self, issue: &mut TrackedIssue) -> StateResponse<()> {
        issue.set_status(IssueStatus::Cooldown);
        issue.cooldown_until = Some(now_ms() + Duration::hours(COOLDOWN_HOURS).num_milliseconds());
        self.state.update_issue(issue.clone()).await
    }

    /// Escalation after the implementation budget is spent
    pub async fn handle_max_iterations_reached(&self, repo: &WatchedRepo, issue: &mut TrackedIssue) -> StateResponse<()> {
        warn!(
            repo = %repo.full_name(),
            issue = issue.issue_number,
            iterations = issue.current_iteration,
            "implementation budget exhausted, escalating"
        );

        let comment = self.implementation_failure_comment(repo, issue).await;
        self.escalate(
            repo,
            issue,
            event_types::MAX_ITERATIONS_REACHED,
            &format!(
                "issue #{} failed after {} iterations",
                issue.issue_number, issue.current_iteration
            ),
            &comment,
        )
        .await
    }

    /// Escalation after the review budget is spent
    pub async fn handle_max_review_iterations_reached(
        &self,
        repo: &WatchedRepo,
        issue: &mut TrackedIssue,
    ) -> StateResponse<()> {
        warn!(
            repo = %repo.full_name(),
            issue = issue.issue_number,
            review_iterations = issue.current_review_iteration,
            "review budget exhausted, escalating"
        );

        let comment = self.review_failure_comment(repo, issue).await;
        self.escalate(
            repo,
            issue,
            event_types::MAX_REVIEW_ITERATIONS_REACHED,
            &format!(
                "issue #{} failed review after {} review iterations",
                issue.issue_number, issue.current_review_iteration
            ),
            &comment,
        )
        .await
    }

    /// Common escalation ladder; steps 3 and 4 are guarded
    async fn escalate(
        &self,
        repo: &WatchedRepo,
        issue: &mut TrackedIssue,
        event_type: &str,
        notice: &str,
        comment: &str,
    ) -> StateResponse<()> {
        // 1. Durable failure state first, so a crash mid-escalation still
        //    leaves the issue out of rotation.
        issue.set_status(IssueStatus::Failed);
        issue.set_phase(None);
        self.state.update_issue(issue.clone()).await?;

        let repo_ref = RepoRef::new(&repo.owner, &repo.name);

        // 2. Best-effort label.
        if let Err(e) = self.github.add_labels(&repo_ref, issue.issue_number, &[NEEDS_HUMAN_LABEL]).await {
            warn!(issue = issue.issue_number, error = %e, "failed to add needs-human label, continuing");
        }

        // 3. Best-effort comment.
        if let Err(e) = self.github.add_comment(&repo_ref, issue.issue_number, comment).await {
            warn!(issue = issue.issue_number, error = %e, "failed to post escalation comment, continuing");
        }

        // 4. Cooldown.
        self.enter_cooldown(issue).await?;

        // 5. Operator notice and durable event.
        self.notifier.warn_for(&repo.full_name(), issue.issue_number, notice);
        self.events
            .record(event_type, Some(repo.id), Some(issue.id), notice)
            .await;
        Ok(())
    }

    /// A human rejected the change: log the feedback and put the issue back
    /// into the workflow within its existing budget
    pub async fn handle_human_rejection(&self, issue: &mut TrackedIssue, feedback: &str) -> StateResponse<()> {
        debug!(issue = issue.issue_number, "human rejection received");
        self.events
            .record(
                event_types::HUMAN_REJECTION,
                Some(issue.repo_id),
                Some(issue.id),
                feedback,
            )
            .await;
        issue.set_status(IssueStatus::InProgress);
        self.state.update_issue(issue.clone()).await
    }

    async fn implementation_failure_comment(&self, repo: &WatchedRepo, issue: &TrackedIssue) -> String {
        let latest = self.state.latest_iteration(issue.id).await.ok().flatten();
        let assessment = latest
            .as_ref()
            .and_then(|r| r.self_assessment.as_deref())
            .unwrap_or("(none recorded)");
        let ci = latest
            .as_ref()
            .and_then(|r| r.ci_result.as_deref())
            .unwrap_or("(none recorded)");

        format!(
            "## Max Iterations Reached\n\n\
             Failed after {} iterations (budget: {}).\n\n\
             **Last self-assessment:**\n\n{}\n\n\
             **Last CI result:**\n\n{}\n\n\
             Automated work is paused for {} hours. Remove the `{}` label and close or fix the \
             blockers before the next attempt.",
            issue.current_iteration,
            repo.max_iterations,
            truncate(&redact::sanitize(assessment), SHORT_FIELD_LIMIT),
            truncate(&redact::sanitize(ci), LONG_FIELD_LIMIT),
            COOLDOWN_HOURS,
            NEEDS_HUMAN_LABEL,
        )
    }

    async fn review_failure_comment(&self, repo: &WatchedRepo, issue: &TrackedIssue) -> String {
        let latest = self.state.latest_iteration(issue.id).await.ok().flatten();
        let findings = latest
            .as_ref()
            .and_then(|r| r.review_json.as_deref())
            .map(|json| match serde_json::from_str::<crate::tools::ReviewVerdict>(json) {
                Ok(verdict) => format!("{}\n\n{}", verdict.summary, verdict.findings_text()),
                Err(_) => json.to_string(),
            })
            .unwrap_or_else(|| "(none recorded)".to_string());

        format!(
            "## Max Review Iterations Reached\n\n\
             Failed after {} review iterations (budget: {}).\n\n\
             **Last review findings:**\n\n{}\n\n\
             Automated work is paused for {} hours. Remove the `{}` label after resolving.",
            issue.current_review_iteration,
            repo.max_review_iterations,
            truncate(&redact::sanitize(&findings), LONG_FIELD_LIMIT),
            COOLDOWN_HOURS,
            NEEDS_HUMAN_LABEL,
        )
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit).collect();
    out.push_str("...");
    out
}
