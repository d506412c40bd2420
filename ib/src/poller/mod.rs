//! Polling service
//!
//! A single timer scans every watched repo: qualify labeled issues, gate
//! them on their blockers, and dispatch the runnable ones into the workflow
//! engine in topological order. Workflow executions run on their own tasks,
//! bounded by a semaphore; the dispatch step is the only coordination
//! point.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use eyre::{Context, Result};
use futures::future::join_all;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use issuestore::{IssueStatus, TrackedIssue, WatchedRepo};

use crate::deps::{DepResolver, topological_sort};
use crate::events::{EventLog, Notifier, types as event_types};
use crate::github::{RepoRef, RepoService};
use crate::metrics::Metrics;
use crate::state::StateManager;
use crate::workflow::{IterationManager, NEEDS_HUMAN_LABEL, WorkflowEngine};

/// Label that opts an issue into automated work
pub const AGENT_READY_LABEL: &str = "agent-ready";

/// Grace period for running workflows on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Configuration for the polling service
#[derive(Debug, Clone)]
pub struct PollServiceConfig {
    /// Seconds between poll cycles
    pub interval_secs: u64,

    /// Maximum concurrently running workflows
    pub max_concurrent_workflows: usize,
}

impl Default for PollServiceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            max_concurrent_workflows: 4,
        }
    }
}

/// The polling service: discovery, qualification, gating, dispatch
pub struct PollService {
    config: PollServiceConfig,
    state: StateManager,
    github: Arc<dyn RepoService>,
    resolver: DepResolver,
    engine: Arc<WorkflowEngine>,
    events: EventLog,
    notifier: Notifier,
    metrics: Arc<Metrics>,

    /// Concurrency limiter for workflow executions
    semaphore: Arc<Semaphore>,

    /// Running workflow tasks by tracked-issue id
    tasks: HashMap<i64, JoinHandle<()>>,

    /// Cancellation flags for running workflows
    cancels: HashMap<i64, watch::Sender<bool>>,
}

impl PollService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PollServiceConfig,
        state: StateManager,
        github: Arc<dyn RepoService>,
        resolver: DepResolver,
        engine: Arc<WorkflowEngine>,
        events: EventLog,
        notifier: Notifier,
        metrics: Arc<Metrics>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_workflows));
        Self {
            config,
            state,
            github,
            resolver,
            engine,
            events,
            notifier,
            metrics,
            semaphore,
            tasks: HashMap::new(),
            cancels: HashMap::new(),
        }
    }

    /// Run until a shutdown signal arrives
    pub async fn run(&mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!(interval = self.config.interval_secs, "polling service starting");

        // First cycle immediately; the interval's first tick fires at once.
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "poll cycle failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// One complete poll cycle over all watched repos
    pub async fn poll_once(&mut self) -> Result<()> {
        debug!("poll cycle start");
        self.reap_finished();

        let repos = self.state.list_repos().await.context("listing watched repos")?;
        for repo in &repos {
            if let Err(e) = self.scan_repo(repo).await {
                warn!(repo = %repo.full_name(), error = %e, "repo scan failed, continuing");
            }
        }

        self.reevaluate_blocked(&repos).await;
        self.dispatch_queued(&repos).await?;
        debug!("poll cycle complete");
        Ok(())
    }

    /// Wait for all in-flight workflows; used by one-shot mode
    pub async fn drain(&mut self) {
        let tasks: Vec<(i64, JoinHandle<()>)> = self.tasks.drain().collect();
        let results = join_all(tasks.into_iter().map(|(issue_id, handle)| async move {
            (issue_id, handle.await)
        }))
        .await;
        for (issue_id, result) in results {
            if let Err(e) = result {
                error!(issue_id, error = %e, "workflow task panicked");
            }
        }
        self.cancels.clear();
    }

    /// Signal cancellation to a running workflow
    pub fn cancel(&mut self, issue_id: i64) -> bool {
        match self.cancels.get(&issue_id) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    /// Discover and qualify candidates for one repo
    async fn scan_repo(&mut self, repo: &WatchedRepo) -> Result<()> {
        let repo_ref = RepoRef::new(&repo.owner, &repo.name);
        let candidates = match self.github.list_open_issues(&repo_ref, AGENT_READY_LABEL).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_not_found() => {
                warn!(repo = %repo.full_name(), "repository not found upstream");
                self.events
                    .record(event_types::REPO_GONE, Some(repo.id), None, &format!("{} not found", repo_ref))
                    .await;
                return Ok(());
            }
            Err(e) => return Err(e).context("listing candidate issues"),
        };

        for candidate in candidates {
            if candidate.has_label(NEEDS_HUMAN_LABEL) {
                continue;
            }
            if !self.qualifies(repo, candidate.number).await? {
                continue;
            }

            let deps = self.resolver.resolve(repo, candidate.number, candidate.body.as_deref()).await;
            if deps.has_cycle {
                warn!(repo = %repo.full_name(), issue = candidate.number, chain = %deps.chain, "dependency cycle");
                self.events
                    .record(event_types::DEPENDENCY_CYCLE, Some(repo.id), None, &deps.chain)
                    .await;
            }

            let mut issue = match self.state.find_issue(repo.id, candidate.number).await? {
                Some(existing) => existing,
                None => {
                    let mut fresh = TrackedIssue::new(repo.id, candidate.number, &candidate.title);
                    fresh.id = self.state.create_issue(fresh.clone()).await?;
                    self.events
                        .record(
                            event_types::DETECTED,
                            Some(repo.id),
                            Some(fresh.id),
                            &format!("#{} {}", candidate.number, candidate.title),
                        )
                        .await;
                    fresh
                }
            };

            issue.issue_title = candidate.title.clone();
            issue.set_blocked_by(&deps.all_blockers);
            if deps.is_runnable() {
                issue.set_status(IssueStatus::Queued);
                debug!(issue = candidate.number, "queued");
            } else {
                issue.set_status(IssueStatus::Blocked);
                debug!(issue = candidate.number, blockers = %issue.blocked_by_issues, "blocked");
            }
            self.state.update_issue(issue).await?;
        }
        Ok(())
    }

    /// Does this candidate get processed this cycle?
    ///
    /// Expired-cooldown and failed rows are reset to PENDING with zeroed
    /// counters and skipped; the next cycle picks them up as fresh work.
    async fn qualifies(&self, repo: &WatchedRepo, number: u64) -> Result<bool> {
        let Some(mut issue) = self.state.find_issue(repo.id, number).await? else {
            return Ok(true);
        };
        match issue.status {
            IssueStatus::Pending => Ok(true),
            IssueStatus::Cooldown if IterationManager::is_cooldown_expired(&issue) => {
                info!(issue = number, "cooldown expired, resetting for retry");
                issue.reset_for_retry();
                self.state.update_issue(issue).await?;
                Ok(false)
            }
            IssueStatus::Failed => {
                info!(issue = number, "failed issue revisited, resetting for retry");
                issue.reset_for_retry();
                self.state.update_issue(issue).await?;
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Move BLOCKED issues whose blockers cleared into the queue
    async fn reevaluate_blocked(&self, repos: &[WatchedRepo]) {
        let blocked = match self.state.list_issues_by_status(IssueStatus::Blocked).await {
            Ok(blocked) => blocked,
            Err(e) => {
                warn!(error = %e, "could not list blocked issues");
                return;
            }
        };

        for mut issue in blocked {
            let Some(repo) = repos.iter().find(|r| r.id == issue.repo_id) else {
                continue;
            };
            if self
                .resolver
                .all_blockers_resolved(repo, Some(&issue.blocked_by_issues))
                .await
            {
                info!(issue = issue.issue_number, "blockers cleared, queueing");
                issue.set_blocked_by(&[]);
                issue.set_status(IssueStatus::Queued);
                match self.state.update_issue_if_status(issue, IssueStatus::Blocked).await {
                    Ok(true) => {}
                    Ok(false) => debug!("blocked issue changed status underneath, skipping"),
                    Err(e) => warn!(error = %e, "failed to queue unblocked issue"),
                }
            }
        }
    }

    /// Dispatch QUEUED issues in topological order, one handoff at a time
    async fn dispatch_queued(&mut self, repos: &[WatchedRepo]) -> Result<()> {
        let queued = self.state.list_issues_by_status(IssueStatus::Queued).await?;
        if queued.is_empty() {
            return Ok(());
        }

        // Issue numbers are only unique within a repo, so sort per repo
        // group; groups run in ascending repo order.
        let mut groups: BTreeMap<i64, Vec<TrackedIssue>> = BTreeMap::new();
        for issue in queued {
            groups.entry(issue.repo_id).or_default().push(issue);
        }

        for (repo_id, group) in groups {
            let Some(repo) = repos.iter().find(|r| r.id == repo_id) else {
                continue;
            };
            let entries: Vec<(u64, Vec<u64>)> = group
                .iter()
                .map(|issue| (issue.issue_number, issue.blocked_by_list()))
                .collect();
            for number in topological_sort(&entries) {
                let issue = group
                    .iter()
                    .find(|i| i.issue_number == number)
                    .expect("sort output comes from the group")
                    .clone();
                self.dispatch_issue(repo, issue).await;
            }
        }
        Ok(())
    }

    /// Hand one issue to the engine on its own task
    async fn dispatch_issue(&mut self, repo: &WatchedRepo, issue: TrackedIssue) {
        if self.tasks.contains_key(&issue.id) {
            debug!(issue = issue.issue_number, "workflow already running, skipping dispatch");
            return;
        }

        // A free slot is required before the status flips; otherwise the
        // issue simply stays QUEUED for the next cycle.
        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            debug!(issue = issue.issue_number, "no workflow slots free, leaving queued");
            return;
        };

        let mut dispatched = issue.clone();
        dispatched.set_status(IssueStatus::InProgress);
        match self.state.update_issue_if_status(dispatched.clone(), IssueStatus::Queued).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(issue = issue.issue_number, "status changed underneath, skipping dispatch");
                return;
            }
            Err(e) => {
                warn!(issue = issue.issue_number, error = %e, "dispatch persistence failed");
                return;
            }
        }

        self.metrics.issues_dispatched.fetch_add(1, Ordering::Relaxed);
        self.events
            .record(
                event_types::DISPATCHED,
                Some(repo.id),
                Some(issue.id),
                &format!("#{} dispatched", issue.issue_number),
            )
            .await;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancels.insert(issue.id, cancel_tx);

        let engine = self.engine.clone();
        let state = self.state.clone();
        let notifier = self.notifier.clone();
        let repo = repo.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let issue_number = dispatched.issue_number;
            let issue_id = dispatched.id;
            match engine.run_issue(repo.clone(), dispatched, cancel_rx).await {
                Ok(outcome) => {
                    info!(issue = issue_number, ?outcome, "workflow finished");
                }
                Err(e) => {
                    // The handoff failed (lock contention, persistence);
                    // put the issue back in the queue for the next cycle.
                    error!(issue = issue_number, error = %e, "workflow errored");
                    notifier.warn_for(&repo.full_name(), issue_number, format!("workflow errored: {}", e));
                    if let Ok(Some(mut current)) = state.get_issue(issue_id).await
                        && current.status == IssueStatus::InProgress
                    {
                        current.set_status(IssueStatus::Queued);
                        let _ = state.update_issue_if_status(current, IssueStatus::InProgress).await;
                    }
                }
            }
        });
        self.tasks.insert(issue.id, handle);
    }

    /// Drop handles for workflows that already finished
    fn reap_finished(&mut self) {
        let finished: Vec<i64> = self
            .tasks
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for issue_id in finished {
            self.tasks.remove(&issue_id);
            self.cancels.remove(&issue_id);
        }
    }

    /// Cancel running workflows, wait briefly, abort stragglers
    async fn shutdown(&mut self) {
        info!(active = self.tasks.len(), "polling service shutting down");
        for tx in self.cancels.values() {
            let _ = tx.send(true);
        }

        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while !self.tasks.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(250)).await;
            self.reap_finished();
        }

        for (issue_id, handle) in self.tasks.drain() {
            warn!(issue_id, "aborting workflow after shutdown grace period");
            handle.abort();
        }
        self.cancels.clear();
    }
}
