//! The repository-service contract

use std::path::Path;

use async_trait::async_trait;

use super::error::GithubError;
use super::types::{BranchDiff, CiStatus, Issue, PullRequest, RepoRef};

/// Everything the daemon needs from the hosted repository service.
///
/// One implementation talks to the real API; tests substitute in-memory
/// fakes. Implementations are rate-limit-aware: 429 and 5xx retry with
/// jittered backoff up to 3 attempts before surfacing, other 4xx propagate
/// immediately.
#[async_trait]
pub trait RepoService: Send + Sync {
    /// Open issues carrying `label` (pull requests excluded)
    async fn list_open_issues(&self, repo: &RepoRef, label: &str) -> Result<Vec<Issue>, GithubError>;

    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<Issue, GithubError>;

    async fn add_labels(&self, repo: &RepoRef, number: u64, labels: &[&str]) -> Result<(), GithubError>;

    async fn remove_label(&self, repo: &RepoRef, number: u64, label: &str) -> Result<(), GithubError>;

    async fn add_comment(&self, repo: &RepoRef, number: u64, body: &str) -> Result<(), GithubError>;

    async fn close_issue(&self, repo: &RepoRef, number: u64) -> Result<(), GithubError>;

    /// Open a pull request for `head` into `base`, or refresh title/body of
    /// the one that already exists
    async fn create_or_update_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, GithubError>;

    async fn merge_pull_request(&self, repo: &RepoRef, number: u64) -> Result<(), GithubError>;

    /// Combined CI verdict for a ref
    async fn get_ci_status(&self, repo: &RepoRef, git_ref: &str) -> Result<CiStatus, GithubError>;

    /// Make `workdir` a checkout of the repo with `branch` (created from
    /// `base` when missing) checked out
    async fn prepare_workdir(&self, repo: &RepoRef, branch: &str, base: &str, workdir: &Path)
    -> Result<(), GithubError>;

    /// Commit everything in `workdir` and push `branch`; false when there
    /// was nothing to commit
    async fn push_branch(&self, repo: &RepoRef, branch: &str, workdir: &Path, message: &str)
    -> Result<bool, GithubError>;

    /// Changed files and patch of the working branch against `base`
    async fn diff_against_base(&self, repo: &RepoRef, base: &str, workdir: &Path) -> Result<BranchDiff, GithubError>;
}
