//! Repository-service adapter
//!
//! A behavior-only contract ([`RepoService`]) plus the concrete HTTP/git
//! implementation ([`GithubClient`]). Everything upstream-facing flows
//! through this one client so rate-limit handling lives in a single place.

mod client;
mod error;
mod service;
mod types;

pub use client::GithubClient;
pub use error::GithubError;
pub use service::RepoService;
pub use types::{BranchDiff, CiStatus, Issue, Label, PullRequest, RepoRef};
