//! Wire types for the repository-service adapter

use serde::{Deserialize, Serialize};

/// `(owner, name)` pair identifying an upstream repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

/// An upstream issue as the adapter exposes it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    /// "open" | "closed"
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Present when the "issue" is actually a pull request; filtered out
    /// by the listing call
    #[serde(default, skip_serializing)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_closed(&self) -> bool {
        self.state == "closed"
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub html_url: String,
}

/// CI verdict for a git ref
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiStatus {
    Pending,
    Success,
    Failure,
    TimedOut,
    /// No checks configured for the ref
    NotApplicable,
}

/// Changed files and unified diff of a working branch against its base
#[derive(Debug, Clone, Default)]
pub struct BranchDiff {
    pub files: Vec<String>,
    pub patch: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_deserializes_from_api_shape() {
        let json = r#"{
            "number": 20,
            "title": "Add retry logic",
            "body": "**Blocked by:** #10, #15",
            "state": "open",
            "labels": [{"name": "agent-ready"}, {"name": "bug"}]
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.number, 20);
        assert!(!issue.is_closed());
        assert!(issue.has_label("agent-ready"));
        assert!(!issue.has_label("needs-human"));
        assert!(issue.pull_request.is_none());
    }

    #[test]
    fn test_pull_request_entries_are_detectable() {
        let json = r#"{"number": 3, "state": "open", "pull_request": {"url": "x"}}"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert!(issue.pull_request.is_some());
    }
}
