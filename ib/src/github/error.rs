//! Upstream error taxonomy

use thiserror::Error;

/// Errors from the repository-service adapter
#[derive(Debug, Error)]
pub enum GithubError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 429 after exhausting the retry budget
    #[error("rate limited by upstream")]
    RateLimited,

    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success status (body already sanitized and truncated)
    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("git: {0}")]
    Git(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl GithubError {
    /// Errors that may clear up on retry at a higher level (next iteration,
    /// next poll cycle) as opposed to permanent upstream refusals
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GithubError::RateLimited.is_transient());
        assert!(
            GithubError::Status {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !GithubError::Status {
                status: 403,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!GithubError::NotFound("repo".into()).is_transient());
        assert!(!GithubError::Git("conflict".into()).is_transient());
    }
}
