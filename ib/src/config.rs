//! IssueBot configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use issuestore::{RepoMode, WatchedRepo};

/// Main IssueBot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watched repositories
    pub repos: Vec<RepoConfig>,

    /// Polling cadence and dispatch limits
    pub poll: PollConfig,

    /// Upstream repository-service access
    pub github: GithubConfig,

    /// Code-generation tool invocation
    pub codegen: CodegenConfig,

    /// Independent reviewer invocation
    pub reviewer: ReviewerConfig,

    /// Storage locations
    pub storage: StorageConfig,

    /// Admin surface credentials (absent = auth disabled)
    pub admin: AdminConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .issuebot.yml
        let local_config = PathBuf::from(".issuebot.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/issuebot/issuebot.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("issuebot").join("issuebot.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Check that the pieces the daemon needs at runtime are present
    pub fn validate(&self) -> Result<()> {
        if self.codegen.command.trim().is_empty() {
            eyre::bail!("codegen.command must be set");
        }
        if let Some(ref env) = self.github.token_env
            && std::env::var(env).is_err()
        {
            eyre::bail!("upstream token env var {} is not set", env);
        }
        if self.repos.is_empty() {
            tracing::warn!("no watched repos configured; the daemon will idle");
        }
        Ok(())
    }

    /// Resolve the upstream token from the configured env var
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok())
            .filter(|t| !t.is_empty())
    }

    /// Is the admin surface protected? Absent credentials disable auth.
    pub fn admin_auth_enabled(&self) -> bool {
        self.admin.username.is_some() && self.admin.password.is_some()
    }
}

/// Per-repo watch options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub owner: String,
    pub name: String,

    /// Default branch pull requests target
    pub branch: String,

    /// "autonomous" | "approval_gated"
    pub mode: RepoMode,

    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    #[serde(rename = "max-review-iterations")]
    pub max_review_iterations: u32,

    #[serde(rename = "ci-enabled")]
    pub ci_enabled: bool,

    #[serde(rename = "ci-timeout-minutes")]
    pub ci_timeout_minutes: u32,

    #[serde(rename = "auto-merge")]
    pub auto_merge: bool,

    #[serde(rename = "security-review-enabled")]
    pub security_review_enabled: bool,

    #[serde(rename = "allowed-paths")]
    pub allowed_paths: Vec<String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            name: String::new(),
            branch: "main".to_string(),
            mode: RepoMode::Autonomous,
            max_iterations: 5,
            max_review_iterations: 2,
            ci_enabled: true,
            ci_timeout_minutes: 15,
            auto_merge: false,
            security_review_enabled: false,
            allowed_paths: Vec::new(),
        }
    }
}

impl RepoConfig {
    /// Entity form for seeding the store at startup
    pub fn to_watched_repo(&self) -> WatchedRepo {
        let mut repo = WatchedRepo::new(&self.owner, &self.name);
        repo.default_branch = self.branch.clone();
        repo.mode = self.mode;
        repo.max_iterations = self.max_iterations;
        repo.max_review_iterations = self.max_review_iterations;
        repo.ci_enabled = self.ci_enabled;
        repo.ci_timeout_minutes = self.ci_timeout_minutes;
        repo.auto_merge = self.auto_merge;
        repo.security_review_enabled = self.security_review_enabled;
        repo.allowed_paths = if self.allowed_paths.is_empty() {
            None
        } else {
            Some(self.allowed_paths.join(","))
        };
        repo
    }
}

/// Polling cadence and dispatch limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between poll cycles
    #[serde(rename = "interval-secs")]
    pub interval_secs: u64,

    /// Maximum concurrently running workflows
    #[serde(rename = "max-concurrent-workflows")]
    pub max_concurrent_workflows: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            max_concurrent_workflows: 4,
        }
    }
}

/// Upstream repository-service access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    #[serde(rename = "api-base")]
    pub api_base: String,

    #[serde(rename = "clone-base")]
    pub clone_base: String,

    /// Environment variable holding the API token
    #[serde(rename = "token-env")]
    pub token_env: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            clone_base: "https://github.com".to_string(),
            token_env: Some("GITHUB_TOKEN".to_string()),
        }
    }
}

/// Code-generation tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    pub command: String,

    pub args: Vec<String>,

    /// Environment variable with the tool's API credential, forwarded to
    /// the subprocess
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: Vec::new(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            timeout_secs: 1_800,
        }
    }
}

/// Independent reviewer invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewerConfig {
    pub command: String,

    pub args: Vec<String>,

    /// Model identity recorded with review results
    pub model: String,

    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            command: "reviewbot".to_string(),
            args: Vec::new(),
            model: "claude-opus-4".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            timeout_secs: 600,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    #[serde(rename = "store-path")]
    pub store_path: PathBuf,

    /// Root for per-issue working directories
    #[serde(rename = "work-dir")]
    pub work_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("issuebot");
        Self {
            store_path: data_dir.join("issuebot.db"),
            work_dir: data_dir.join("work"),
        }
    }
}

/// Admin surface credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}
