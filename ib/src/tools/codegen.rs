//! Code-generation tool adapter
//!
//! Invoked as `program [args...] <prompt-file> <workdir>` with credentials in
//! the environment. Emits line-delimited JSON on stdout; the first line of
//! `type == "result"` carries the final text, model id, and token usage.
//! Anything that is not JSON, or not a result line, is tolerated and
//! discarded.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use super::{RAW_OUTPUT_LIMIT, ToolError, truncate_raw};

/// Outcome of one code-generation invocation
#[derive(Debug, Clone)]
pub struct CodegenOutcome {
    /// Final textual output from the result line
    pub result_text: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Everything the tool printed, bounded, for audit storage
    pub raw_output: String,
}

/// Contract for the code-generation subprocess
#[async_trait]
pub trait CodegenTool: Send + Sync {
    async fn run(&self, prompt_file: &Path, workdir: &Path) -> Result<CodegenOutcome, ToolError>;

    /// True when a probe subprocess exits 0
    async fn probe(&self) -> bool;
}

/// One line of the tool's stdout stream
#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Subprocess-backed implementation
#[derive(Debug, Clone)]
pub struct CodegenCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment (credentials) passed to the child
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CodegenCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: Duration::from_secs(1_800),
        }
    }
}

#[async_trait]
impl CodegenTool for CodegenCommand {
    async fn run(&self, prompt_file: &Path, workdir: &Path) -> Result<CodegenOutcome, ToolError> {
        debug!(program = %self.program, prompt = %prompt_file.display(), "running code-generation tool");

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(prompt_file)
            .arg(workdir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ToolError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Spawn("failed to capture stdout".to_string()))?;

        // Drain stdout on its own task so a chatty tool cannot deadlock on a
        // full pipe while we wait for it to exit.
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut raw = String::new();
            let mut result: Option<StreamLine> = None;
            while let Ok(Some(line)) = lines.next_line().await {
                if raw.len() < RAW_OUTPUT_LIMIT {
                    raw.push_str(&line);
                    raw.push('\n');
                }
                if result.is_none() {
                    match serde_json::from_str::<StreamLine>(&line) {
                        Ok(parsed) if parsed.kind == "result" => result = Some(parsed),
                        Ok(_) => {}
                        // Garbage lines are expected; first result line wins.
                        Err(_) => {}
                    }
                }
            }
            (raw, result)
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(ToolError::Spawn(e.to_string())),
            Err(_) => {
                warn!(program = %self.program, "code-generation tool timed out, killing");
                let _ = child.kill().await;
                return Err(ToolError::Timeout);
            }
        };

        let (raw, result) = reader_task.await.unwrap_or_default();
        let raw = truncate_raw(&raw, RAW_OUTPUT_LIMIT);

        if !status.success() {
            return Err(ToolError::NonZeroExit {
                code: status.code().unwrap_or(-1),
                raw,
            });
        }

        match result {
            Some(line) => {
                let usage = line.usage.unwrap_or_default();
                Ok(CodegenOutcome {
                    result_text: line.result.unwrap_or_default(),
                    model: line.model.unwrap_or_else(|| "unknown".to_string()),
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    raw_output: raw,
                })
            }
            None => Err(ToolError::NoResult { raw }),
        }
    }

    async fn probe(&self) -> bool {
        tokio::process::Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
