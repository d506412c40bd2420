//! External tool adapters
//!
//! The code-generation and reviewer tools are opaque subprocesses. The
//! adapters own spawning, streaming, timeouts, and output decoding; the
//! engine only sees typed outcomes.

mod codegen;
mod reviewer;

pub use codegen::{CodegenCommand, CodegenOutcome, CodegenTool};
pub use reviewer::{
    FindingCategory, FindingSeverity, ReviewFinding, ReviewOutcome, ReviewVerdict, ReviewerCommand, ReviewerTool,
};

use thiserror::Error;

/// How much raw tool output to retain for audit storage
pub const RAW_OUTPUT_LIMIT: usize = 256 * 1024;

/// Errors from tool subprocess execution
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to spawn tool: {0}")]
    Spawn(String),

    #[error("tool timed out")]
    Timeout,

    /// Exit 0 but no usable result line in the stream
    #[error("tool produced no result")]
    NoResult { raw: String },

    #[error("tool exited with status {code}")]
    NonZeroExit { code: i32, raw: String },

    #[error("tool output unparseable: {message}")]
    Parse { message: String, raw: String },
}

impl ToolError {
    /// Raw output captured before the failure, for audit storage
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::NoResult { raw } | Self::NonZeroExit { raw, .. } | Self::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Cap a string at `limit` characters, marking the cut
pub(crate) fn truncate_raw(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit).collect();
    out.push_str("\n[truncated]");
    out
}
