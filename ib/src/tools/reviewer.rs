//! Independent reviewer adapter
//!
//! A second opaque tool reads a review brief (issue, changed files, diff)
//! and emits one JSON verdict object. The verdict that matters is computed
//! here, not taken from the tool: passing requires every dimension score at
//! or above the threshold and no high-severity finding, and a high-severity
//! security finding caps the security score below the bar unconditionally.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{RAW_OUTPUT_LIMIT, ToolError, truncate_raw};

/// Minimum per-dimension score for a passing review
pub const PASS_THRESHOLD: f64 = 0.7;

/// Score a high-severity security finding forces (must stay below 0.3)
const SECURITY_CAP: f64 = 0.29;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    SpecCompliance,
    Correctness,
    CodeQuality,
    TestCoverage,
    ArchitectureFit,
    Regressions,
    Security,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFinding {
    pub severity: FindingSeverity,
    pub category: FindingCategory,
    pub file: String,
    #[serde(default)]
    pub line: Option<u64>,
    pub finding: String,
    #[serde(default)]
    pub suggestion: String,
}

/// The reviewer's verdict object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewVerdict {
    /// The tool's own claim; superseded by [`ReviewVerdict::passes`]
    pub passed: bool,
    #[serde(default)]
    pub summary: String,
    pub spec_compliance_score: f64,
    pub correctness_score: f64,
    pub code_quality_score: f64,
    pub test_coverage_score: f64,
    pub architecture_fit_score: f64,
    pub regressions_score: f64,
    pub security_score: f64,
    #[serde(default)]
    pub findings: Vec<ReviewFinding>,
    #[serde(default)]
    pub advice: String,
    /// Token usage, when the tool reports it
    #[serde(default)]
    pub usage: Option<ReviewUsage>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReviewUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl ReviewVerdict {
    fn scores(&self) -> [f64; 7] {
        [
            self.spec_compliance_score,
            self.correctness_score,
            self.code_quality_score,
            self.test_coverage_score,
            self.architecture_fit_score,
            self.regressions_score,
            self.security_score,
        ]
    }

    fn has_high_finding(&self) -> bool {
        self.findings.iter().any(|f| f.severity == FindingSeverity::High)
    }

    fn has_high_security_finding(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity == FindingSeverity::High && f.category == FindingCategory::Security)
    }

    /// Enforce invariants the tool cannot be trusted with
    pub fn normalize(&mut self) {
        if self.has_high_security_finding() && self.security_score >= 0.3 {
            self.security_score = SECURITY_CAP;
        }
        self.passed = self.passes();
    }

    /// True iff all dimension scores meet the threshold and no finding is
    /// high severity
    pub fn passes(&self) -> bool {
        self.scores().iter().all(|s| *s >= PASS_THRESHOLD) && !self.has_high_finding()
    }

    /// Findings rendered for prompts and escalation comments
    pub fn findings_text(&self) -> String {
        self.findings
            .iter()
            .map(|f| {
                let location = match f.line {
                    Some(line) => format!("{}:{}", f.file, line),
                    None => f.file.clone(),
                };
                format!("- [{:?}/{:?}] {}: {}", f.severity, f.category, location, f.finding)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Outcome of one reviewer invocation
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub verdict: ReviewVerdict,
    /// Raw stdout, bounded, stored for audit
    pub raw_output: String,
    /// Model identity the adapter was configured with
    pub model: String,
}

/// Contract for the reviewer subprocess
#[async_trait]
pub trait ReviewerTool: Send + Sync {
    async fn review(&self, brief_file: &Path, workdir: &Path) -> Result<ReviewOutcome, ToolError>;

    async fn probe(&self) -> bool;
}

/// Subprocess-backed implementation
#[derive(Debug, Clone)]
pub struct ReviewerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    /// Recorded as the review model in iteration and cost rows
    pub model: String,
}

impl ReviewerCommand {
    pub fn new(program: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: Duration::from_secs(600),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ReviewerTool for ReviewerCommand {
    async fn review(&self, brief_file: &Path, workdir: &Path) -> Result<ReviewOutcome, ToolError> {
        debug!(program = %self.program, brief = %brief_file.display(), "running reviewer tool");

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.program)
                .args(&self.args)
                .arg(brief_file)
                .arg(workdir)
                .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .current_dir(workdir)
                .stderr(Stdio::null())
                .output(),
        )
        .await;

        let output = match output {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ToolError::Spawn(e.to_string())),
            Err(_) => {
                warn!(program = %self.program, "reviewer tool timed out");
                return Err(ToolError::Timeout);
            }
        };

        let raw = truncate_raw(&String::from_utf8_lossy(&output.stdout), RAW_OUTPUT_LIMIT);

        if !output.status.success() {
            return Err(ToolError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                raw,
            });
        }

        // One JSON object, possibly padded with whitespace or stray chatter;
        // take the outermost braces.
        let trimmed = raw.trim();
        let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => {
                return Err(ToolError::Parse {
                    message: "no JSON object in reviewer output".to_string(),
                    raw,
                });
            }
        };

        let mut verdict: ReviewVerdict = serde_json::from_str(candidate).map_err(|e| ToolError::Parse {
            message: e.to_string(),
            raw: raw.clone(),
        })?;
        verdict.normalize();

        Ok(ReviewOutcome {
            verdict,
            raw_output: raw,
            model: self.model.clone(),
        })
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

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict_with_scores(score: f64) -> ReviewVerdict {
        ReviewVerdict {
            passed: true,
            summary: "looks fine".to_string(),
            spec_compliance_score: score,
            correctness_score: score,
            code_quality_score: score,
            test_coverage_score: score,
            architecture_fit_score: score,
            regressions_score: score,
            security_score: score,
            findings: Vec::new(),
            advice: String::new(),
            usage: None,
        }
    }

    fn high_finding(category: FindingCategory) -> ReviewFinding {
        ReviewFinding {
            severity: FindingSeverity::High,
            category,
            file: "src/auth.rs".to_string(),
            line: Some(42),
            finding: "token written to log".to_string(),
            suggestion: "redact before logging".to_string(),
        }
    }

    #[test]
    fn test_all_scores_at_threshold_pass() {
        let verdict = verdict_with_scores(0.7);
        assert!(verdict.passes());
    }

    #[test]
    fn test_one_low_score_fails() {
        let mut verdict = verdict_with_scores(0.9);
        verdict.test_coverage_score = 0.69;
        assert!(!verdict.passes());
    }

    #[test]
    fn test_high_finding_fails_even_with_good_scores() {
        let mut verdict = verdict_with_scores(0.95);
        verdict.findings.push(high_finding(FindingCategory::Correctness));
        assert!(!verdict.passes());
    }

    #[test]
    fn test_high_security_finding_caps_score_and_fails() {
        let mut verdict = verdict_with_scores(0.95);
        verdict.findings.push(high_finding(FindingCategory::Security));
        verdict.normalize();
        assert!(verdict.security_score < 0.3);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_normalize_overrides_the_tools_own_claim() {
        let mut verdict = verdict_with_scores(0.5);
        verdict.passed = true;
        verdict.normalize();
        assert!(!verdict.passed);
    }

    #[test]
    fn test_verdict_parses_camel_case_wire_shape() {
        let json = r#"{
            "passed": true,
            "summary": "solid change",
            "specComplianceScore": 0.9,
            "correctnessScore": 0.85,
            "codeQualityScore": 0.8,
            "testCoverageScore": 0.75,
            "architectureFitScore": 0.9,
            "regressionsScore": 0.95,
            "securityScore": 0.9,
            "findings": [
                {"severity": "medium", "category": "code_quality", "file": "src/lib.rs",
                 "finding": "long function", "suggestion": "split it"}
            ],
            "advice": "none"
        }"#;
        let verdict: ReviewVerdict = serde_json::from_str(json).unwrap();
        assert!(verdict.passes());
        assert_eq!(verdict.findings.len(), 1);
        assert_eq!(verdict.findings[0].severity, FindingSeverity::Medium);
        assert!(verdict.findings_text().contains("src/lib.rs"));
    }
}
