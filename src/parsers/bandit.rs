//! Bandit (Python SAST) JSON output parser.
//!
//! Fails the job on any issue whose severity is HIGH or MEDIUM with HIGH
//! confidence. A non-empty `errors` list marks the run as errored.

use serde::Deserialize;
use serde_json::Value;

use crate::models::analysis::Verdict;
use crate::models::issue::{Confidence, Issue, Severity};
use crate::parsers::{has_errors, ParseOutcome, Parser};

#[derive(Default)]
pub struct BanditParser;

impl BanditParser {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct BanditOutput {
    #[serde(default, alias = "issues")]
    results: Vec<BanditResult>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BanditResult {
    #[serde(default, alias = "severity")]
    issue_severity: String,
    #[serde(default, alias = "confidence")]
    issue_confidence: String,
    #[serde(default)]
    issue_text: String,
    #[serde(default)]
    test_id: String,
    #[serde(default)]
    test_name: String,
    filename: Option<String>,
    line_number: Option<u64>,
    code: Option<String>,
}

/// HIGH/MEDIUM severity with HIGH confidence.
pub(crate) fn is_blocking(severity: &str, confidence: &str) -> bool {
    matches!(severity, "HIGH" | "MEDIUM") && confidence == "HIGH"
}

impl Parser for BanditParser {
    fn parse(&self, raw: &str) -> Result<ParseOutcome, anyhow::Error> {
        let output: BanditOutput = serde_json::from_str(raw)?;

        if has_errors(&output.errors) && output.results.is_empty() {
            return Ok(ParseOutcome::verdict(Verdict::Error, Vec::new()));
        }
        if output.results.is_empty() {
            return Ok(ParseOutcome::no_issues());
        }

        let failed = output
            .results
            .iter()
            .any(|r| is_blocking(&r.issue_severity, &r.issue_confidence));

        let issues = output
            .results
            .into_iter()
            .map(|r| Issue {
                severity: self.map_severity(&r.issue_severity),
                confidence: Confidence::parse(&r.issue_confidence),
                title: if r.test_name.is_empty() {
                    r.test_id
                } else {
                    format!("{} {}", r.test_id, r.test_name)
                },
                details: r.issue_text,
                file: r.filename,
                line: r.line_number.map(|l| l.to_string()),
                code: r.code,
                original_severity: r.issue_severity,
            })
            .collect();

        let verdict = if has_errors(&output.errors) {
            Verdict::Error
        } else if failed {
            Verdict::Failed
        } else {
            Verdict::Passed
        };

        Ok(ParseOutcome::verdict(verdict, issues))
    }

    fn source_tool(&self) -> &str {
        "Bandit"
    }

    fn map_severity(&self, tool_severity: &str) -> Severity {
        match tool_severity.to_uppercase().as_str() {
            "HIGH" => Severity::High,
            "MEDIUM" => Severity::Medium,
            "LOW" => Severity::Low,
            _ => Severity::Info,
        }
    }
}
