//! Gosec (Go SAST) JSON output parser. `gas` is the tool's former name and
//! emits the same format.

use serde::Deserialize;
use serde_json::Value;

use crate::models::analysis::Verdict;
use crate::models::issue::{Confidence, Issue, Severity};
use crate::parsers::bandit::is_blocking;
use crate::parsers::{has_errors, ParseOutcome, Parser};

pub struct GosecParser {
    tool: &'static str,
}

impl Default for GosecParser {
    fn default() -> Self {
        Self::new()
    }
}

impl GosecParser {
    pub fn new() -> Self {
        Self { tool: "Gosec" }
    }

    pub fn gas() -> Self {
        Self { tool: "Gas" }
    }
}

#[derive(Debug, Deserialize)]
struct GosecOutput {
    #[serde(default, rename = "Issues")]
    issues: Option<Vec<GosecIssue>>,
    #[serde(default, rename = "Golang errors")]
    golang_errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GosecIssue {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    confidence: String,
    #[serde(default)]
    rule_id: String,
    #[serde(default)]
    details: String,
    file: Option<String>,
    code: Option<String>,
    line: Option<String>,
}

impl Parser for GosecParser {
    fn parse(&self, raw: &str) -> Result<ParseOutcome, anyhow::Error> {
        let output: GosecOutput = serde_json::from_str(raw)?;
        let found = output.issues.unwrap_or_default();

        if has_errors(&output.golang_errors) {
            let issues = found.into_iter().map(|i| self.to_issue(i)).collect();
            return Ok(ParseOutcome::verdict(Verdict::Error, issues));
        }
        if found.is_empty() {
            return Ok(ParseOutcome::no_issues());
        }

        let failed = found
            .iter()
            .any(|i| is_blocking(&i.severity, &i.confidence));
        let issues = found.into_iter().map(|i| self.to_issue(i)).collect();

        let verdict = if failed { Verdict::Failed } else { Verdict::Passed };
        Ok(ParseOutcome::verdict(verdict, issues))
    }

    fn source_tool(&self) -> &str {
        self.tool
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

impl GosecParser {
    fn to_issue(&self, issue: GosecIssue) -> Issue {
        Issue {
            severity: self.map_severity(&issue.severity),
            confidence: Confidence::parse(&issue.confidence),
            title: issue.rule_id,
            details: issue.details,
            file: issue.file,
            line: issue.line,
            code: issue.code,
            original_severity: issue.severity,
        }
    }
}
