//! RetireJS (JavaScript dependency scanner) JSON output parser.
//!
//! Findings are nested `data[] → results[] → vulnerabilities[]`; any
//! vulnerability rated `high` or `medium` fails the job.

use serde::Deserialize;
use serde_json::Value;

use crate::models::analysis::Verdict;
use crate::models::issue::{Issue, Severity};
use crate::parsers::{has_errors, ParseOutcome, Parser};

#[derive(Default)]
pub struct RetireJsParser;

impl RetireJsParser {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct RetireJsOutput {
    #[serde(default)]
    data: Vec<RetireJsFile>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RetireJsFile {
    file: Option<String>,
    #[serde(default)]
    results: Vec<RetireJsResult>,
}

#[derive(Debug, Deserialize)]
struct RetireJsResult {
    #[serde(default)]
    component: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    vulnerabilities: Vec<RetireJsVulnerability>,
}

#[derive(Debug, Deserialize)]
struct RetireJsVulnerability {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    info: Vec<String>,
    below: Option<String>,
    #[serde(default)]
    identifiers: Option<Value>,
}

impl Parser for RetireJsParser {
    fn parse(&self, raw: &str) -> Result<ParseOutcome, anyhow::Error> {
        let output: RetireJsOutput = serde_json::from_str(raw)?;

        if has_errors(&output.errors) {
            return Ok(ParseOutcome::verdict(Verdict::Error, Vec::new()));
        }

        let mut failed = false;
        let mut issues = Vec::new();
        for file in output.data {
            for result in file.results {
                for vulnerability in result.vulnerabilities {
                    if matches!(vulnerability.severity.as_str(), "high" | "medium") {
                        failed = true;
                    }
                    let summary = vulnerability
                        .identifiers
                        .as_ref()
                        .and_then(|ids| ids.get("summary"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    issues.push(Issue {
                        severity: self.map_severity(&vulnerability.severity),
                        confidence: None,
                        title: format!("{}@{}", result.component, result.version),
                        details: summary.unwrap_or_else(|| vulnerability.info.join(" ")),
                        file: file.file.clone(),
                        line: None,
                        code: vulnerability.below.map(|b| format!("fixed in {b}")),
                        original_severity: vulnerability.severity,
                    });
                }
            }
        }

        if issues.is_empty() {
            return Ok(ParseOutcome::no_issues());
        }

        let verdict = if failed { Verdict::Failed } else { Verdict::Passed };
        Ok(ParseOutcome::verdict(verdict, issues))
    }

    fn source_tool(&self) -> &str {
        "RetireJS"
    }

    fn map_severity(&self, tool_severity: &str) -> Severity {
        match tool_severity.to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Info,
        }
    }

    fn cloning_failure_verdict(&self) -> Verdict {
        Verdict::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{evaluate, NO_ISSUES};

    #[test]
    fn nested_medium_vulnerability_fails() {
        let raw = r#"{
            "version": "2.0.3",
            "data": [{
                "file": "/code/public/jquery.js",
                "results": [{
                    "component": "jquery",
                    "version": "1.8.1",
                    "detection": "filecontent",
                    "vulnerabilities": [{
                        "info": ["https://github.com/jquery/jquery/issues/2432"],
                        "below": "1.9.0b1",
                        "severity": "medium",
                        "identifiers": {"issue": "2432", "summary": "3rd party CORS request may execute"}
                    }]
                }]
            }],
            "messages": [],
            "errors": []
        }"#;
        let evaluation = evaluate(&RetireJsParser::new(), raw);
        assert_eq!(evaluation.verdict, Some(Verdict::Failed));
        let issue = &evaluation.issues[0];
        assert_eq!(issue.title, "jquery@1.8.1");
        assert_eq!(issue.details, "3rd party CORS request may execute");
        assert_eq!(issue.severity, Severity::Medium);
    }

    #[test]
    fn low_only_passes() {
        let raw = r#"{"data":[{"results":[{"component":"lodash","version":"4.17.4","vulnerabilities":[{"severity":"low","info":["x"]}]}]}],"errors":[]}"#;
        let evaluation = evaluate(&RetireJsParser::new(), raw);
        assert_eq!(evaluation.verdict, Some(Verdict::Passed));
        assert_eq!(evaluation.issues.len(), 1);
    }

    #[test]
    fn upper_case_severity_does_not_fail() {
        let raw = r#"{"data":[{"results":[{"component":"a","version":"1","vulnerabilities":[{"severity":"HIGH"}]}]}]}"#;
        let evaluation = evaluate(&RetireJsParser::new(), raw);
        assert_eq!(evaluation.verdict, Some(Verdict::Passed));
    }

    #[test]
    fn empty_data_passes_with_canonical_output() {
        let evaluation = evaluate(&RetireJsParser::new(), r#"{"data":[],"messages":[],"errors":[]}"#);
        assert_eq!(evaluation.verdict, Some(Verdict::Passed));
        assert_eq!(evaluation.output, NO_ISSUES);
    }
}
