//! Brakeman (Rails SAST) JSON output parser.
//!
//! Any warning fails the job. Cloning failures and unparseable output are
//! reported as `failed` rather than `error` for this tool.

use serde::Deserialize;
use serde_json::Value;

use crate::models::analysis::Verdict;
use crate::models::issue::{Confidence, Issue, Severity};
use crate::parsers::{has_errors, ParseOutcome, Parser};

#[derive(Default)]
pub struct BrakemanParser;

impl BrakemanParser {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct BrakemanOutput {
    #[serde(default)]
    warnings: Vec<BrakemanWarning>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BrakemanWarning {
    #[serde(default)]
    warning_type: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    confidence: String,
    file: Option<String>,
    line: Option<u64>,
    code: Option<String>,
    link: Option<String>,
}

impl Parser for BrakemanParser {
    fn parse(&self, raw: &str) -> Result<ParseOutcome, anyhow::Error> {
        let output: BrakemanOutput = serde_json::from_str(raw)?;

        if has_errors(&output.errors) {
            return Ok(ParseOutcome::verdict(Verdict::Error, Vec::new()));
        }
        if output.warnings.is_empty() {
            return Ok(ParseOutcome::no_issues());
        }

        let issues = output
            .warnings
            .into_iter()
            .map(|w| Issue {
                severity: self.map_severity(&w.confidence),
                confidence: Confidence::parse(&w.confidence),
                title: w.warning_type,
                details: match w.link {
                    Some(link) => format!("{} ({link})", w.message),
                    None => w.message,
                },
                file: w.file,
                line: w.line.map(|l| l.to_string()),
                code: w.code,
                original_severity: w.confidence,
            })
            .collect();

        Ok(ParseOutcome::verdict(Verdict::Failed, issues))
    }

    fn source_tool(&self) -> &str {
        "Brakeman"
    }

    /// Brakeman has no severity field; its confidence level stands in for it.
    fn map_severity(&self, tool_severity: &str) -> Severity {
        match tool_severity.to_lowercase().as_str() {
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "weak" | "low" => Severity::Low,
            _ => Severity::Medium,
        }
    }

    fn cloning_failure_verdict(&self) -> Verdict {
        Verdict::Failed
    }

    fn malformed_verdict(&self) -> Verdict {
        Verdict::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{evaluate, NO_ISSUES};

    #[test]
    fn any_warning_fails() {
        let raw = r#"{
            "scan_info": {"app_path": "/code"},
            "warnings": [{
                "warning_type": "SQL Injection",
                "message": "Possible SQL injection",
                "file": "app/models/user.rb",
                "line": 7,
                "link": "https://brakemanscanner.org/docs/warning_types/sql_injection/",
                "code": "User.where(\"name = #{params[:name]}\")",
                "confidence": "Weak"
            }],
            "errors": []
        }"#;
        let evaluation = evaluate(&BrakemanParser::new(), raw);
        assert_eq!(evaluation.verdict, Some(Verdict::Failed));
        assert_eq!(evaluation.issues[0].severity, Severity::Low);
        assert_eq!(evaluation.issues[0].confidence, Some(Confidence::Low));
    }

    #[test]
    fn no_warnings_passes() {
        let evaluation = evaluate(&BrakemanParser::new(), r#"{"warnings":[],"errors":[]}"#);
        assert_eq!(evaluation.verdict, Some(Verdict::Passed));
        assert_eq!(evaluation.output, NO_ISSUES);
    }

    #[test]
    fn non_json_output_fails() {
        let evaluation = evaluate(&BrakemanParser::new(), "Please supply the path to a Rails application.");
        assert_eq!(evaluation.verdict, Some(Verdict::Failed));
    }

    #[test]
    fn wrapper_errors_force_error() {
        let raw = r#"{"warnings":[],"errors":[{"error":"parse error","location":"app/a.rb"}]}"#;
        let evaluation = evaluate(&BrakemanParser::new(), raw);
        assert_eq!(evaluation.verdict, Some(Verdict::Error));
    }
}
