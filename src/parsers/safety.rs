//! Safety (Python dependency scanner) output parser.
//!
//! Accepts the wrapper object `{"SafetyIssues": [...]}` and the bare CLI
//! format (a list of `[package, spec, version, advisory, id]` rows). Any
//! issue fails the job. A clean result only replaces the stored output and
//! leaves the verdict unset.

use serde::Deserialize;
use serde_json::Value;

use crate::models::analysis::Verdict;
use crate::models::issue::{Issue, Severity};
use crate::parsers::{has_errors, ParseOutcome, Parser, NO_ISSUES};

#[derive(Default)]
pub struct SafetyParser;

impl SafetyParser {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SafetyOutput {
    Rows(Vec<SafetyRow>),
    Wrapped {
        #[serde(default, rename = "SafetyIssues", alias = "issues")]
        issues: Vec<SafetyIssue>,
        #[serde(default)]
        errors: Option<Value>,
    },
}

#[derive(Debug, Deserialize)]
struct SafetyIssue {
    #[serde(default, rename = "Dependency")]
    dependency: String,
    #[serde(default, rename = "Below")]
    below: String,
    #[serde(default, rename = "Version")]
    version: String,
    #[serde(default, rename = "Comment")]
    comment: String,
    #[serde(default, rename = "ID")]
    id: Value,
}

/// `[package, affected spec, installed version, advisory, id]`.
#[derive(Debug, Deserialize)]
struct SafetyRow(String, String, String, String, Value);

impl From<SafetyRow> for SafetyIssue {
    fn from(row: SafetyRow) -> Self {
        Self {
            dependency: row.0,
            below: row.1,
            version: row.2,
            comment: row.3,
            id: row.4,
        }
    }
}

impl Parser for SafetyParser {
    fn parse(&self, raw: &str) -> Result<ParseOutcome, anyhow::Error> {
        let (found, errors): (Vec<SafetyIssue>, Option<Value>) = match serde_json::from_str(raw)? {
            SafetyOutput::Rows(rows) => (rows.into_iter().map(Into::into).collect(), None),
            SafetyOutput::Wrapped { issues, errors } => (issues, errors),
        };

        if has_errors(&errors) {
            return Ok(ParseOutcome::verdict(Verdict::Error, Vec::new()));
        }

        if found.is_empty() {
            return Ok(ParseOutcome {
                verdict: None,
                output: Some(NO_ISSUES.to_string()),
                ..Default::default()
            });
        }

        let issues = found
            .into_iter()
            .map(|i| Issue {
                severity: self.map_severity(""),
                original_severity: String::new(),
                confidence: None,
                title: match &i.id {
                    Value::Null => i.dependency.clone(),
                    Value::String(id) => format!("{} ({id})", i.dependency),
                    id => format!("{} ({id})", i.dependency),
                },
                details: i.comment,
                file: None,
                line: None,
                code: Some(format!("{}=={} (affected {})", i.dependency, i.version, i.below)),
            })
            .collect();

        Ok(ParseOutcome::verdict(Verdict::Failed, issues))
    }

    fn source_tool(&self) -> &str {
        "Safety"
    }

    /// Safety reports no severity; every advisory is treated as high.
    fn map_severity(&self, _tool_severity: &str) -> Severity {
        Severity::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::evaluate;

    #[test]
    fn wrapped_issue_fails() {
        let raw = r#"{"SafetyIssues":[{"Dependency":"django","Below":"<1.11.19","Version":"1.11.0","Comment":"CVE-2019-6975","ID":36883}]}"#;
        let evaluation = evaluate(&SafetyParser::new(), raw);
        assert_eq!(evaluation.verdict, Some(Verdict::Failed));
        assert_eq!(evaluation.issues[0].title, "django (36883)");
        assert_eq!(evaluation.issues[0].details, "CVE-2019-6975");
    }

    #[test]
    fn cli_rows_are_accepted() {
        let raw = r#"[["requests","<2.20.0","2.19.1","Requests before 2.20.0 sends an HTTP Authorization header...","36546"]]"#;
        let evaluation = evaluate(&SafetyParser::new(), raw);
        assert_eq!(evaluation.verdict, Some(Verdict::Failed));
        assert_eq!(evaluation.issues[0].title, "requests (36546)");
        assert_eq!(
            evaluation.issues[0].code.as_deref(),
            Some("requests==2.19.1 (affected <2.20.0)")
        );
    }

    #[test]
    fn clean_result_replaces_output_but_leaves_verdict_unset() {
        let evaluation = evaluate(&SafetyParser::new(), r#"{"SafetyIssues":[]}"#);
        assert_eq!(evaluation.verdict, None);
        assert_eq!(evaluation.output, NO_ISSUES);

        let evaluation = evaluate(&SafetyParser::new(), "[]");
        assert_eq!(evaluation.verdict, None);
    }
}
