//! Verdict parsers: raw scan-tool output to a verdict plus normalized issues.
//!
//! Each tool family implements `Parser`. The edge cases every tool shares
//! (cloning-failure marker, empty output, malformed output) are handled once
//! in `evaluate`, so individual parsers only see well-formed, non-empty input.

pub mod bandit;
pub mod brakeman;
pub mod enry;
pub mod gosec;
pub mod retirejs;
pub mod safety;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::AppError;
use crate::models::analysis::Verdict;
use crate::models::issue::{Issue, Severity};

/// Canonical output stored when a tool ran and found nothing.
pub const NO_ISSUES: &str = "No issues found.";

/// Substring a tool image prints when it could not fetch the source.
pub const CLONING_ERROR_MARKER: &str = "ERROR_CLONING";

/// What a parser concluded from well-formed output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    /// `None` leaves the job verdict unset.
    pub verdict: Option<Verdict>,
    /// Replacement for the stored output; `None` keeps the raw text.
    pub output: Option<String>,
    pub issues: Vec<Issue>,
    /// Languages reported by a detector tool, lowercased and de-duplicated.
    pub languages: Vec<String>,
}

impl ParseOutcome {
    pub fn verdict(verdict: Verdict, issues: Vec<Issue>) -> Self {
        Self {
            verdict: Some(verdict),
            issues,
            ..Default::default()
        }
    }

    /// A clean run: verdict passed and the canonical benign output.
    pub fn no_issues() -> Self {
        Self {
            verdict: Some(Verdict::Passed),
            output: Some(NO_ISSUES.to_string()),
            ..Default::default()
        }
    }
}

/// Trait for pluggable scan-tool output parsers.
pub trait Parser: Send + Sync {
    /// Parse non-empty raw output that carries no cloning-failure marker.
    fn parse(&self, raw: &str) -> Result<ParseOutcome, anyhow::Error>;

    /// The scan tool this parser handles.
    fn source_tool(&self) -> &str;

    /// Map a tool-specific severity string to the normalized severity.
    fn map_severity(&self, tool_severity: &str) -> Severity;

    /// Verdict forced when the output carries `CLONING_ERROR_MARKER`.
    fn cloning_failure_verdict(&self) -> Verdict {
        Verdict::Error
    }

    /// Verdict recorded when the output cannot be parsed.
    fn malformed_verdict(&self) -> Verdict {
        Verdict::Error
    }
}

/// Final result for one job's output, ready to be written to the job entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub verdict: Option<Verdict>,
    pub output: String,
    pub issues: Vec<Issue>,
    pub languages: Vec<String>,
}

/// Apply the shared edge-case rules, then the tool-specific parser.
pub fn evaluate(parser: &dyn Parser, raw: &str) -> Evaluation {
    if raw.contains(CLONING_ERROR_MARKER) {
        return Evaluation {
            verdict: Some(parser.cloning_failure_verdict()),
            output: format!("Container error: {raw}"),
            issues: Vec::new(),
            languages: Vec::new(),
        };
    }

    if raw.trim().is_empty() {
        return Evaluation {
            verdict: Some(Verdict::Passed),
            output: NO_ISSUES.to_string(),
            issues: Vec::new(),
            languages: Vec::new(),
        };
    }

    match parser.parse(raw) {
        Ok(outcome) => Evaluation {
            verdict: outcome.verdict,
            output: outcome.output.unwrap_or_else(|| raw.to_string()),
            issues: outcome.issues,
            languages: outcome.languages,
        },
        Err(e) => {
            let err = AppError::Parse(e.to_string());
            tracing::warn!(
                tool = parser.source_tool(),
                error = %err,
                "Keeping raw output"
            );
            Evaluation {
                verdict: Some(parser.malformed_verdict()),
                output: raw.to_string(),
                issues: Vec::new(),
                languages: Vec::new(),
            }
        }
    }
}

/// True when a wrapper `errors` field is present and non-empty.
pub(crate) fn has_errors(errors: &Option<Value>) -> bool {
    match errors {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Parser dispatch by security-test name.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn Parser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in parser.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("bandit", Arc::new(bandit::BanditParser::new()));
        registry.register("gosec", Arc::new(gosec::GosecParser::new()));
        registry.register("gas", Arc::new(gosec::GosecParser::gas()));
        registry.register("brakeman", Arc::new(brakeman::BrakemanParser::new()));
        registry.register("retirejs", Arc::new(retirejs::RetireJsParser::new()));
        registry.register("safety", Arc::new(safety::SafetyParser::new()));
        registry.register("enry", Arc::new(enry::EnryParser::new()));
        registry
    }

    pub fn register(&mut self, name: &str, parser: Arc<dyn Parser>) {
        self.parsers.insert(name.to_lowercase(), parser);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Parser>> {
        self.parsers.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parsers.contains_key(&name.to_lowercase())
    }

    /// Evaluate `raw` with the parser registered for `test_name`.
    pub fn dispatch(&self, test_name: &str, raw: &str) -> Result<Evaluation, AppError> {
        let parser = self
            .get(test_name)
            .ok_or_else(|| AppError::UnknownTool(test_name.to_string()))?;
        Ok(evaluate(parser.as_ref(), raw))
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.parsers.keys().collect();
        names.sort();
        f.debug_struct("ParserRegistry").field("parsers", &names).finish()
    }
}
