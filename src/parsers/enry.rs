//! Enry language detector output parser.
//!
//! Enry prints `{"Go": ["main.go"], "Python": [...]}`; the keys are the
//! languages. Plain-text output is tokenized on non-alphabetic runs instead.

use std::collections::HashSet;

use regex::Regex;
use serde_json::{Map, Value};

use crate::models::analysis::Verdict;
use crate::models::issue::Severity;
use crate::parsers::{ParseOutcome, Parser};

#[derive(Default)]
pub struct EnryParser;

impl EnryParser {
    pub fn new() -> Self {
        Self
    }
}

/// Lowercase and de-duplicate, keeping first-seen order.
pub fn normalize_languages<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

impl Parser for EnryParser {
    fn parse(&self, raw: &str) -> Result<ParseOutcome, anyhow::Error> {
        let languages = match serde_json::from_str::<Map<String, Value>>(raw) {
            Ok(map) => normalize_languages(map.keys().map(String::as_str)),
            Err(_) => {
                let separator = Regex::new(r"[^A-Za-z]+")?;
                normalize_languages(separator.split(raw))
            }
        };

        Ok(ParseOutcome {
            verdict: Some(Verdict::Passed),
            output: None,
            issues: Vec::new(),
            languages,
        })
    }

    fn source_tool(&self) -> &str {
        "Enry"
    }

    fn map_severity(&self, _tool_severity: &str) -> Severity {
        Severity::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::evaluate;

    #[test]
    fn json_keys_become_languages() {
        let raw = r#"{"Go":["main.go"],"Python":["app.py","setup.py"]}"#;
        let evaluation = evaluate(&EnryParser::new(), raw);
        assert_eq!(evaluation.verdict, Some(Verdict::Passed));
        assert_eq!(evaluation.languages, vec!["go".to_string(), "python".to_string()]);
        assert_eq!(evaluation.output, raw);
    }

    #[test]
    fn json_keys_keep_detection_order() {
        let raw = r#"{"Python":["app.py"],"Go":["main.go"],"python":["setup.py"]}"#;
        let evaluation = evaluate(&EnryParser::new(), raw);
        assert_eq!(evaluation.languages, vec!["python".to_string(), "go".to_string()]);
    }

    #[test]
    fn text_output_is_tokenized_in_first_seen_order() {
        let evaluation = evaluate(&EnryParser::new(), "Python 62.5%\nGo 30%\r\npython, Ruby");
        assert_eq!(
            evaluation.languages,
            vec!["python".to_string(), "go".to_string(), "ruby".to_string()]
        );
    }

    #[test]
    fn normalize_languages_dedupes_case_insensitively() {
        assert_eq!(
            normalize_languages(["Go", "GO", " go ", "", "Rust"]),
            vec!["go".to_string(), "rust".to_string()]
        );
    }
}
