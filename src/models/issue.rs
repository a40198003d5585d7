//! Normalized issue model shared by every verdict parser.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// How sure the tool is that a finding is real.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Map a tool confidence string, case-insensitively. Unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" | "WEAK" => Some(Self::Low),
            _ => None,
        }
    }
}

/// One finding reported by a scanning tool, reduced to the common shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub severity: Severity,
    /// Severity string exactly as the tool reported it.
    pub original_severity: String,
    pub confidence: Option<Confidence>,
    pub title: String,
    pub details: String,
    pub file: Option<String>,
    pub line: Option<String>,
    pub code: Option<String>,
}
