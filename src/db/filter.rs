//! Typed equality filters accepted by every `Store` operation.
//!
//! A `Filter` is a conjunction of `(Field, FilterValue)` pairs. `MemoryStore`
//! evaluates it through `Matchable`; `PgStore` renders it into a numbered
//! `WHERE` clause per table.

use uuid::Uuid;

use crate::models::analysis::Analysis;
use crate::models::repository::Repository;
use crate::models::security_test::SecurityTest;

/// Addressable record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Repository URL (repositories, analyses).
    Url,
    /// Analysis request identifier.
    Rid,
    /// Analysis status.
    Status,
    /// Security test name.
    Name,
    /// Security test language.
    Language,
    /// Security test default flag.
    Default,
    /// Execution identifier of a job entry inside an analysis.
    ExecutionId,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Rid => "rid",
            Self::Status => "status",
            Self::Name => "name",
            Self::Language => "language",
            Self::Default => "default",
            Self::ExecutionId => "execution_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
    Uuid(Uuid),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

/// Conjunction of field equalities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(Field, FilterValue)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    pub fn eq(mut self, field: Field, value: impl Into<FilterValue>) -> Self {
        self.conditions.push((field, value.into()));
        self
    }

    pub fn conditions(&self) -> &[(Field, FilterValue)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// First value given for `field`, if any.
    pub fn value_of(&self, field: Field) -> Option<&FilterValue> {
        self.conditions
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }

    /// True when every condition holds for `record`.
    pub fn matches<T: Matchable>(&self, record: &T) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| record.matches_field(*field, value))
    }
}

/// In-process evaluation of a single filter condition.
///
/// Fields a record does not carry never match.
pub trait Matchable {
    fn matches_field(&self, field: Field, value: &FilterValue) -> bool;
}

fn text_eq(actual: &str, value: &FilterValue) -> bool {
    matches!(value, FilterValue::Text(expected) if expected == actual)
}

impl Matchable for Repository {
    fn matches_field(&self, field: Field, value: &FilterValue) -> bool {
        match field {
            Field::Url => text_eq(&self.url, value),
            _ => false,
        }
    }
}

impl Matchable for SecurityTest {
    fn matches_field(&self, field: Field, value: &FilterValue) -> bool {
        match field {
            Field::Name => text_eq(&self.name, value),
            Field::Language => text_eq(&self.language, value),
            Field::Default => matches!(value, FilterValue::Bool(b) if *b == self.default),
            _ => false,
        }
    }
}

impl Matchable for Analysis {
    fn matches_field(&self, field: Field, value: &FilterValue) -> bool {
        match field {
            Field::Url => text_eq(&self.url, value),
            Field::Rid => matches!(value, FilterValue::Uuid(rid) if *rid == self.rid),
            Field::Status => text_eq(self.status.as_str(), value),
            Field::ExecutionId => self
                .jobs
                .iter()
                .any(|job| job.execution_id.as_deref().is_some_and(|id| text_eq(id, value))),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::{AnalysisStatus, Job};

    fn test_def(name: &str, language: &str, default: bool) -> SecurityTest {
        SecurityTest {
            name: name.to_string(),
            image: format!("huskyci/{name}"),
            image_tag: "latest".to_string(),
            cmd: "run".to_string(),
            language: language.to_string(),
            default,
            timeout_seconds: 60,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = Filter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&test_def("bandit", "python", true)));
    }

    #[test]
    fn conditions_are_conjunctive() {
        let filter = Filter::new()
            .eq(Field::Language, "python")
            .eq(Field::Default, true);
        assert!(filter.matches(&test_def("bandit", "python", true)));
        assert!(!filter.matches(&test_def("bandit", "python", false)));
        assert!(!filter.matches(&test_def("gosec", "go", true)));
    }

    #[test]
    fn mismatched_value_type_never_matches() {
        let filter = Filter::new().eq(Field::Default, "true");
        assert!(!filter.matches(&test_def("bandit", "python", true)));
    }

    #[test]
    fn analysis_matches_by_status_and_execution_id() {
        let mut analysis = Analysis::new("https://github.com/acme/api.git".to_string(), vec![]);
        analysis
            .jobs
            .push(Job::created(test_def("bandit", "python", true), "c0ffee".to_string()));

        let running = Filter::new()
            .eq(Field::Url, "https://github.com/acme/api.git")
            .eq(Field::Status, AnalysisStatus::Running.as_str());
        assert!(running.matches(&analysis));

        assert!(Filter::new().eq(Field::ExecutionId, "c0ffee").matches(&analysis));
        assert!(!Filter::new().eq(Field::ExecutionId, "deadbeef").matches(&analysis));
        assert!(Filter::new().eq(Field::Rid, analysis.rid).matches(&analysis));
    }

    #[test]
    fn value_of_returns_first_condition() {
        let filter = Filter::new().eq(Field::Name, "enry");
        assert_eq!(filter.value_of(Field::Name), Some(&FilterValue::from("enry")));
        assert!(filter.value_of(Field::Url).is_none());
    }
}
