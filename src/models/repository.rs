//! Repository (scan target) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::security_test::SecurityTest;

/// A registered scan target, keyed by URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    #[serde(rename = "repositoryURL")]
    pub url: String,
    #[serde(rename = "VM")]
    pub vm: Option<String>,
    #[serde(rename = "securityTests")]
    pub security_tests: Vec<SecurityTest>,
    pub languages: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "deletedAt")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Registration payload for a new repository.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRepository {
    #[serde(rename = "repositoryURL")]
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    #[serde(rename = "VM", default)]
    pub vm: Option<String>,
    /// Names of security tests to attach. Empty means "the generic defaults".
    #[serde(rename = "securityTestName", default)]
    pub security_test_names: Vec<String>,
}
