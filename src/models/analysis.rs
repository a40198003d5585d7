//! Analysis and job models with the enums matching PostgreSQL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::issue::Issue;
use crate::models::security_test::SecurityTest;

// -- Enums matching PostgreSQL --

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "analysis_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Running,
    Finished,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Running,
    Finished,
    Error,
}

impl JobStatus {
    /// `finished` and `error` are terminal; nothing leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    /// Check whether a job may move from `self` to `to`.
    ///
    /// Status is monotonic: `created → running → finished`, with `error`
    /// reachable from `created` or `running`. A wait timeout finishes a
    /// running job directly.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::Running)
                | (Self::Created, Self::Error)
                | (Self::Running, Self::Finished)
                | (Self::Running, Self::Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "verdict", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
    Error,
}

// -- Job entry --

/// One scan-tool execution inside an analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Assigned by the execution backend once the unit exists.
    #[serde(rename = "executionID")]
    pub execution_id: Option<String>,
    #[serde(rename = "securityTest")]
    pub security_test: SecurityTest,
    pub status: JobStatus,
    pub verdict: Option<Verdict>,
    pub output: String,
    pub issues: Vec<Issue>,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A job whose execution unit exists but has not started yet.
    pub fn created(security_test: SecurityTest, execution_id: String) -> Self {
        Self {
            execution_id: Some(execution_id),
            security_test,
            status: JobStatus::Created,
            verdict: None,
            output: String::new(),
            issues: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// A job whose execution unit could not be created.
    pub fn failed_to_create(security_test: SecurityTest, reason: String) -> Self {
        Self {
            execution_id: None,
            security_test,
            status: JobStatus::Error,
            verdict: Some(Verdict::Error),
            output: reason,
            issues: Vec::new(),
            started_at: None,
            finished_at: Some(Utc::now()),
        }
    }
}

// -- Analysis --

/// One orchestration run over one repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    #[serde(rename = "RID")]
    pub rid: Uuid,
    #[serde(rename = "repositoryURL")]
    pub url: String,
    /// Tests this analysis is expected to run. Grows when the language
    /// detector selects follow-up tests.
    #[serde(rename = "securityTests")]
    pub security_tests: Vec<SecurityTest>,
    pub jobs: Vec<Job>,
    pub status: AnalysisStatus,
    pub result: Option<Verdict>,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Analysis {
    /// A freshly admitted analysis with no job entries yet.
    pub fn new(url: String, security_tests: Vec<SecurityTest>) -> Self {
        Self {
            rid: Uuid::new_v4(),
            url,
            security_tests,
            jobs: Vec::new(),
            status: AnalysisStatus::Running,
            result: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}
