//! Persistence Gateway: connection pool, the `Store` contract and its patches.
//!
//! Three logical collections (repositories, security tests, analyses) are
//! addressed through typed `Filter`s. Job entries live inside their analysis
//! and are updated one at a time by execution identifier, so concurrent job
//! writers never overwrite each other.

pub mod filter;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::analysis::{Analysis, AnalysisStatus, Job, JobStatus, Verdict};
use crate::models::issue::Issue;
use crate::models::repository::Repository;
use crate::models::security_test::SecurityTest;

pub use filter::{Field, Filter, FilterValue, Matchable};
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Replacement of a repository's detection results. Lists are replaced, not merged.
#[derive(Debug, Clone, Default)]
pub struct RepositoryPatch {
    pub languages: Option<Vec<String>>,
    pub security_tests: Option<Vec<SecurityTest>>,
}

/// Partial update of an analysis document (never its job list).
#[derive(Debug, Clone, Default)]
pub struct AnalysisPatch {
    pub status: Option<AnalysisStatus>,
    pub result: Option<Verdict>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Appended to the pending test list.
    pub append_security_tests: Vec<SecurityTest>,
}

/// Partial update of exactly one job entry.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub verdict: Option<Verdict>,
    pub output: Option<String>,
    pub issues: Option<Vec<Issue>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    /// Apply the set fields onto `job`.
    pub fn apply(&self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(verdict) = self.verdict {
            job.verdict = Some(verdict);
        }
        if let Some(output) = &self.output {
            job.output = output.clone();
        }
        if let Some(issues) = &self.issues {
            job.issues = issues.clone();
        }
        if let Some(started_at) = self.started_at {
            job.started_at = Some(started_at);
        }
        if let Some(finished_at) = self.finished_at {
            job.finished_at = Some(finished_at);
        }
    }
}

impl AnalysisPatch {
    pub fn apply(&self, analysis: &mut Analysis) {
        if let Some(status) = self.status {
            analysis.status = status;
        }
        if let Some(result) = self.result {
            analysis.result = Some(result);
        }
        if let Some(finished_at) = self.finished_at {
            analysis.finished_at = Some(finished_at);
        }
        analysis
            .security_tests
            .extend(self.append_security_tests.iter().cloned());
    }
}

impl RepositoryPatch {
    pub fn apply(&self, repository: &mut Repository) {
        if let Some(languages) = &self.languages {
            repository.languages = languages.clone();
        }
        if let Some(tests) = &self.security_tests {
            repository.security_tests = tests.clone();
        }
    }
}

/// Persistence Gateway contract consumed by the orchestration core.
///
/// `find_*` return `Ok(None)` / an empty list when nothing matches. Updates
/// that match nothing fail with `AppError::NotFound`; inserts that violate a
/// unique key fail with `AppError::Conflict`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend label for logs and readiness output.
    fn backend_name(&self) -> &'static str;

    async fn find_repository(&self, filter: &Filter) -> Result<Option<Repository>, AppError>;
    async fn insert_repository(&self, repository: &Repository) -> Result<(), AppError>;
    async fn update_repository(
        &self,
        filter: &Filter,
        patch: &RepositoryPatch,
    ) -> Result<(), AppError>;

    async fn find_security_test(&self, filter: &Filter) -> Result<Option<SecurityTest>, AppError>;
    async fn find_security_tests(&self, filter: &Filter) -> Result<Vec<SecurityTest>, AppError>;
    async fn insert_security_test(&self, test: &SecurityTest) -> Result<(), AppError>;

    async fn find_analysis(&self, filter: &Filter) -> Result<Option<Analysis>, AppError>;
    async fn find_analyses(&self, filter: &Filter) -> Result<Vec<Analysis>, AppError>;
    async fn insert_analysis(&self, analysis: &Analysis) -> Result<(), AppError>;
    async fn update_analysis(&self, filter: &Filter, patch: &AnalysisPatch)
        -> Result<(), AppError>;

    /// Append a job entry to the analysis matched by `filter`.
    async fn push_job(&self, filter: &Filter, job: &Job) -> Result<(), AppError>;

    /// Update the single job entry whose execution identifier is named in `filter`.
    async fn update_job(&self, filter: &Filter, patch: &JobPatch) -> Result<(), AppError>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_test() -> SecurityTest {
        SecurityTest {
            name: "bandit".to_string(),
            image: "huskyci/bandit".to_string(),
            image_tag: "latest".to_string(),
            cmd: "bandit -r .".to_string(),
            language: "python".to_string(),
            default: true,
            timeout_seconds: 360,
        }
    }

    #[test]
    fn job_patch_only_touches_set_fields() {
        let mut job = Job::created(sample_test(), "abc".to_string());
        let started = Utc::now();
        JobPatch {
            status: Some(JobStatus::Running),
            started_at: Some(started),
            ..Default::default()
        }
        .apply(&mut job);

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.started_at, Some(started));
        assert!(job.verdict.is_none());
        assert!(job.output.is_empty());
        assert_eq!(job.execution_id.as_deref(), Some("abc"));
    }

    #[test]
    fn analysis_patch_appends_tests() {
        let mut analysis = Analysis::new("u".to_string(), vec![sample_test()]);
        AnalysisPatch {
            append_security_tests: vec![sample_test()],
            ..Default::default()
        }
        .apply(&mut analysis);
        assert_eq!(analysis.security_tests.len(), 2);
        assert_eq!(analysis.status, AnalysisStatus::Running);
    }

    #[test]
    fn repository_patch_replaces_lists() {
        let mut repository = Repository {
            url: "u".to_string(),
            vm: None,
            security_tests: vec![sample_test()],
            languages: vec!["go".to_string()],
            created_at: Utc::now(),
            deleted_at: None,
        };
        RepositoryPatch {
            languages: Some(vec!["python".to_string()]),
            security_tests: Some(vec![]),
        }
        .apply(&mut repository);
        assert_eq!(repository.languages, vec!["python".to_string()]);
        assert!(repository.security_tests.is_empty());
    }
}
