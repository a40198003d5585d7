//! In-process `Store` over `tokio::sync::RwLock`ed collections.
//!
//! Used by tests and for running without PostgreSQL. Each collection has its
//! own lock; a job update holds the analyses lock only for the in-place edit.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::{AnalysisPatch, Field, Filter, FilterValue, JobPatch, RepositoryPatch, Store};
use crate::errors::AppError;
use crate::models::analysis::{Analysis, Job};
use crate::models::repository::Repository;
use crate::models::security_test::SecurityTest;

#[derive(Debug, Default)]
pub struct MemoryStore {
    repositories: RwLock<Vec<Repository>>,
    security_tests: RwLock<Vec<SecurityTest>>,
    analyses: RwLock<Vec<Analysis>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_repository(&self, filter: &Filter) -> Result<Option<Repository>, AppError> {
        let repositories = self.repositories.read().await;
        Ok(repositories.iter().find(|r| filter.matches(*r)).cloned())
    }

    async fn insert_repository(&self, repository: &Repository) -> Result<(), AppError> {
        let mut repositories = self.repositories.write().await;
        if repositories.iter().any(|r| r.url == repository.url) {
            return Err(AppError::Conflict(format!(
                "Repository '{}' already exists",
                repository.url
            )));
        }
        repositories.push(repository.clone());
        Ok(())
    }

    async fn update_repository(
        &self,
        filter: &Filter,
        patch: &RepositoryPatch,
    ) -> Result<(), AppError> {
        let mut repositories = self.repositories.write().await;
        let repository = repositories
            .iter_mut()
            .find(|r| filter.matches(&**r))
            .ok_or_else(|| AppError::NotFound("Repository not found".to_string()))?;
        patch.apply(repository);
        Ok(())
    }

    async fn find_security_test(&self, filter: &Filter) -> Result<Option<SecurityTest>, AppError> {
        let tests = self.security_tests.read().await;
        Ok(tests.iter().find(|t| filter.matches(*t)).cloned())
    }

    async fn find_security_tests(&self, filter: &Filter) -> Result<Vec<SecurityTest>, AppError> {
        let tests = self.security_tests.read().await;
        Ok(tests.iter().filter(|t| filter.matches(*t)).cloned().collect())
    }

    async fn insert_security_test(&self, test: &SecurityTest) -> Result<(), AppError> {
        let mut tests = self.security_tests.write().await;
        if tests.iter().any(|t| t.name == test.name) {
            return Err(AppError::Conflict(format!(
                "Security test '{}' already exists",
                test.name
            )));
        }
        tests.push(test.clone());
        Ok(())
    }

    async fn find_analysis(&self, filter: &Filter) -> Result<Option<Analysis>, AppError> {
        let analyses = self.analyses.read().await;
        Ok(analyses.iter().find(|a| filter.matches(*a)).cloned())
    }

    async fn find_analyses(&self, filter: &Filter) -> Result<Vec<Analysis>, AppError> {
        let analyses = self.analyses.read().await;
        Ok(analyses.iter().filter(|a| filter.matches(*a)).cloned().collect())
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<(), AppError> {
        let mut analyses = self.analyses.write().await;
        if analyses.iter().any(|a| a.rid == analysis.rid) {
            return Err(AppError::Conflict(format!(
                "Analysis {} already exists",
                analysis.rid
            )));
        }
        analyses.push(analysis.clone());
        Ok(())
    }

    async fn update_analysis(
        &self,
        filter: &Filter,
        patch: &AnalysisPatch,
    ) -> Result<(), AppError> {
        let mut analyses = self.analyses.write().await;
        let analysis = analyses
            .iter_mut()
            .find(|a| filter.matches(&**a))
            .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))?;
        patch.apply(analysis);
        Ok(())
    }

    async fn push_job(&self, filter: &Filter, job: &Job) -> Result<(), AppError> {
        let mut analyses = self.analyses.write().await;
        let analysis = analyses
            .iter_mut()
            .find(|a| filter.matches(&**a))
            .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))?;
        analysis.jobs.push(job.clone());
        Ok(())
    }

    async fn update_job(&self, filter: &Filter, patch: &JobPatch) -> Result<(), AppError> {
        let Some(FilterValue::Text(execution_id)) = filter.value_of(Field::ExecutionId) else {
            return Err(AppError::Validation(
                "Job updates must be addressed by execution identifier".to_string(),
            ));
        };

        let mut analyses = self.analyses.write().await;
        let job = analyses
            .iter_mut()
            .filter(|a| filter.matches(&**a))
            .flat_map(|a| a.jobs.iter_mut())
            .find(|j| j.execution_id.as_deref() == Some(execution_id.as_str()))
            .ok_or_else(|| AppError::NotFound(format!("Job '{execution_id}' not found")))?;
        patch.apply(job);
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
