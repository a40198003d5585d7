//! Analysis orchestrator: admission and status lookup.

use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{AnalysisPatch, Field, Filter, Store};
use crate::errors::AppError;
use crate::executor::UnitContext;
use crate::models::analysis::{Analysis, AnalysisStatus};
use crate::models::security_test::DETECTOR_TEST_NAME;
use crate::services::aggregate;
use crate::services::runner::JobRunner;

pub struct Orchestrator {
    store: Arc<dyn Store>,
    runner: Arc<JobRunner>,
    /// Serializes check-running + insert so admission is atomic per process.
    admission: Mutex<()>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, runner: Arc<JobRunner>) -> Self {
        Self {
            store,
            runner,
            admission: Mutex::new(()),
        }
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    /// Admit a new analysis for a registered repository and start its jobs.
    ///
    /// Fails with `NotFound` for an unknown URL and `Conflict` while another
    /// analysis for the same URL is still running. Running analyses whose jobs
    /// have all reached a terminal state are finalized first.
    pub async fn admit(&self, url: &str) -> Result<Uuid, AppError> {
        let _gate = self.admission.lock().await;

        let repository = self
            .store
            .find_repository(&Filter::new().eq(Field::Url, url))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Repository '{url}' not found")))?;

        let running = self
            .store
            .find_analyses(
                &Filter::new()
                    .eq(Field::Url, url)
                    .eq(Field::Status, AnalysisStatus::Running.as_str()),
            )
            .await?;

        for analysis in running {
            let summary = aggregate::aggregate(&analysis);
            if summary.status == AnalysisStatus::Running {
                return Err(AppError::Conflict(format!(
                    "Analysis {} is already running for '{url}'",
                    analysis.rid
                )));
            }
            self.store
                .update_analysis(
                    &Filter::new().eq(Field::Rid, analysis.rid),
                    &AnalysisPatch {
                        status: Some(summary.status),
                        result: summary.result,
                        finished_at: summary.finished_at,
                        ..Default::default()
                    },
                )
                .await?;
            tracing::debug!(rid = %analysis.rid, result = ?summary.result, "Finalized analysis");
        }

        let mut tests = repository.security_tests;
        if repository.languages.is_empty() && !tests.iter().any(|t| t.name == DETECTOR_TEST_NAME) {
            match self
                .store
                .find_security_test(&Filter::new().eq(Field::Name, DETECTOR_TEST_NAME))
                .await?
            {
                Some(detector) => tests.insert(0, detector),
                None => tracing::warn!(
                    repository = %url,
                    "Language detector not registered, skipping detection"
                ),
            }
        }

        let analysis = Analysis::new(repository.url, tests);
        self.store.insert_analysis(&analysis).await?;

        let ctx = UnitContext {
            rid: analysis.rid,
            repository_url: analysis.url.clone(),
        };
        for test in analysis.security_tests {
            self.runner.spawn(ctx.clone(), test);
        }

        tracing::info!(rid = %analysis.rid, repository = %analysis.url, "Analysis admitted");
        Ok(analysis.rid)
    }

    /// Current snapshot of an analysis with its aggregate status and result.
    pub async fn status(&self, rid: Uuid) -> Result<Analysis, AppError> {
        let analysis = self
            .store
            .find_analysis(&Filter::new().eq(Field::Rid, rid))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Analysis {rid} not found")))?;
        Ok(aggregate::snapshot(analysis))
    }
}
