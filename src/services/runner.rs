//! Job runner: drives one security test through the execution lifecycle.
//!
//! `created → running → finished`, with `error` reachable from `created` or
//! `running`. Every transition is checked against `JobStatus::can_transition_to`
//! before it is applied and persisted. Failures are recorded on the job entry
//! and never returned to the caller.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RunnerConfig;
use crate::db::{AnalysisPatch, Field, Filter, JobPatch, RepositoryPatch, Store};
use crate::errors::AppError;
use crate::executor::{ExecutionBackend, ExecutorError, UnitContext};
use crate::models::analysis::{Job, JobStatus, Verdict};
use crate::models::security_test::{SecurityTest, DETECTOR_TEST_NAME, SECRET_PLACEHOLDER};
use crate::parsers::{Evaluation, ParserRegistry};
use crate::services::selector::Selector;

/// Output recorded when the unit outlives its test timeout.
pub const WAIT_TIMEOUT_OUTPUT: &str = "wait timeout";

pub struct JobRunner {
    store: Arc<dyn Store>,
    backend: Arc<dyn ExecutionBackend>,
    parsers: Arc<ParserRegistry>,
    selector: Selector,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn ExecutionBackend>,
        parsers: Arc<ParserRegistry>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            selector: Selector::new(store.clone()),
            store,
            backend,
            parsers,
            config,
        }
    }

    pub fn backend(&self) -> &Arc<dyn ExecutionBackend> {
        &self.backend
    }

    /// Run `test` for the analysis in `ctx` as an independent task.
    pub fn spawn(self: &Arc<Self>, ctx: UnitContext, test: SecurityTest) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move { runner.run(&ctx, test).await })
    }

    /// Run one job to a terminal state.
    pub async fn run(self: &Arc<Self>, ctx: &UnitContext, test: SecurityTest) {
        let by_rid = Filter::new().eq(Field::Rid, ctx.rid);
        let image = test.image_ref();
        // The substituted command stays in memory; records keep the template.
        let command = test.cmd.replace(SECRET_PLACEHOLDER, &self.config.secret);

        self.ensure_image(&image).await;

        let execution_id = match self.backend.create_unit(ctx, &image, &command).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    rid = %ctx.rid,
                    security_test = %test.name,
                    error = %e,
                    "Failed to create execution unit"
                );
                let job = Job::failed_to_create(test, AppError::from(e).to_string());
                if let Err(e) = self.store.push_job(&by_rid, &job).await {
                    tracing::error!(rid = %ctx.rid, error = %e, "Failed to persist job entry");
                }
                return;
            }
        };

        let mut job = Job::created(test.clone(), execution_id.clone());
        if let Err(e) = self.store.push_job(&by_rid, &job).await {
            tracing::error!(
                rid = %ctx.rid,
                execution_id = %execution_id,
                error = %e,
                "Failed to persist job entry"
            );
        }

        if let Err(e) = self.backend.start_unit(&execution_id).await {
            tracing::error!(execution_id = %execution_id, error = %e, "Failed to start execution unit");
            self.transition(
                ctx,
                &mut job,
                JobPatch {
                    status: Some(JobStatus::Error),
                    verdict: Some(Verdict::Error),
                    output: Some(AppError::from(e).to_string()),
                    finished_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await;
            return;
        }

        self.transition(
            ctx,
            &mut job,
            JobPatch {
                status: Some(JobStatus::Running),
                started_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await;

        match self.backend.wait_unit(&execution_id, test.timeout()).await {
            Ok(()) => {}
            Err(ExecutorError::Timeout(after)) => {
                tracing::warn!(
                    execution_id = %execution_id,
                    security_test = %test.name,
                    timeout_secs = after.as_secs(),
                    "Execution unit timed out"
                );
                self.transition(
                    ctx,
                    &mut job,
                    JobPatch {
                        status: Some(JobStatus::Finished),
                        verdict: Some(Verdict::Error),
                        output: Some(WAIT_TIMEOUT_OUTPUT.to_string()),
                        finished_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await;
                return;
            }
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "Waiting for execution unit failed");
                self.fail(ctx, &mut job, AppError::from(e).to_string()).await;
                return;
            }
        }

        let raw = match self.backend.read_output(&execution_id).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "Failed to read unit output");
                self.fail(ctx, &mut job, AppError::from(e).to_string()).await;
                return;
            }
        };

        let evaluation = match self.parsers.dispatch(&test.name, &raw) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::warn!(security_test = %test.name, error = %e, "Cannot evaluate output");
                Evaluation {
                    verdict: Some(Verdict::Error),
                    output: e.to_string(),
                    issues: Vec::new(),
                    languages: Vec::new(),
                }
            }
        };

        if test.name == DETECTOR_TEST_NAME && evaluation.verdict == Some(Verdict::Passed) {
            self.enqueue_follow_ups(ctx, &evaluation.languages).await;
        }

        tracing::info!(
            rid = %ctx.rid,
            execution_id = %execution_id,
            security_test = %test.name,
            verdict = ?evaluation.verdict,
            issues = evaluation.issues.len(),
            "Job finished"
        );

        self.transition(
            ctx,
            &mut job,
            JobPatch {
                status: Some(JobStatus::Finished),
                verdict: evaluation.verdict,
                output: Some(evaluation.output),
                issues: Some(evaluation.issues),
                finished_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await;
    }

    async fn fail(&self, ctx: &UnitContext, job: &mut Job, output: String) {
        self.transition(
            ctx,
            job,
            JobPatch {
                status: Some(JobStatus::Error),
                verdict: Some(Verdict::Error),
                output: Some(output),
                finished_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await;
    }

    /// Apply `patch` to the in-memory job and persist it to the matching entry.
    ///
    /// Rejected transitions are logged and dropped. Persistence failures are
    /// logged; the in-memory job keeps its new state.
    async fn transition(&self, ctx: &UnitContext, job: &mut Job, patch: JobPatch) {
        if let Some(next) = patch.status {
            if !job.status.can_transition_to(next) {
                tracing::error!(
                    execution_id = ?job.execution_id,
                    from = job.status.as_str(),
                    to = next.as_str(),
                    "Rejected job status regression"
                );
                return;
            }
        }
        patch.apply(job);

        let Some(execution_id) = job.execution_id.as_deref() else {
            return;
        };
        let filter = Filter::new()
            .eq(Field::Rid, ctx.rid)
            .eq(Field::ExecutionId, execution_id);
        if let Err(e) = self.store.update_job(&filter, &patch).await {
            tracing::error!(
                rid = %ctx.rid,
                execution_id = %execution_id,
                status = job.status.as_str(),
                error = %e,
                "Failed to persist job transition"
            );
        }
    }

    /// Soft-bounded wait for `image`: request a pull, poll, and give up quietly
    /// at the ceiling.
    async fn ensure_image(&self, image: &str) {
        match self.backend.image_is_loaded(image).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => tracing::warn!(image = %image, error = %e, "Image check failed"),
        }

        if let Err(e) = self.backend.pull_image(image).await {
            tracing::warn!(image = %image, error = %e, "Image pull request failed");
        }

        let deadline = Instant::now() + self.config.pull_ceiling;
        loop {
            tokio::time::sleep(self.config.pull_poll_interval).await;
            if let Ok(true) = self.backend.image_is_loaded(image).await {
                tracing::debug!(image = %image, "Image available");
                return;
            }
            if Instant::now() >= deadline {
                tracing::warn!(image = %image, "Image still unavailable at pull ceiling, proceeding");
                return;
            }
        }
    }

    /// Second phase of an analysis: select tests for the detected languages,
    /// record them on the repository and the analysis, then run them.
    async fn enqueue_follow_ups(self: &Arc<Self>, ctx: &UnitContext, languages: &[String]) {
        let selected = self.selector.select_tests(languages).await;

        let by_url = Filter::new().eq(Field::Url, ctx.repository_url.as_str());
        let repository_patch = RepositoryPatch {
            languages: Some(languages.to_vec()),
            security_tests: Some(selected.clone()),
        };
        if let Err(e) = self.store.update_repository(&by_url, &repository_patch).await {
            tracing::error!(
                repository = %ctx.repository_url,
                error = %e,
                "Failed to record detected languages"
            );
        }

        let by_rid = Filter::new().eq(Field::Rid, ctx.rid);
        let mut scheduled: HashSet<String> = match self.store.find_analysis(&by_rid).await {
            Ok(Some(analysis)) => analysis
                .security_tests
                .into_iter()
                .map(|t| t.name)
                .collect(),
            Ok(None) => HashSet::new(),
            Err(e) => {
                tracing::error!(rid = %ctx.rid, error = %e, "Failed to load analysis for follow-up jobs");
                HashSet::new()
            }
        };

        let follow_ups: Vec<SecurityTest> = selected
            .into_iter()
            .filter(|t| t.name != DETECTOR_TEST_NAME && scheduled.insert(t.name.clone()))
            .collect();
        if follow_ups.is_empty() {
            return;
        }

        let patch = AnalysisPatch {
            append_security_tests: follow_ups.clone(),
            ..Default::default()
        };
        if let Err(e) = self.store.update_analysis(&by_rid, &patch).await {
            tracing::error!(rid = %ctx.rid, error = %e, "Failed to append follow-up tests");
            return;
        }

        tracing::info!(
            rid = %ctx.rid,
            languages = ?languages,
            follow_ups = follow_ups.len(),
            "Scheduling language-specific tests"
        );
        for test in follow_ups {
            self.spawn(ctx.clone(), test);
        }
    }
}
