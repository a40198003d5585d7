//! PostgreSQL `Store` built on sqlx.
//!
//! Job entries are rows of `analysis_jobs`; a job update is a single-row
//! `UPDATE ... WHERE execution_id = $n`, so writers of different jobs in the
//! same analysis never contend on the analysis row.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{AnalysisPatch, Field, Filter, FilterValue, JobPatch, RepositoryPatch, Store};
use crate::errors::AppError;
use crate::models::analysis::{Analysis, AnalysisStatus, Job, JobStatus, Verdict};
use crate::models::issue::Issue;
use crate::models::repository::Repository;
use crate::models::security_test::SecurityTest;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// -- Row types --

#[derive(Debug, sqlx::FromRow)]
struct RepositoryRow {
    url: String,
    vm: Option<String>,
    security_tests: Json<Vec<SecurityTest>>,
    languages: Json<Vec<String>>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<RepositoryRow> for Repository {
    fn from(row: RepositoryRow) -> Self {
        Self {
            url: row.url,
            vm: row.vm,
            security_tests: row.security_tests.0,
            languages: row.languages.0,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SecurityTestRow {
    name: String,
    image: String,
    image_tag: String,
    cmd: String,
    language: String,
    is_default: bool,
    timeout_seconds: i32,
}

impl From<SecurityTestRow> for SecurityTest {
    fn from(row: SecurityTestRow) -> Self {
        Self {
            name: row.name,
            image: row.image,
            image_tag: row.image_tag,
            cmd: row.cmd,
            language: row.language,
            default: row.is_default,
            timeout_seconds: row.timeout_seconds,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AnalysisRow {
    rid: Uuid,
    url: String,
    security_tests: Json<Vec<SecurityTest>>,
    status: AnalysisStatus,
    result: Option<Verdict>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    rid: Uuid,
    execution_id: Option<String>,
    security_test: Json<SecurityTest>,
    status: JobStatus,
    verdict: Option<Verdict>,
    output: String,
    issues: Json<Vec<Issue>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            execution_id: row.execution_id,
            security_test: row.security_test.0,
            status: row.status,
            verdict: row.verdict,
            output: row.output,
            issues: row.issues.0,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

// -- Filter rendering --

#[derive(Debug, Clone, Copy)]
enum Table {
    Repositories,
    SecurityTests,
    Analyses,
    Jobs,
}

impl Table {
    fn name(&self) -> &'static str {
        match self {
            Self::Repositories => "repositories",
            Self::SecurityTests => "security_tests",
            Self::Analyses => "analyses",
            Self::Jobs => "analysis_jobs",
        }
    }

    /// SQL condition for `field = $n` on this table.
    fn condition(&self, field: Field, n: usize) -> Option<String> {
        let sql = match (self, field) {
            (Self::Repositories, Field::Url) => format!("url = ${n}"),
            (Self::SecurityTests, Field::Name) => format!("name = ${n}"),
            (Self::SecurityTests, Field::Language) => format!("language = ${n}"),
            (Self::SecurityTests, Field::Default) => format!("is_default = ${n}"),
            (Self::Analyses, Field::Url) => format!("url = ${n}"),
            (Self::Analyses, Field::Rid) => format!("rid = ${n}"),
            (Self::Analyses, Field::Status) => format!("status::text = ${n}"),
            (Self::Analyses, Field::ExecutionId) => {
                format!("rid IN (SELECT rid FROM analysis_jobs WHERE execution_id = ${n})")
            }
            (Self::Jobs, Field::Rid) => format!("rid = ${n}"),
            (Self::Jobs, Field::ExecutionId) => format!("execution_id = ${n}"),
            _ => return None,
        };
        Some(sql)
    }
}

/// Render `filter` as a `WHERE` clause whose placeholders start after `offset`.
fn where_clause(table: Table, filter: &Filter, offset: usize) -> Result<String, AppError> {
    let mut conditions = Vec::with_capacity(filter.conditions().len());
    for (i, (field, _)) in filter.conditions().iter().enumerate() {
        let condition = table.condition(*field, offset + i + 1).ok_or_else(|| {
            AppError::Persistence(format!(
                "Field '{}' cannot filter {}",
                field.as_str(),
                table.name()
            ))
        })?;
        conditions.push(condition);
    }

    if conditions.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("WHERE {}", conditions.join(" AND ")))
    }
}

macro_rules! bind_filter {
    ($query:ident, $filter:expr) => {
        for (_, value) in $filter.conditions() {
            $query = match value {
                FilterValue::Text(v) => $query.bind(v.clone()),
                FilterValue::Bool(v) => $query.bind(*v),
                FilterValue::Uuid(v) => $query.bind(*v),
            };
        }
    };
}

/// Map a unique-key violation to `Conflict`.
fn insert_error(err: sqlx::Error, what: String) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("{what} already exists"))
        }
        _ => AppError::Database(err),
    }
}

impl PgStore {
    async fn load_jobs(&self, rids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Job>>, AppError> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT rid, execution_id, security_test, status, verdict, output, issues, \
             started_at, finished_at \
             FROM analysis_jobs WHERE rid = ANY($1) ORDER BY id ASC",
        )
        .bind(rids)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs: HashMap<Uuid, Vec<Job>> = HashMap::new();
        for row in rows {
            jobs.entry(row.rid).or_default().push(row.into());
        }
        Ok(jobs)
    }

    async fn select_analyses(
        &self,
        filter: &Filter,
        limit: Option<i64>,
    ) -> Result<Vec<Analysis>, AppError> {
        let limit_clause = limit.map(|l| format!(" LIMIT {l}")).unwrap_or_default();
        let sql = format!(
            "SELECT rid, url, security_tests, status, result, started_at, finished_at \
             FROM analyses {} ORDER BY started_at ASC{limit_clause}",
            where_clause(Table::Analyses, filter, 0)?
        );
        let mut query = sqlx::query_as::<_, AnalysisRow>(&sql);
        bind_filter!(query, filter);
        let rows = query.fetch_all(&self.pool).await?;

        let rids: Vec<Uuid> = rows.iter().map(|r| r.rid).collect();
        let mut jobs = self.load_jobs(&rids).await?;

        Ok(rows
            .into_iter()
            .map(|row| Analysis {
                jobs: jobs.remove(&row.rid).unwrap_or_default(),
                rid: row.rid,
                url: row.url,
                security_tests: row.security_tests.0,
                status: row.status,
                result: row.result,
                started_at: row.started_at,
                finished_at: row.finished_at,
            })
            .collect())
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn find_repository(&self, filter: &Filter) -> Result<Option<Repository>, AppError> {
        let sql = format!(
            "SELECT url, vm, security_tests, languages, created_at, deleted_at \
             FROM repositories {} LIMIT 1",
            where_clause(Table::Repositories, filter, 0)?
        );
        let mut query = sqlx::query_as::<_, RepositoryRow>(&sql);
        bind_filter!(query, filter);
        Ok(query.fetch_optional(&self.pool).await?.map(Into::into))
    }

    async fn insert_repository(&self, repository: &Repository) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO repositories (url, vm, security_tests, languages, created_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&repository.url)
        .bind(&repository.vm)
        .bind(Json(&repository.security_tests))
        .bind(Json(&repository.languages))
        .bind(repository.created_at)
        .bind(repository.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, format!("Repository '{}'", repository.url)))?;
        Ok(())
    }

    async fn update_repository(
        &self,
        filter: &Filter,
        patch: &RepositoryPatch,
    ) -> Result<(), AppError> {
        let sql = format!(
            "UPDATE repositories SET \
             languages = COALESCE($1, languages), \
             security_tests = COALESCE($2, security_tests) \
             WHERE url = (SELECT url FROM repositories {} LIMIT 1)",
            where_clause(Table::Repositories, filter, 2)?
        );
        let mut query = sqlx::query(&sql)
            .bind(patch.languages.as_ref().map(Json))
            .bind(patch.security_tests.as_ref().map(Json));
        bind_filter!(query, filter);

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Repository not found".to_string()));
        }
        Ok(())
    }

    async fn find_security_test(&self, filter: &Filter) -> Result<Option<SecurityTest>, AppError> {
        let sql = format!(
            "SELECT name, image, image_tag, cmd, language, is_default, timeout_seconds \
             FROM security_tests {} LIMIT 1",
            where_clause(Table::SecurityTests, filter, 0)?
        );
        let mut query = sqlx::query_as::<_, SecurityTestRow>(&sql);
        bind_filter!(query, filter);
        Ok(query.fetch_optional(&self.pool).await?.map(Into::into))
    }

    async fn find_security_tests(&self, filter: &Filter) -> Result<Vec<SecurityTest>, AppError> {
        let sql = format!(
            "SELECT name, image, image_tag, cmd, language, is_default, timeout_seconds \
             FROM security_tests {} ORDER BY name ASC",
            where_clause(Table::SecurityTests, filter, 0)?
        );
        let mut query = sqlx::query_as::<_, SecurityTestRow>(&sql);
        bind_filter!(query, filter);
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_security_test(&self, test: &SecurityTest) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO security_tests \
             (name, image, image_tag, cmd, language, is_default, timeout_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&test.name)
        .bind(&test.image)
        .bind(&test.image_tag)
        .bind(&test.cmd)
        .bind(&test.language)
        .bind(test.default)
        .bind(test.timeout_seconds)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, format!("Security test '{}'", test.name)))?;
        Ok(())
    }

    async fn find_analysis(&self, filter: &Filter) -> Result<Option<Analysis>, AppError> {
        Ok(self.select_analyses(filter, Some(1)).await?.into_iter().next())
    }

    async fn find_analyses(&self, filter: &Filter) -> Result<Vec<Analysis>, AppError> {
        self.select_analyses(filter, None).await
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO analyses (rid, url, security_tests, status, result, started_at, finished_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(analysis.rid)
        .bind(&analysis.url)
        .bind(Json(&analysis.security_tests))
        .bind(analysis.status)
        .bind(analysis.result)
        .bind(analysis.started_at)
        .bind(analysis.finished_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| insert_error(e, format!("Analysis {}", analysis.rid)))?;

        for job in &analysis.jobs {
            insert_job(&mut tx, analysis.rid, job).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_analysis(
        &self,
        filter: &Filter,
        patch: &AnalysisPatch,
    ) -> Result<(), AppError> {
        let sql = format!(
            "UPDATE analyses SET \
             status = COALESCE($1, status), \
             result = COALESCE($2, result), \
             finished_at = COALESCE($3, finished_at), \
             security_tests = security_tests || $4 \
             WHERE rid = (SELECT rid FROM analyses {} LIMIT 1)",
            where_clause(Table::Analyses, filter, 4)?
        );
        let mut query = sqlx::query(&sql)
            .bind(patch.status)
            .bind(patch.result)
            .bind(patch.finished_at)
            .bind(Json(&patch.append_security_tests));
        bind_filter!(query, filter);

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Analysis not found".to_string()));
        }
        Ok(())
    }

    async fn push_job(&self, filter: &Filter, job: &Job) -> Result<(), AppError> {
        let sql = format!(
            "INSERT INTO analysis_jobs \
             (rid, execution_id, security_test, status, verdict, output, issues, started_at, finished_at) \
             SELECT rid, $1, $2, $3, $4, $5, $6, $7, $8 FROM analyses {} LIMIT 1",
            where_clause(Table::Analyses, filter, 8)?
        );
        let mut query = sqlx::query(&sql)
            .bind(&job.execution_id)
            .bind(Json(&job.security_test))
            .bind(job.status)
            .bind(job.verdict)
            .bind(&job.output)
            .bind(Json(&job.issues))
            .bind(job.started_at)
            .bind(job.finished_at);
        bind_filter!(query, filter);

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(e, "Job entry".to_string()))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Analysis not found".to_string()));
        }
        Ok(())
    }

    async fn update_job(&self, filter: &Filter, patch: &JobPatch) -> Result<(), AppError> {
        if filter.value_of(Field::ExecutionId).is_none() {
            return Err(AppError::Validation(
                "Job updates must be addressed by execution identifier".to_string(),
            ));
        }

        let sql = format!(
            "UPDATE analysis_jobs SET \
             status = COALESCE($1, status), \
             verdict = COALESCE($2, verdict), \
             output = COALESCE($3, output), \
             issues = COALESCE($4, issues), \
             started_at = COALESCE($5, started_at), \
             finished_at = COALESCE($6, finished_at) \
             {}",
            where_clause(Table::Jobs, filter, 6)?
        );
        let mut query = sqlx::query(&sql)
            .bind(patch.status)
            .bind(patch.verdict)
            .bind(&patch.output)
            .bind(patch.issues.as_ref().map(Json))
            .bind(patch.started_at)
            .bind(patch.finished_at);
        bind_filter!(query, filter);

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Job not found".to_string()));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn insert_job(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    rid: Uuid,
    job: &Job,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO analysis_jobs \
         (rid, execution_id, security_test, status, verdict, output, issues, started_at, finished_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(rid)
    .bind(&job.execution_id)
    .bind(Json(&job.security_test))
    .bind(job.status)
    .bind(job.verdict)
    .bind(&job.output)
    .bind(Json(&job.issues))
    .bind(job.started_at)
    .bind(job.finished_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| insert_error(e, "Job entry".to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_numbers_placeholders_after_offset() {
        let filter = Filter::new()
            .eq(Field::Url, "https://github.com/acme/api.git")
            .eq(Field::Status, "running");
        let sql = where_clause(Table::Analyses, &filter, 4).unwrap();
        assert_eq!(sql, "WHERE url = $5 AND status::text = $6");
    }

    #[test]
    fn where_clause_empty_filter() {
        assert_eq!(where_clause(Table::SecurityTests, &Filter::new(), 0).unwrap(), "");
    }

    #[test]
    fn where_clause_rejects_unknown_field() {
        let filter = Filter::new().eq(Field::Language, "go");
        let err = where_clause(Table::Repositories, &filter, 0).unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[test]
    fn execution_id_on_analyses_uses_subquery() {
        let filter = Filter::new().eq(Field::ExecutionId, "abc");
        let sql = where_clause(Table::Analyses, &filter, 0).unwrap();
        assert!(sql.contains("SELECT rid FROM analysis_jobs WHERE execution_id = $1"));
    }
}
