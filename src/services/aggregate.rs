//! Aggregate verdict policy for an analysis, evaluated lazily by readers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::analysis::{Analysis, AnalysisStatus, Job, JobStatus, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    pub status: AnalysisStatus,
    pub result: Option<Verdict>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Outcome a terminal job contributes. An unset verdict counts as passed.
fn job_outcome(job: &Job) -> Verdict {
    match job.status {
        JobStatus::Error => Verdict::Error,
        _ => job.verdict.unwrap_or(Verdict::Passed),
    }
}

/// Every pending test has a job entry and every job entry is terminal.
pub fn is_complete(analysis: &Analysis) -> bool {
    let mut expected: HashMap<&str, usize> = HashMap::new();
    for test in &analysis.security_tests {
        *expected.entry(test.name.as_str()).or_default() += 1;
    }
    let mut started: HashMap<&str, usize> = HashMap::new();
    for job in &analysis.jobs {
        *started.entry(job.security_test.name.as_str()).or_default() += 1;
    }

    let all_started = expected
        .iter()
        .all(|(name, count)| started.get(name).copied().unwrap_or(0) >= *count);

    all_started && analysis.jobs.iter().all(|j| j.status.is_terminal())
}

/// `failed` beats `error` beats `passed`.
pub fn combine(outcomes: impl IntoIterator<Item = Verdict>) -> Verdict {
    let mut result = Verdict::Passed;
    for outcome in outcomes {
        match outcome {
            Verdict::Failed => return Verdict::Failed,
            Verdict::Error => result = Verdict::Error,
            Verdict::Passed => {}
        }
    }
    result
}

pub fn aggregate(analysis: &Analysis) -> Aggregate {
    if analysis.status == AnalysisStatus::Finished {
        return Aggregate {
            status: analysis.status,
            result: analysis.result,
            finished_at: analysis.finished_at,
        };
    }

    if !is_complete(analysis) {
        return Aggregate {
            status: AnalysisStatus::Running,
            result: None,
            finished_at: None,
        };
    }

    Aggregate {
        status: AnalysisStatus::Finished,
        result: Some(combine(analysis.jobs.iter().map(job_outcome))),
        finished_at: analysis
            .jobs
            .iter()
            .filter_map(|j| j.finished_at)
            .max()
            .or(Some(analysis.started_at)),
    }
}

/// The analysis with its aggregate status and result filled in.
pub fn snapshot(mut analysis: Analysis) -> Analysis {
    let summary = aggregate(&analysis);
    analysis.status = summary.status;
    analysis.result = summary.result;
    analysis.finished_at = summary.finished_at;
    analysis
}
