//! Status aggregation — fuses the job row, per-object counters, and the
//! durable-loop execution state into a single coherent job status.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use sift_connectors::ExecutionState;

use crate::AppState;

/// Overall phase reported for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Listing,
    Processing,
    Completed,
    Failed,
    Aborted,
}

/// The aggregated job status returned by `GET /jobs/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub bucket: String,
    pub prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_arn: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total: i64,
    pub queued: i64,
    pub processing: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub total_findings: i64,
    pub progress_percent: f64,
    pub status: JobPhase,
    pub status_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_function_status: Option<String>,
    pub data_source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_refreshed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_refresh_duration_ms: Option<i32>,
}

/// Derive the overall phase and message from the execution state and the
/// object counters. `completed` is succeeded + failed. A missing execution
/// (sync mode, or an execution aged out of lookup) reasons from the
/// counters alone.
pub fn derive_overall_status(
    execution: Option<ExecutionState>,
    total: i64,
    completed: i64,
) -> (JobPhase, String) {
    match execution {
        Some(ExecutionState::Running) => (
            JobPhase::Listing,
            "Step Functions is listing S3 objects".to_string(),
        ),
        Some(ExecutionState::Failed) => (
            JobPhase::Failed,
            "Step Functions execution failed".to_string(),
        ),
        Some(ExecutionState::TimedOut) => (
            JobPhase::Failed,
            "Step Functions execution timed out".to_string(),
        ),
        Some(ExecutionState::Aborted) => (
            JobPhase::Aborted,
            "Step Functions execution was aborted".to_string(),
        ),
        Some(ExecutionState::Succeeded) | None => {
            if total == 0 {
                (JobPhase::Completed, "No objects found to scan".to_string())
            } else if completed >= total {
                (JobPhase::Completed, "All objects scanned".to_string())
            } else {
                (
                    JobPhase::Processing,
                    format!("Scanning objects ({}/{})", completed, total),
                )
            }
        }
    }
}

pub fn progress_percent(total: i64, completed: i64) -> f64 {
    if total > 0 {
        completed as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// Assemble the status for one job. Cached counters are preferred unless the
/// caller asked for real-time data; a job too recent for the cache falls
/// back to direct queries. Returns `None` when no job row exists anywhere.
pub async fn get_job_status(
    state: &AppState,
    job_id: Uuid,
    real_time: bool,
) -> anyhow::Result<Option<JobStatusResponse>> {
    let cached = if real_time {
        None
    } else {
        snapshot_from_cache(state, job_id).await?
    };

    // Real-time fallback: requested explicitly, or the projection has no
    // row yet for a very recent job.
    let mut response = match cached {
        Some(response) => response,
        None => {
            let Some(job) = state.db.get_job(job_id).await? else {
                return Ok(None);
            };
            let stats = state.db.get_job_stats(job_id).await?;

            JobStatusResponse {
                job_id: job.job_id,
                bucket: job.bucket,
                prefix: job.prefix,
                execution_arn: job.execution_arn,
                created_at: job.created_at,
                updated_at: job.updated_at,
                total: stats.total,
                queued: stats.queued,
                processing: stats.processing,
                succeeded: stats.succeeded,
                failed: stats.failed,
                total_findings: stats.total_findings,
                progress_percent: progress_percent(stats.total, stats.completed()),
                status: JobPhase::Processing,
                status_message: String::new(),
                step_function_status: None,
                data_source: "real_time",
                cache_refreshed_at: None,
                cache_refresh_duration_ms: None,
            }
        }
    };

    let execution = match &response.execution_arn {
        Some(arn) => state.sfn.describe(arn).await,
        None => None,
    };

    let completed = response.succeeded + response.failed;
    let (status, status_message) = derive_overall_status(execution, response.total, completed);
    response.status = status;
    response.status_message = status_message;
    response.step_function_status = execution.map(|e| e.as_status_str().to_string());

    Ok(Some(response))
}

/// The cached snapshot for a job, with the refresh-log metadata attached.
/// Status and message are placeholders until execution fusion runs.
async fn snapshot_from_cache(
    state: &AppState,
    job_id: Uuid,
) -> anyhow::Result<Option<JobStatusResponse>> {
    let Some(progress) = state.db.get_progress(job_id).await? else {
        return Ok(None);
    };

    let (cache_refreshed_at, cache_refresh_duration_ms) = match state.db.get_refresh_log().await {
        Ok(Some(log)) => (Some(log.last_refreshed_at), Some(log.refresh_duration_ms)),
        Ok(None) => (None, None),
        Err(e) => {
            // The log table may not exist on an older schema.
            warn!("Could not query refresh log: {}", e);
            (None, None)
        }
    };

    Ok(Some(JobStatusResponse {
        job_id: progress.job_id,
        bucket: progress.bucket,
        prefix: progress.prefix,
        execution_arn: progress.execution_arn,
        created_at: progress.created_at,
        updated_at: progress.updated_at,
        total: progress.total,
        queued: progress.queued,
        processing: progress.processing,
        succeeded: progress.succeeded,
        failed: progress.failed,
        total_findings: progress.total_findings,
        progress_percent: progress.progress_percent,
        status: JobPhase::Processing,
        status_message: String::new(),
        step_function_status: None,
        data_source: "cached",
        cache_refreshed_at,
        cache_refresh_duration_ms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_connectors::ExecutionState::*;

    #[test]
    fn running_execution_reports_listing() {
        for counters in [(0, 0), (100, 0), (100, 100)] {
            let (phase, _) = derive_overall_status(Some(Running), counters.0, counters.1);
            assert_eq!(phase, JobPhase::Listing);
        }
    }

    #[test]
    fn succeeded_execution_with_no_objects_is_completed() {
        let (phase, message) = derive_overall_status(Some(Succeeded), 0, 0);
        assert_eq!(phase, JobPhase::Completed);
        assert_eq!(message, "No objects found to scan");
    }

    #[test]
    fn succeeded_execution_with_all_objects_done_is_completed() {
        let (phase, message) = derive_overall_status(Some(Succeeded), 10, 10);
        assert_eq!(phase, JobPhase::Completed);
        assert_eq!(message, "All objects scanned");

        // Failed objects still count toward completion.
        let (phase, _) = derive_overall_status(Some(Succeeded), 10, 12);
        assert_eq!(phase, JobPhase::Completed);
    }

    #[test]
    fn succeeded_execution_with_remaining_objects_is_processing() {
        let (phase, message) = derive_overall_status(Some(Succeeded), 10, 4);
        assert_eq!(phase, JobPhase::Processing);
        assert_eq!(message, "Scanning objects (4/10)");
    }

    #[test]
    fn failed_and_timed_out_executions_report_failed() {
        for (state, expected) in [
            (Failed, "Step Functions execution failed"),
            (TimedOut, "Step Functions execution timed out"),
        ] {
            let (phase, message) = derive_overall_status(Some(state), 10, 4);
            assert_eq!(phase, JobPhase::Failed);
            assert_eq!(message, expected);
        }
    }

    #[test]
    fn aborted_execution_reports_aborted() {
        let (phase, _) = derive_overall_status(Some(Aborted), 10, 4);
        assert_eq!(phase, JobPhase::Aborted);
    }

    #[test]
    fn missing_execution_reasons_from_counters() {
        let (phase, _) = derive_overall_status(None, 0, 0);
        assert_eq!(phase, JobPhase::Completed);

        let (phase, _) = derive_overall_status(None, 10, 4);
        assert_eq!(phase, JobPhase::Processing);

        let (phase, _) = derive_overall_status(None, 10, 10);
        assert_eq!(phase, JobPhase::Completed);
    }

    #[test]
    fn progress_percent_handles_zero_total() {
        assert_eq!(progress_percent(0, 0), 0.0);
        assert_eq!(progress_percent(4, 2), 50.0);
        assert_eq!(progress_percent(25_000, 25_000), 100.0);
    }

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobPhase::Listing).unwrap(),
            r#""listing""#
        );
        assert_eq!(
            serde_json::to_string(&JobPhase::Completed).unwrap(),
            r#""completed""#
        );
    }
}
