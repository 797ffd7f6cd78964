//! Progress cache: the `job_progress` materialized view and its refresh log.
//!
//! Only the refresher writes here; the API reads. Readers tolerate staleness
//! bounded by the refresh interval and fall back to real-time queries when a
//! job has no cached row yet.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Database;

const VIEW_NAME: &str = "job_progress";

/// One job's cached progress projection.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProgressRow {
    pub job_id: Uuid,
    pub bucket: String,
    pub prefix: String,
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
}

/// The singleton refresh-log row for a view.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RefreshLogRow {
    pub view_name: String,
    pub last_refreshed_at: DateTime<Utc>,
    pub refresh_duration_ms: i32,
    pub total_jobs: i32,
    pub total_objects: i64,
}

/// Aggregate statistics read after a refresh.
#[derive(Debug, Clone, Copy, Default, Serialize, FromRow)]
pub struct RefreshStats {
    pub total_jobs: i64,
    pub total_objects: i64,
    pub processed_objects: i64,
    pub total_findings: i64,
    pub active_jobs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshType {
    Concurrent,
    Blocking,
}

/// Outcome of one refresh attempt. A missing view is a distinguished
/// non-fatal failure; database errors surface as `Err`.
#[derive(Debug, Clone)]
pub enum RefreshResult {
    Refreshed {
        duration_ms: u64,
        refresh_type: RefreshType,
        refreshed_at: DateTime<Utc>,
        stats: RefreshStats,
    },
    ViewMissing,
}

impl Database {
    async fn progress_view_exists(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM pg_matviews
                WHERE schemaname = 'public' AND matviewname = $1
             )",
        )
        .bind(VIEW_NAME)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    /// Refresh the progress projection. Tries a concurrent refresh first so
    /// readers are not locked out; falls back to a blocking refresh when
    /// that fails (no unique index, or a first refresh that never
    /// populated). Records the outcome in the refresh log.
    pub async fn refresh_progress(&self) -> Result<RefreshResult> {
        if !self.progress_view_exists().await? {
            warn!("{} materialized view does not exist", VIEW_NAME);
            return Ok(RefreshResult::ViewMissing);
        }

        let started = std::time::Instant::now();
        let refresh_type = match sqlx::query("REFRESH MATERIALIZED VIEW CONCURRENTLY job_progress")
            .execute(self.pool())
            .await
        {
            Ok(_) => RefreshType::Concurrent,
            Err(e) => {
                warn!("Concurrent refresh failed ({}), trying blocking refresh", e);
                sqlx::query("REFRESH MATERIALIZED VIEW job_progress")
                    .execute(self.pool())
                    .await?;
                RefreshType::Blocking
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        let refreshed_at = Utc::now();

        let stats: RefreshStats = sqlx::query_as(
            "SELECT
                COUNT(*) AS total_jobs,
                COALESCE(SUM(total), 0)::bigint AS total_objects,
                COALESCE(SUM(succeeded), 0)::bigint AS processed_objects,
                COALESCE(SUM(total_findings), 0)::bigint AS total_findings,
                COALESCE(SUM(CASE WHEN queued > 0 OR processing > 0 THEN 1 ELSE 0 END), 0)::bigint
                    AS active_jobs
             FROM job_progress",
        )
        .fetch_one(self.pool())
        .await?;

        sqlx::query(
            "INSERT INTO materialized_view_refresh_log
                (view_name, last_refreshed_at, refresh_duration_ms, total_jobs, total_objects)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (view_name) DO UPDATE SET
                last_refreshed_at = EXCLUDED.last_refreshed_at,
                refresh_duration_ms = EXCLUDED.refresh_duration_ms,
                total_jobs = EXCLUDED.total_jobs,
                total_objects = EXCLUDED.total_objects",
        )
        .bind(VIEW_NAME)
        .bind(refreshed_at)
        .bind(duration_ms as i32)
        .bind(stats.total_jobs as i32)
        .bind(stats.total_objects)
        .execute(self.pool())
        .await?;

        info!(
            "Refreshed {} in {}ms ({:?}): {} jobs, {} objects",
            VIEW_NAME, duration_ms, refresh_type, stats.total_jobs, stats.total_objects
        );

        Ok(RefreshResult::Refreshed {
            duration_ms,
            refresh_type,
            refreshed_at,
            stats,
        })
    }

    /// Cached progress row for a job, if the view has caught up with it.
    pub async fn get_progress(&self, job_id: Uuid) -> Result<Option<ProgressRow>> {
        if !self.progress_view_exists().await? {
            return Ok(None);
        }
        let row = sqlx::query_as(
            "SELECT job_id, bucket, prefix, execution_arn, created_at, updated_at,
                    total, queued, processing, succeeded, failed, total_findings,
                    progress_percent
             FROM job_progress
             WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// When the view was last refreshed, and how long it took.
    pub async fn get_refresh_log(&self) -> Result<Option<RefreshLogRow>> {
        let row = sqlx::query_as(
            "SELECT view_name, last_refreshed_at, refresh_duration_ms, total_jobs, total_objects
             FROM materialized_view_refresh_log
             WHERE view_name = $1",
        )
        .bind(VIEW_NAME)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }
}
