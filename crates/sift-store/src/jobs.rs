//! Job and job-object persistence.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use sift_core::{ListedObject, ObjectStatus};

use crate::db::Database;

/// Rows per bulk-insert statement when queueing listed objects.
const INSERT_PAGE_SIZE: usize = 1000;

/// A scan job row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct JobRow {
    pub job_id: Uuid,
    pub bucket: String,
    pub prefix: String,
    pub execution_arn: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status-bucketed object counts plus the findings total for one job.
#[derive(Debug, Clone, Copy, Default, Serialize, FromRow)]
pub struct JobStats {
    pub queued: i64,
    pub processing: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub total: i64,
    pub total_findings: i64,
}

impl JobStats {
    /// Objects that reached a terminal state.
    pub fn completed(&self) -> i64 {
        self.succeeded + self.failed
    }
}

impl Database {
    /// Create the job row. `execution_arn` is present when the durable loop
    /// was started for this job.
    pub async fn create_job(
        &self,
        job_id: Uuid,
        bucket: &str,
        prefix: &str,
        execution_arn: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (job_id, bucket, prefix, execution_arn, created_at, updated_at)
             VALUES ($1, $2, $3, $4, now(), now())",
        )
        .bind(job_id)
        .bind(bucket)
        .bind(prefix)
        .bind(execution_arn)
        .execute(self.pool())
        .await
        .context("Error creating job")?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRow>> {
        let job = sqlx::query_as(
            "SELECT job_id, bucket, prefix, execution_arn, created_at, updated_at
             FROM jobs WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(job)
    }

    /// Bulk-insert listed objects as `queued`. Conflict-do-nothing so a
    /// re-run of the same listing page after a crash is harmless.
    pub async fn insert_job_objects(
        &self,
        job_id: Uuid,
        objects: &[ListedObject],
    ) -> Result<u64> {
        if objects.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool().begin().await?;
        let mut inserted = 0u64;

        for page in objects.chunks(INSERT_PAGE_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO job_objects (job_id, bucket, key, etag, status, updated_at) ",
            );
            builder.push_values(page, |mut row, obj| {
                row.push_bind(job_id)
                    .push_bind(&obj.bucket)
                    .push_bind(&obj.key)
                    .push_bind(&obj.etag)
                    .push_bind(ObjectStatus::Queued)
                    .push("now()");
            });
            builder.push(" ON CONFLICT DO NOTHING");

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Targeted status update for one object version. Returns true iff a row
    /// matched the (job, bucket, key, etag) coordinates.
    pub async fn update_object_status(
        &self,
        job_id: Uuid,
        bucket: &str,
        key: &str,
        etag: &str,
        status: ObjectStatus,
        last_error: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE job_objects
             SET status = $1, last_error = $2, updated_at = now()
             WHERE job_id = $3 AND bucket = $4 AND key = $5 AND etag = $6",
        )
        .bind(status)
        .bind(last_error)
        .bind(job_id)
        .bind(bucket)
        .bind(key)
        .bind(etag)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Status-bucketed counts and findings total, zero-filled when the job
    /// has no objects.
    pub async fn get_job_stats(&self, job_id: Uuid) -> Result<JobStats> {
        let stats = sqlx::query_as(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'queued') AS queued,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'succeeded') AS succeeded,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) AS total,
                (SELECT COUNT(*) FROM findings f WHERE f.job_id = $1) AS total_findings
             FROM job_objects
             WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_one(self.pool())
        .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_sums_terminal_states() {
        let stats = JobStats {
            queued: 3,
            processing: 2,
            succeeded: 4,
            failed: 1,
            total: 10,
            total_findings: 7,
        };
        assert_eq!(stats.completed(), 5);
        assert_eq!(JobStats::default().completed(), 0);
    }
}
