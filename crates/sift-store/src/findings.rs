//! Finding persistence and the paginated findings query.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use sift_core::detector::Match;

use crate::db::Database;

/// Rows per bulk-insert statement for findings.
const INSERT_PAGE_SIZE: usize = 100;

/// A stored finding.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FindingRow {
    pub id: i64,
    pub job_id: Uuid,
    pub bucket: String,
    pub key: String,
    pub etag: String,
    pub detector: String,
    pub masked_match: String,
    pub context: String,
    pub byte_offset: i64,
    pub created_at: DateTime<Utc>,
}

/// Filters shared by the findings query and its total count.
#[derive(Debug, Clone, Default)]
pub struct FindingsFilter {
    pub job_id: Option<Uuid>,
    pub bucket: Option<String>,
    /// Matched as a key prefix.
    pub key_prefix: Option<String>,
}

/// Exactly one pagination mode is active per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Rows with `id` strictly below the cursor, newest id first.
    Cursor(i64),
    /// Creation-time ordering with a row offset.
    Offset(i64),
}

/// The cursor a client should pass to fetch the page after `rows`.
pub fn next_cursor(rows: &[FindingRow]) -> Option<i64> {
    rows.last().map(|r| r.id)
}

/// Append the shared WHERE clause for `filter`, plus the cursor bound when
/// cursor pagination is active. The count query and the page query must both
/// go through here so they agree.
fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &FindingsFilter,
    cursor: Option<i64>,
) {
    let mut separator = " WHERE ";
    if let Some(job_id) = filter.job_id {
        builder.push(separator).push("job_id = ").push_bind(job_id);
        separator = " AND ";
    }
    if let Some(bucket) = &filter.bucket {
        builder
            .push(separator)
            .push("bucket = ")
            .push_bind(bucket.clone());
        separator = " AND ";
    }
    if let Some(prefix) = &filter.key_prefix {
        builder
            .push(separator)
            .push("key LIKE ")
            .push_bind(format!("{}%", prefix));
        separator = " AND ";
    }
    if let Some(cursor) = cursor {
        builder.push(separator).push("id < ").push_bind(cursor);
    }
}

impl Database {
    /// Batch-insert detector output for one object version. Duplicate rows
    /// collapse on the (bucket, key, etag, detector, byte_offset) uniqueness
    /// key. Returns the offered count, not the post-conflict insert count.
    pub async fn insert_findings(
        &self,
        findings: &[Match],
        job_id: Uuid,
        bucket: &str,
        key: &str,
        etag: &str,
    ) -> Result<usize> {
        if findings.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool().begin().await?;

        for page in findings.chunks(INSERT_PAGE_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO findings
                 (job_id, bucket, key, etag, detector, masked_match, context, byte_offset, created_at) ",
            );
            builder.push_values(page, |mut row, finding| {
                row.push_bind(job_id)
                    .push_bind(bucket)
                    .push_bind(key)
                    .push_bind(etag)
                    .push_bind(finding.kind.as_str())
                    .push_bind(&finding.masked_match)
                    .push_bind(&finding.context)
                    .push_bind(finding.byte_offset as i64)
                    .push("now()");
            });
            builder.push(" ON CONFLICT (bucket, key, etag, detector, byte_offset) DO NOTHING");

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(findings.len())
    }

    /// Findings under `filter`, paginated, plus the total count under the
    /// same filter.
    pub async fn get_findings(
        &self,
        filter: &FindingsFilter,
        pagination: Pagination,
        limit: i64,
    ) -> Result<(Vec<FindingRow>, i64)> {
        let cursor = match pagination {
            Pagination::Cursor(id) => Some(id),
            Pagination::Offset(_) => None,
        };

        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM findings");
        push_filters(&mut count_builder, filter, cursor);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(self.pool())
            .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, job_id, bucket, key, etag, detector, masked_match, context, byte_offset, created_at
             FROM findings",
        );
        push_filters(&mut builder, filter, cursor);
        match pagination {
            Pagination::Cursor(_) => {
                builder.push(" ORDER BY id DESC LIMIT ").push_bind(limit);
            }
            Pagination::Offset(offset) => {
                builder
                    .push(" ORDER BY created_at DESC LIMIT ")
                    .push_bind(limit)
                    .push(" OFFSET ")
                    .push_bind(offset);
            }
        }

        let rows = builder
            .build_query_as::<FindingRow>()
            .fetch_all(self.pool())
            .await?;

        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built_sql(filter: &FindingsFilter, cursor: Option<i64>) -> String {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM findings");
        push_filters(&mut builder, filter, cursor);
        builder.sql().to_string()
    }

    #[test]
    fn no_filters_builds_bare_query() {
        let sql = built_sql(&FindingsFilter::default(), None);
        assert_eq!(sql, "SELECT COUNT(*) FROM findings");
    }

    #[test]
    fn filters_joined_with_and() {
        let filter = FindingsFilter {
            job_id: Some(Uuid::nil()),
            bucket: Some("b".to_string()),
            key_prefix: Some("reports/".to_string()),
        };
        let sql = built_sql(&filter, Some(42));
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM findings WHERE job_id = $1 AND bucket = $2 \
             AND key LIKE $3 AND id < $4"
        );
    }

    #[test]
    fn cursor_alone_still_gets_where() {
        let sql = built_sql(&FindingsFilter::default(), Some(10));
        assert_eq!(sql, "SELECT COUNT(*) FROM findings WHERE id < $1");
    }

    fn row(id: i64) -> FindingRow {
        FindingRow {
            id,
            job_id: Uuid::nil(),
            bucket: "b".to_string(),
            key: "k.txt".to_string(),
            etag: "e".to_string(),
            detector: "ssn".to_string(),
            masked_match: "XXX-XX-6789".to_string(),
            context: String::new(),
            byte_offset: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn next_cursor_is_last_row_id() {
        assert_eq!(next_cursor(&[]), None);

        // Pages come back in descending id order; the cursor for the next
        // page is the id of the last (lowest-id) row.
        let rows = vec![row(42), row(41), row(40)];
        assert_eq!(next_cursor(&rows), Some(40));
    }
}
