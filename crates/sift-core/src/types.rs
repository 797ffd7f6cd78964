//! Domain types shared by the lister, worker, and API surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// On-wire record bound to one message-bus entry: the coordinates needed to
/// scan a single object version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEnvelope {
    pub job_id: Uuid,
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub etag: String,
}

impl ScanEnvelope {
    /// An envelope missing its coordinates cannot be processed and is left
    /// to the bus's redrive policy.
    pub fn is_complete(&self) -> bool {
        !self.bucket.is_empty() && !self.key.is_empty()
    }
}

/// Lifecycle of a job object. Advances queued → processing → terminal;
/// succeeded and failed are terminal for a given (job, key, etag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "object_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl ObjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectStatus::Queued => "queued",
            ObjectStatus::Processing => "processing",
            ObjectStatus::Succeeded => "succeeded",
            ObjectStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ObjectStatus::Succeeded | ObjectStatus::Failed)
    }
}

/// One object returned by a listing page. The etag is stored unquoted and
/// treated as content identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedObject {
    pub bucket: String,
    pub key: String,
    pub etag: String,
    pub size: i64,
}

/// Input state for one lister iteration. The durable loop persists this
/// document between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListBatchState {
    pub job_id: Uuid,
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub continuation_token: Option<String>,
    #[serde(default)]
    pub objects_processed: u64,
}

impl ListBatchState {
    /// Initial state for a fresh scan over `bucket`/`prefix`.
    pub fn initial(job_id: Uuid, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            job_id,
            bucket: bucket.into(),
            prefix: prefix.into(),
            continuation_token: None,
            objects_processed: 0,
        }
    }
}

/// Output state of one lister iteration; the loop driver feeds it back in
/// until `done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListBatchOutput {
    pub job_id: Uuid,
    pub bucket: String,
    pub prefix: String,
    pub continuation_token: Option<String>,
    pub objects_processed: u64,
    pub batch_size: u64,
    pub messages_enqueued: u64,
    pub done: bool,
}

impl ListBatchOutput {
    /// The state the next iteration should run with.
    pub fn next_state(&self) -> ListBatchState {
        ListBatchState {
            job_id: self.job_id,
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            continuation_token: self.continuation_token.clone(),
            objects_processed: self.objects_processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let envelope = ScanEnvelope {
            job_id: Uuid::nil(),
            bucket: "data-bucket".to_string(),
            key: "reports/q3.csv".to_string(),
            etag: "abc123".to_string(),
        };

        let json = serde_json::to_string(&envelope).unwrap();
        let deserialized: ScanEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.bucket, "data-bucket");
        assert_eq!(deserialized.key, "reports/q3.csv");
        assert_eq!(deserialized.etag, "abc123");
        assert!(deserialized.is_complete());
    }

    #[test]
    fn envelope_etag_defaults_to_empty() {
        let envelope: ScanEnvelope = serde_json::from_str(
            r#"{"job_id":"00000000-0000-0000-0000-000000000000","bucket":"b","key":"k"}"#,
        )
        .unwrap();
        assert_eq!(envelope.etag, "");
        assert!(envelope.is_complete());
    }

    #[test]
    fn envelope_missing_key_is_rejected() {
        let result: Result<ScanEnvelope, _> = serde_json::from_str(
            r#"{"job_id":"00000000-0000-0000-0000-000000000000","bucket":"b"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn envelope_with_empty_bucket_is_incomplete() {
        let envelope: ScanEnvelope = serde_json::from_str(
            r#"{"job_id":"00000000-0000-0000-0000-000000000000","bucket":"","key":"k"}"#,
        )
        .unwrap();
        assert!(!envelope.is_complete());
    }

    #[test]
    fn status_terminality() {
        assert!(!ObjectStatus::Queued.is_terminal());
        assert!(!ObjectStatus::Processing.is_terminal());
        assert!(ObjectStatus::Succeeded.is_terminal());
        assert!(ObjectStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ObjectStatus::Succeeded).unwrap(),
            r#""succeeded""#
        );
    }

    #[test]
    fn list_state_defaults_and_feedback() {
        let state: ListBatchState = serde_json::from_str(
            r#"{"job_id":"00000000-0000-0000-0000-000000000000","bucket":"b"}"#,
        )
        .unwrap();
        assert_eq!(state.prefix, "");
        assert!(state.continuation_token.is_none());
        assert_eq!(state.objects_processed, 0);

        let output = ListBatchOutput {
            job_id: state.job_id,
            bucket: state.bucket.clone(),
            prefix: state.prefix.clone(),
            continuation_token: Some("token-1".to_string()),
            objects_processed: 10_000,
            batch_size: 10_000,
            messages_enqueued: 10_000,
            done: false,
        };
        let next = output.next_state();
        assert_eq!(next.continuation_token.as_deref(), Some("token-1"));
        assert_eq!(next.objects_processed, 10_000);
    }
}
