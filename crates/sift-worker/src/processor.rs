//! Per-envelope processing: mark processing, gate, download, detect,
//! persist, and mark terminal.

use tracing::{debug, error, info, warn};

use sift_connectors::ObjectStoreClient;
use sift_core::{Detector, ObjectStatus, ScanEnvelope};
use sift_store::Database;

/// Extensions the scanner will read. Everything else is skipped.
const TEXT_EXTENSIONS: [&str; 4] = [".txt", ".csv", ".json", ".log"];

/// How processing one envelope ended. Every variant is an acknowledgeable
/// classification; failures that escape classification never construct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Succeeded { findings: usize },
    /// Gate rejection or undecodable body; the object row is `succeeded`
    /// with no findings.
    Skipped,
    Failed { error: String },
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Succeeded { .. } => "succeeded",
            ProcessOutcome::Skipped => "skipped",
            ProcessOutcome::Failed { .. } => "failed",
        }
    }

    pub fn findings(&self) -> usize {
        match self {
            ProcessOutcome::Succeeded { findings } => *findings,
            _ => 0,
        }
    }
}

/// Scans one object per envelope. One instance is shared across the batch
/// fan-out; everything inside is either pooled or cheap to clone.
#[derive(Clone)]
pub struct Processor {
    db: Database,
    store: ObjectStoreClient,
    detector: Detector,
    max_file_size_bytes: i64,
}

impl Processor {
    pub fn new(db: Database, store: ObjectStoreClient, max_file_size_bytes: i64) -> Self {
        Self {
            db,
            store,
            detector: Detector::new(),
            max_file_size_bytes,
        }
    }

    /// Process one envelope to a classified outcome. Errors in the pipeline
    /// are mapped to a `failed` object row with the error text; this method
    /// itself never fails, so the caller can always acknowledge.
    pub async fn process_envelope(&self, envelope: &ScanEnvelope) -> ProcessOutcome {
        match self.scan_object(envelope).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = e.to_string();
                error!(
                    "Error processing {}/{}: {}",
                    envelope.bucket, envelope.key, error
                );
                if let Err(db_err) = self
                    .update_status(envelope, ObjectStatus::Failed, Some(&error))
                    .await
                {
                    error!(
                        "Failed to record failure for {}/{}: {}",
                        envelope.bucket, envelope.key, db_err
                    );
                }
                ProcessOutcome::Failed { error }
            }
        }
    }

    async fn scan_object(&self, envelope: &ScanEnvelope) -> anyhow::Result<ProcessOutcome> {
        self.update_status(envelope, ObjectStatus::Processing, None)
            .await?;

        let meta = self.store.head(&envelope.bucket, &envelope.key).await?;

        if !should_process(&envelope.key, meta.size, self.max_file_size_bytes) {
            self.update_status(envelope, ObjectStatus::Succeeded, None)
                .await?;
            return Ok(ProcessOutcome::Skipped);
        }

        let content = self.store.get(&envelope.bucket, &envelope.key).await?;

        let text = match decode_text(&content) {
            Some(text) => text,
            None => {
                warn!(
                    "Could not decode {}/{}, skipping",
                    envelope.bucket, envelope.key
                );
                self.update_status(
                    envelope,
                    ObjectStatus::Succeeded,
                    Some("Could not decode file"),
                )
                .await?;
                return Ok(ProcessOutcome::Skipped);
            }
        };

        let findings = self.detector.scan(&text);
        let findings_count = if findings.is_empty() {
            0
        } else {
            self.db
                .insert_findings(
                    &findings,
                    envelope.job_id,
                    &envelope.bucket,
                    &envelope.key,
                    &envelope.etag,
                )
                .await?
        };

        self.update_status(envelope, ObjectStatus::Succeeded, None)
            .await?;

        info!(
            "Processed {}/{}: {} findings",
            envelope.bucket, envelope.key, findings_count
        );

        Ok(ProcessOutcome::Succeeded {
            findings: findings_count,
        })
    }

    async fn update_status(
        &self,
        envelope: &ScanEnvelope,
        status: ObjectStatus,
        last_error: Option<&str>,
    ) -> anyhow::Result<bool> {
        self.db
            .update_object_status(
                envelope.job_id,
                &envelope.bucket,
                &envelope.key,
                &envelope.etag,
                status,
                last_error,
            )
            .await
    }
}

/// Extension and size gate. Only the allow-listed text extensions are read,
/// case-insensitively, and only below the size ceiling.
pub fn should_process(key: &str, size: i64, max_bytes: i64) -> bool {
    if size > max_bytes {
        warn!("Skipping {}: file too large ({} bytes)", key, size);
        return false;
    }

    let key_lower = key.to_ascii_lowercase();
    if TEXT_EXTENSIONS.iter().any(|ext| key_lower.ends_with(ext)) {
        return true;
    }

    debug!("Skipping {}: unsupported file extension", key);
    false
}

/// Decode body bytes as UTF-8, falling back to latin-1. The fallback maps
/// every byte to a scalar, so `None` only becomes reachable if the fallback
/// is ever narrowed; the skip path stays wired for that.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text.to_string()),
        Err(_) => Some(bytes.iter().map(|&b| b as char).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_accepts_allowed_extensions() {
        for key in ["a.txt", "b.csv", "c.json", "d.log", "UPPER.TXT", "dir/nested.Log"] {
            assert!(should_process(key, 10, 1024), "{key} should pass the gate");
        }
    }

    #[test]
    fn gate_rejects_other_extensions() {
        for key in ["image.png", "archive.zip", "binary", "notes.txt.bak", "data.parquet"] {
            assert!(!should_process(key, 10, 1024), "{key} should be gated out");
        }
    }

    #[test]
    fn gate_rejects_oversize_regardless_of_extension() {
        assert!(!should_process("big.txt", 1025, 1024));
        // At the ceiling is still allowed.
        assert!(should_process("fits.txt", 1024, 1024));
    }

    #[test]
    fn decode_prefers_utf8() {
        assert_eq!(decode_text("héllo".as_bytes()).unwrap(), "héllo");
    }

    #[test]
    fn decode_falls_back_to_latin1() {
        // 0xE9 is 'é' in latin-1 but invalid as a UTF-8 sequence here.
        let bytes = [b'c', b'a', b'f', 0xE9];
        assert_eq!(decode_text(&bytes).unwrap(), "café");
    }

    #[test]
    fn outcome_labels_and_findings() {
        assert_eq!(ProcessOutcome::Succeeded { findings: 3 }.label(), "succeeded");
        assert_eq!(ProcessOutcome::Skipped.label(), "skipped");
        assert_eq!(
            ProcessOutcome::Failed { error: "boom".to_string() }.label(),
            "failed"
        );
        assert_eq!(ProcessOutcome::Succeeded { findings: 3 }.findings(), 3);
        assert_eq!(ProcessOutcome::Skipped.findings(), 0);
    }
}
