//! Worker configuration from environment variables.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue_url: String,
    pub region: Option<String>,
    /// Receive batch size; the bus caps a single receive at 10.
    pub batch_size: usize,
    /// Per-batch processing parallelism.
    pub max_workers: usize,
    /// Per-object size ceiling.
    pub max_file_size_mb: i64,
    pub metrics_port: u16,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            queue_url: std::env::var("SQS_QUEUE_URL").context("SQS_QUEUE_URL required")?,
            region: std::env::var("AWS_REGION").ok(),
            batch_size: std::env::var("BATCH_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid BATCH_SIZE")?,
            max_workers: std::env::var("MAX_WORKERS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid MAX_WORKERS")?,
            max_file_size_mb: std::env::var("MAX_FILE_SIZE_MB")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("Invalid MAX_FILE_SIZE_MB")?,
            metrics_port: std::env::var("METRICS_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .context("Invalid METRICS_PORT")?,
        })
    }

    pub fn max_file_size_bytes(&self) -> i64 {
        self.max_file_size_mb * 1024 * 1024
    }
}
