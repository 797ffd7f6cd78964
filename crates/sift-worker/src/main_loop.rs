//! Worker main loop — long-poll, fan out, acknowledge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tracing::{error, info, warn};

use sift_connectors::{QueueClient, ReceivedMessage};
use sift_core::ScanEnvelope;

use crate::config::WorkerConfig;
use crate::metrics::{OutcomeLabel, WorkerMetrics};
use crate::processor::{ProcessOutcome, Processor};

/// Long-poll wait per receive call.
const POLL_WAIT_SECONDS: i32 = 20;

/// Pause between busy iterations so the loop never spins.
const LOOP_PACING: Duration = Duration::from_secs(1);

/// Back-off after an iteration-level error.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Run the receive→dispatch→acknowledge loop until the shutdown flag is
/// set. The current iteration always completes; the flag is only checked
/// between iterations.
pub async fn run_worker_loop(
    config: WorkerConfig,
    queue: QueueClient,
    processor: Processor,
    metrics: WorkerMetrics,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    info!("Starting scanner worker main loop");
    let mut consecutive_empty_polls = 0u32;

    while !shutdown.load(Ordering::Relaxed) {
        match run_iteration(&config, &queue, &processor, &metrics).await {
            Ok(received) => {
                if received == 0 {
                    consecutive_empty_polls += 1;
                    if consecutive_empty_polls % 3 == 0 {
                        info!("No messages received, continuing to poll");
                    }
                    continue;
                }
                consecutive_empty_polls = 0;
                tokio::time::sleep(LOOP_PACING).await;
            }
            Err(e) => {
                error!("Error in main loop: {}", e);
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }

    info!("Scanner worker shutting down");
    Ok(())
}

/// One iteration: returns the number of messages received.
async fn run_iteration(
    config: &WorkerConfig,
    queue: &QueueClient,
    processor: &Processor,
    metrics: &WorkerMetrics,
) -> Result<usize> {
    let messages = queue.receive(config.batch_size, POLL_WAIT_SECONDS).await?;
    if messages.is_empty() {
        return Ok(0);
    }

    info!("Received {} messages from queue", messages.len());
    metrics.batches_received.inc();

    // Invalid or incomplete envelopes are dropped without acknowledgment;
    // the bus redrive policy owns poison messages.
    let tasks = parse_envelopes(&messages);

    metrics.in_flight.set(tasks.len() as i64);
    let results: Vec<(usize, ProcessOutcome)> =
        futures::stream::iter(tasks.iter().map(|(index, envelope)| async move {
            (*index, processor.process_envelope(envelope).await)
        }))
        .buffer_unordered(config.max_workers)
        .collect()
        .await;
    metrics.in_flight.set(0);

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut total_findings = 0usize;
    for (_, outcome) in &results {
        metrics
            .objects_processed
            .get_or_create(&OutcomeLabel(outcome.label().to_string()))
            .inc();
        match outcome {
            ProcessOutcome::Succeeded { findings } => {
                succeeded += 1;
                total_findings += findings;
            }
            ProcessOutcome::Failed { .. } => failed += 1,
            ProcessOutcome::Skipped => {}
        }
    }
    metrics.findings_detected.inc_by(total_findings as u64);

    info!(
        "Batch complete: {} succeeded, {} failed, {} total findings",
        succeeded, failed, total_findings
    );

    // Every classified outcome is acknowledged; succeeded, failed, and
    // skipped all mean the object row is terminal.
    let handles: Vec<String> = results
        .iter()
        .map(|(index, _)| messages[*index].receipt_handle.clone())
        .collect();
    if !handles.is_empty() {
        match queue.delete_batch(&handles).await {
            Ok(()) => info!("Deleted {} messages from queue", handles.len()),
            Err(e) => error!("Error deleting messages: {}", e),
        }
    }

    Ok(messages.len())
}

/// Pair each parseable, complete envelope with its message index.
fn parse_envelopes(messages: &[ReceivedMessage]) -> Vec<(usize, ScanEnvelope)> {
    let mut tasks = Vec::with_capacity(messages.len());
    for (index, message) in messages.iter().enumerate() {
        match serde_json::from_str::<ScanEnvelope>(&message.body) {
            Ok(envelope) if envelope.is_complete() => tasks.push((index, envelope)),
            Ok(_) => warn!("Invalid message: missing bucket or key"),
            Err(e) => error!("Failed to parse message: {}", e),
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn message(body: &str) -> ReceivedMessage {
        ReceivedMessage {
            body: body.to_string(),
            receipt_handle: "rh".to_string(),
        }
    }

    #[test]
    fn parses_complete_envelopes_with_indices() {
        let job_id = Uuid::nil();
        let good = format!(
            r#"{{"job_id":"{}","bucket":"b","key":"k.txt","etag":"e"}}"#,
            job_id
        );
        let messages = vec![
            message("not json"),
            message(&good),
            message(r#"{"job_id":"00000000-0000-0000-0000-000000000000","bucket":"","key":"k"}"#),
        ];

        let tasks = parse_envelopes(&messages);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].0, 1);
        assert_eq!(tasks[0].1.key, "k.txt");
    }

    #[test]
    fn malformed_batch_yields_no_tasks() {
        let messages = vec![message("{}"), message("[]"), message("")];
        assert!(parse_envelopes(&messages).is_empty());
    }
}
