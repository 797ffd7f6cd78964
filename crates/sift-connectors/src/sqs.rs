//! SQS message bus adapter.
//!
//! Batch submission uses the bus maximum of 10 entries per call, with the
//! bucket name as the message group key so throughput stays fair across
//! tenants. Submission of many batches is scattered over a bounded set of
//! concurrent in-flight sends with a join barrier.

use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{DeleteMessageBatchRequestEntry, SendMessageBatchRequestEntry};
use futures::StreamExt;
use sift_core::{ListedObject, ScanEnvelope};
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::ConnectorError;

/// Bus maximum entries per batch send/delete call.
pub const BUS_BATCH_MAX: usize = 10;

/// Concurrent in-flight batch submissions during enqueue.
pub const ENQUEUE_CONCURRENCY: usize = 20;

/// A message pulled off the queue, pending acknowledgment.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub body: String,
    pub receipt_handle: String,
}

/// Message bus client bound to one queue URL. Cheap to clone and share.
#[derive(Clone)]
pub struct QueueClient {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl QueueClient {
    pub fn new(config: &aws_config::SdkConfig, queue_url: impl Into<String>) -> Self {
        Self {
            client: aws_sdk_sqs::Client::new(config),
            queue_url: queue_url.into(),
        }
    }

    /// Send one batch (≤10 objects) of scan envelopes. Partial failures are
    /// logged and excluded from the returned success tally; a failed call
    /// counts as zero sent. Enqueue never fails the caller.
    pub async fn send_batch(
        &self,
        job_id: Uuid,
        batch: &[ListedObject],
        batch_index: usize,
    ) -> usize {
        let mut entries = Vec::with_capacity(batch.len());
        for (j, obj) in batch.iter().enumerate() {
            let envelope = ScanEnvelope {
                job_id,
                bucket: obj.bucket.clone(),
                key: obj.key.clone(),
                etag: obj.etag.clone(),
            };
            let body = match serde_json::to_string(&envelope) {
                Ok(body) => body,
                Err(e) => {
                    error!("Failed to serialize envelope for {}: {}", obj.key, e);
                    continue;
                }
            };
            let entry = SendMessageBatchRequestEntry::builder()
                .id(format!("{}-{}", batch_index, j))
                .message_body(body)
                // Fair scheduling across buckets (tenants)
                .message_group_id(&obj.bucket)
                .build();
            match entry {
                Ok(entry) => entries.push(entry),
                Err(e) => error!("Failed to build batch entry for {}: {}", obj.key, e),
            }
        }

        if entries.is_empty() {
            return 0;
        }
        let offered = entries.len();

        match self
            .client
            .send_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(entries))
            .send()
            .await
        {
            Ok(response) => {
                let failed = response.failed().len();
                if failed > 0 {
                    warn!("Batch {}: {} messages failed to send", batch_index, failed);
                }
                offered - failed
            }
            Err(e) => {
                error!(
                    "Error sending batch {} to queue: {}",
                    batch_index,
                    DisplayErrorContext(&e)
                );
                0
            }
        }
    }

    /// Enqueue all objects, 10 per batch, with up to 20 batch sends in
    /// flight at once. Returns the number of messages successfully sent.
    pub async fn enqueue_objects(&self, job_id: Uuid, objects: &[ListedObject]) -> u64 {
        let batch_futs: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = usize> + Send + '_>>> =
            objects
                .chunks(BUS_BATCH_MAX)
                .enumerate()
                .map(|(batch_index, batch)| -> std::pin::Pin<
                    Box<dyn std::future::Future<Output = usize> + Send + '_>,
                > { Box::pin(self.send_batch(job_id, batch, batch_index)) })
                .collect();

        let sent: Vec<usize> = futures::stream::iter(batch_futs)
            .buffer_unordered(ENQUEUE_CONCURRENCY)
            .collect()
            .await;

        sent.into_iter().map(|n| n as u64).sum()
    }

    /// Long-poll the queue for up to `max_messages` (clamped to the bus
    /// maximum of 10), waiting up to `wait_seconds`.
    pub async fn receive(
        &self,
        max_messages: usize,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>, ConnectorError> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages.min(BUS_BATCH_MAX) as i32)
            .wait_time_seconds(wait_seconds)
            .send()
            .await
            .map_err(|e| {
                ConnectorError::Queue(format!("receive: {}", DisplayErrorContext(&e)))
            })?;

        Ok(response
            .messages()
            .iter()
            .filter_map(|m| {
                Some(ReceivedMessage {
                    body: m.body()?.to_string(),
                    receipt_handle: m.receipt_handle()?.to_string(),
                })
            })
            .collect())
    }

    /// Delete acknowledged messages, 10 per call. Entries the bus reports as
    /// failed are logged; redelivery handles them.
    pub async fn delete_batch(&self, receipt_handles: &[String]) -> Result<(), ConnectorError> {
        for chunk in receipt_handles.chunks(BUS_BATCH_MAX) {
            let mut entries = Vec::with_capacity(chunk.len());
            for (i, handle) in chunk.iter().enumerate() {
                let entry = DeleteMessageBatchRequestEntry::builder()
                    .id(i.to_string())
                    .receipt_handle(handle)
                    .build()
                    .map_err(|e| ConnectorError::Queue(format!("delete entry: {}", e)))?;
                entries.push(entry);
            }

            let response = self
                .client
                .delete_message_batch()
                .queue_url(&self.queue_url)
                .set_entries(Some(entries))
                .send()
                .await
                .map_err(|e| {
                    ConnectorError::Queue(format!("delete: {}", DisplayErrorContext(&e)))
                })?;

            let failed = response.failed().len();
            if failed > 0 {
                warn!("Failed to delete {} messages", failed);
            }
        }
        Ok(())
    }
}
