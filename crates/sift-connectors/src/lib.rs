//! Sift Connectors - AWS service adapters
//!
//! Thin domain wrappers over the AWS SDK clients:
//! - S3: paginated listing, metadata HEAD, body GET
//! - SQS: batched fair-queue submission, long-poll receive, batch delete
//! - Step Functions: durable listing-loop executions

pub mod error;
pub mod s3;
pub mod sfn;
pub mod sqs;

pub use error::ConnectorError;
pub use s3::{ListPage, ObjectMeta, ObjectStoreClient};
pub use sfn::{ExecutionState, StepFunctionsClient};
pub use sqs::{QueueClient, ReceivedMessage};

/// Load the shared AWS configuration, honoring an explicit region override.
pub async fn load_aws_config(region: Option<String>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region));
    }
    loader.load().await
}
