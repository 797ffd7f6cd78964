//! S3 object store adapter.
//!
//! Covers the three operations the scanner needs: one listing page at a time
//! (with continuation tokens), HEAD for gating metadata, and GET for body
//! bytes. ETags come back quoted from the protocol and are stored unquoted.

use aws_sdk_s3::error::DisplayErrorContext;
use sift_core::ListedObject;

use crate::error::ConnectorError;

/// One page of a listing: up to `page_size` objects plus the continuation
/// token to resume from, if the store reported truncation.
#[derive(Debug, Clone)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub next_token: Option<String>,
}

/// Metadata from a HEAD request.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: i64,
    pub content_type: Option<String>,
}

/// Object store client scoped to a region; buckets vary per job.
#[derive(Clone)]
pub struct ObjectStoreClient {
    client: aws_sdk_s3::Client,
}

impl ObjectStoreClient {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(config),
        }
    }

    /// Fetch one listing page under `bucket`/`prefix`, resuming from
    /// `continuation_token` when given.
    pub async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        page_size: i32,
    ) -> Result<ListPage, ConnectorError> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(page_size)
            .set_continuation_token(continuation_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                ConnectorError::ObjectStore(format!(
                    "list s3://{}/{}: {}",
                    bucket,
                    prefix,
                    DisplayErrorContext(&e)
                ))
            })?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?.to_string();
                Some(ListedObject {
                    bucket: bucket.to_string(),
                    key,
                    etag: obj.e_tag().unwrap_or_default().trim_matches('"').to_string(),
                    size: obj.size().unwrap_or(0),
                })
            })
            .collect();

        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    /// HEAD an object for its size and content type.
    pub async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta, ConnectorError> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                ConnectorError::ObjectStore(format!(
                    "head s3://{}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(ObjectMeta {
            size: response.content_length().unwrap_or(0),
            content_type: response.content_type().map(str::to_string),
        })
    }

    /// Download an object's body bytes.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ConnectorError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                ConnectorError::ObjectStore(format!(
                    "get s3://{}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        let body = response.body.collect().await.map_err(|e| {
            ConnectorError::ObjectStore(format!("read body s3://{}/{}: {}", bucket, key, e))
        })?;

        Ok(body.into_bytes().to_vec())
    }

    /// Upload an object; used by the seeder tooling.
    pub async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ConnectorError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body.into())
            .send()
            .await
            .map_err(|e| {
                ConnectorError::ObjectStore(format!(
                    "put s3://{}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
