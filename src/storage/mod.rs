//! Storage backend abstraction layer
//!
//! Every call the API makes against object storage goes through the
//! [`StorageBackend`] trait. Each method maps to exactly one request against
//! the provider; composite behaviour (emptying a bucket, force deletes) lives
//! one layer up in [`crate::s3::S3Service`].

mod aws;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{BackendType, Config};

pub use aws::AwsBackend;
pub use memory::MemoryBackend;

/// Errors raised by a storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("NoSuchBucket: The specified bucket does not exist: {0}")]
    NoSuchBucket(String),

    #[error("NoSuchKey: The specified key does not exist: {0}")]
    NoSuchKey(String),

    #[error("BucketNotEmpty: The bucket you tried to delete is not empty: {0}")]
    BucketNotEmpty(String),

    #[error("BucketAlreadyOwnedByYou: The bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("Invalid presign expiry: {0}")]
    Presign(String),

    /// Error reported by the storage service or the SDK
    #[error("{0}")]
    Service(String),
}

/// A bucket as reported by the provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
}

/// An object entry in a listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// One page of a bucket listing
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectInfo>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Parameters of a single list call
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub prefix: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: Option<i32>,
}

/// An object body fetched from the store
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A key the store failed to delete in a bulk delete
#[derive(Debug, Clone, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-key result of a bulk delete
#[derive(Debug, Clone, Default)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub errors: Vec<DeleteFailure>,
}

/// Maximum number of keys a single bulk delete may carry
pub const MAX_DELETE_BATCH: usize = 1000;

/// Largest page a single list call returns
pub const MAX_LIST_KEYS: i32 = 1000;

/// Storage backend trait for bucket and object operations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create a bucket, returning the location reported by the provider
    async fn create_bucket(&self, bucket: &str) -> Result<Option<String>, StorageError>;

    /// List every bucket owned by the configured credentials
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Store an object, returning its ETag when the provider reports one
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<Option<String>, StorageError>;

    /// Fetch a whole object into memory
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError>;

    /// Produce a time-limited GET URL for an object
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    /// List one page of objects
    async fn list_objects(
        &self,
        bucket: &str,
        request: ListRequest,
    ) -> Result<ObjectPage, StorageError>;

    /// Delete a single object
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Delete up to [`MAX_DELETE_BATCH`] objects in one request
    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<DeleteOutcome, StorageError>;

    /// Public URL of an object, as reported after an upload
    fn object_location(&self, bucket: &str, key: &str) -> String;
}

/// Create a storage backend based on configuration
pub async fn create_backend(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config.backend.backend_type {
        BackendType::Aws => {
            let backend = AwsBackend::new(&config.backend).await?;
            Ok(Arc::new(backend))
        }
        BackendType::Memory => {
            let base = format!("http://{}", config.server.bind_address);
            Ok(Arc::new(MemoryBackend::new(&base)?))
        }
    }
}

/// Append `bucket` and `key` to `base` as percent-encoded path segments.
///
/// Segments are encoded by hand: `.` and `..` are part of the key and must
/// not be resolved away, so they are written as `%2E` / `%2E%2E`.
pub(crate) fn join_object_url(base: &str, bucket: &str, key: &str) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    let segments = std::iter::once(bucket)
        .filter(|b| !b.is_empty())
        .chain(key.split('/'));
    for segment in segments {
        url.push('/');
        match segment {
            "." => url.push_str("%2E"),
            ".." => url.push_str("%2E%2E"),
            _ => url.push_str(&urlencoding::encode(segment)),
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_object_url_encodes_segments() {
        assert_eq!(
            join_object_url("http://localhost:9000", "photos", "2024/summer trip.jpg"),
            "http://localhost:9000/photos/2024/summer%20trip.jpg"
        );
        assert_eq!(
            join_object_url("https://photos.s3.us-east-1.amazonaws.com/", "", "a/b.txt"),
            "https://photos.s3.us-east-1.amazonaws.com/a/b.txt"
        );
    }

    #[test]
    fn test_join_object_url_keeps_dot_segments() {
        assert_eq!(
            join_object_url("http://localhost:3000/", "docs", "a/../b.txt"),
            "http://localhost:3000/docs/a/%2E%2E/b.txt"
        );
        assert_eq!(
            join_object_url("http://localhost:3000", "docs", "./c.txt"),
            "http://localhost:3000/docs/%2E/c.txt"
        );
        assert_eq!(
            join_object_url("http://minio:9000/s3", "docs", "x/.hidden/..y"),
            "http://minio:9000/s3/docs/x/.hidden/..y"
        );
    }
}
