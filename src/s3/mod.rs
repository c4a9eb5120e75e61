//! Storage client wrapper
//!
//! [`S3Service`] is what the HTTP handlers talk to. Each method issues the
//! backend call(s) for one API operation, records metrics, and turns any
//! [`StorageError`] into an [`S3ApiError::Backend`] whose message is prefixed
//! with the failing operation (`Failed to upload file: ...`).
//!
//! Two operations are short fixed sequences rather than single calls:
//! emptying a bucket (list everything, then bulk delete) and force-deleting a
//! bucket (empty, then delete). Neither retries nor rolls back; the first
//! failing call aborts the whole operation.

mod types;

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::errors::{Result, S3ApiError};
use crate::metrics;
use crate::storage::{ListRequest, StorageBackend, StorageError, StoredObject, MAX_DELETE_BATCH};

pub use types::{
    BucketList, Confirmation, CreateBucketResult, DeleteObjectsResult, DeletedKey,
    EmptyBucketResult, ObjectList, PresignedUrl, UploadResult,
};

/// Presigned URL lifetime when the caller does not ask for one
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 3600;

const CREATE_BUCKET_FAILED: &str = "Failed to create bucket";
const LIST_BUCKETS_FAILED: &str = "Failed to list buckets";
const UPLOAD_FAILED: &str = "Failed to upload file";
const GET_FILE_FAILED: &str = "Failed to get file";
const PRESIGN_FAILED: &str = "Failed to generate presigned URL";
const LIST_OBJECTS_FAILED: &str = "Failed to list objects";
const DELETE_OBJECT_FAILED: &str = "Failed to delete object";
const DELETE_OBJECTS_FAILED: &str = "Failed to delete objects";
const EMPTY_BUCKET_FAILED: &str = "Failed to empty bucket";
const DELETE_BUCKET_FAILED: &str = "Failed to delete bucket";

/// Bucket and object operations exposed by the API
#[derive(Clone)]
pub struct S3Service {
    backend: Arc<dyn StorageBackend>,
}

impl S3Service {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<CreateBucketResult> {
        let location = call(
            "create_bucket",
            CREATE_BUCKET_FAILED,
            self.backend.create_bucket(bucket),
        )
        .await?;

        Ok(CreateBucketResult {
            message: format!("Bucket {} created", bucket),
            location,
        })
    }

    pub async fn list_buckets(&self) -> Result<BucketList> {
        let buckets = call(
            "list_buckets",
            LIST_BUCKETS_FAILED,
            self.backend.list_buckets(),
        )
        .await?;
        Ok(BucketList { buckets })
    }

    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<UploadResult> {
        let etag = call(
            "put_object",
            UPLOAD_FAILED,
            self.backend.put_object(bucket, key, data, content_type),
        )
        .await?;

        Ok(UploadResult {
            message: "File uploaded successfully".to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            location: self.backend.object_location(bucket, key),
            etag,
        })
    }

    /// Fetch a whole object into memory
    pub async fn get_file(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        call(
            "get_object",
            GET_FILE_FAILED,
            self.backend.get_object(bucket, key),
        )
        .await
    }

    pub async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in_secs: u64,
    ) -> Result<PresignedUrl> {
        let url = call(
            "presign_get",
            PRESIGN_FAILED,
            self.backend
                .presign_get(bucket, key, Duration::from_secs(expires_in_secs)),
        )
        .await?;

        Ok(PresignedUrl {
            url,
            expires_in: expires_in_secs,
        })
    }

    /// List a single page of objects, exactly as the store returns it
    pub async fn list_objects(&self, bucket: &str, request: ListRequest) -> Result<ObjectList> {
        let page = call(
            "list_objects",
            LIST_OBJECTS_FAILED,
            self.backend.list_objects(bucket, request),
        )
        .await?;

        Ok(ObjectList {
            count: page.objects.len(),
            objects: page.objects,
            is_truncated: page.is_truncated,
            next_continuation_token: page.next_continuation_token,
        })
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<Confirmation> {
        call(
            "delete_object",
            DELETE_OBJECT_FAILED,
            self.backend.delete_object(bucket, key),
        )
        .await?;
        Ok(Confirmation::new(format!("Object {} deleted", key)))
    }

    /// Bulk delete; per-key failures are reported, not raised
    pub async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<DeleteObjectsResult> {
        let outcome = call(
            "delete_objects",
            DELETE_OBJECTS_FAILED,
            self.backend.delete_objects(bucket, keys),
        )
        .await?;

        Ok(DeleteObjectsResult {
            deleted: outcome
                .deleted
                .into_iter()
                .map(|key| DeletedKey { key })
                .collect(),
            errors: outcome.errors,
        })
    }

    /// Delete every object in the bucket
    pub async fn empty_bucket(&self, bucket: &str) -> Result<EmptyBucketResult> {
        let keys = self
            .all_keys(bucket)
            .await
            .map_err(|e| e.within(EMPTY_BUCKET_FAILED))?;

        if keys.is_empty() {
            return Ok(EmptyBucketResult {
                message: "Bucket is already empty".to_string(),
                deleted: 0,
            });
        }

        let mut deleted = 0;
        for batch in keys.chunks(MAX_DELETE_BATCH) {
            let outcome = call(
                "delete_objects",
                DELETE_OBJECTS_FAILED,
                self.backend.delete_objects(bucket, batch),
            )
            .await
            .map_err(|e| e.within(EMPTY_BUCKET_FAILED))?;

            if let Some(first) = outcome.errors.first() {
                return Err(S3ApiError::Backend(format!(
                    "{}: {} of {} objects could not be deleted (first: {}: {})",
                    EMPTY_BUCKET_FAILED,
                    outcome.errors.len(),
                    batch.len(),
                    first.key,
                    first
                        .message
                        .as_deref()
                        .or(first.code.as_deref())
                        .unwrap_or("unknown error"),
                )));
            }
            deleted += outcome.deleted.len();
        }

        debug!(bucket, deleted, "Bucket emptied");
        Ok(EmptyBucketResult {
            message: format!("Deleted {} objects", deleted),
            deleted,
        })
    }

    /// Delete a bucket, emptying it first when `force` is set
    pub async fn delete_bucket(&self, bucket: &str, force: bool) -> Result<Confirmation> {
        if force {
            self.empty_bucket(bucket)
                .await
                .map_err(|e| e.within(DELETE_BUCKET_FAILED))?;
        }

        call(
            "delete_bucket",
            DELETE_BUCKET_FAILED,
            self.backend.delete_bucket(bucket),
        )
        .await?;
        Ok(Confirmation::new(format!("Bucket {} deleted", bucket)))
    }

    /// Every key in the bucket, following continuation tokens
    async fn all_keys(&self, bucket: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let page = call(
                "list_objects",
                LIST_OBJECTS_FAILED,
                self.backend.list_objects(
                    bucket,
                    ListRequest {
                        continuation_token: continuation_token.take(),
                        ..ListRequest::default()
                    },
                ),
            )
            .await?;

            keys.extend(page.objects.into_iter().map(|object| object.key));
            match page.next_continuation_token {
                Some(token) if page.is_truncated => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(keys)
    }
}

/// Run one backend call, recording metrics and prefixing any failure
async fn call<T, F>(operation: &'static str, failure: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, StorageError>>,
{
    let started = Instant::now();
    let result = fut.await;
    metrics::record_storage_operation(
        operation,
        result.is_ok(),
        started.elapsed().as_secs_f64(),
    );

    result.map_err(|e| {
        error!(operation, error = %e, "Storage operation failed");
        S3ApiError::Backend(format!("{}: {}", failure, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    async fn service_with(bucket: &str, count: usize) -> S3Service {
        let service = S3Service::new(Arc::new(MemoryBackend::default()));
        service.create_bucket(bucket).await.unwrap();
        for i in 0..count {
            service
                .upload_file(bucket, &format!("obj-{:05}", i), Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap();
        }
        service
    }

    #[tokio::test]
    async fn test_empty_bucket_spans_several_batches() {
        let service = service_with("big", MAX_DELETE_BATCH + 5).await;

        let result = service.empty_bucket("big").await.unwrap();
        assert_eq!(result.deleted, MAX_DELETE_BATCH + 5);
        assert_eq!(result.message, format!("Deleted {} objects", MAX_DELETE_BATCH + 5));

        let listing = service.list_objects("big", ListRequest::default()).await.unwrap();
        assert_eq!(listing.count, 0);
    }

    #[tokio::test]
    async fn test_empty_bucket_is_idempotent() {
        let service = service_with("small", 2).await;
        assert_eq!(service.empty_bucket("small").await.unwrap().deleted, 2);

        let again = service.empty_bucket("small").await.unwrap();
        assert_eq!(again.deleted, 0);
        assert_eq!(again.message, "Bucket is already empty");
    }

    #[tokio::test]
    async fn test_failures_carry_operation_prefix() {
        let service = S3Service::new(Arc::new(MemoryBackend::default()));

        let err = service.get_file("missing", "k").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to get file: NoSuchBucket"));

        let err = service.delete_bucket("missing", true).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to delete bucket: Failed to empty bucket: Failed to list objects: \
             NoSuchBucket: The specified bucket does not exist: missing"
        );
    }

    #[tokio::test]
    async fn test_upload_reports_location() {
        let service = service_with("docs", 0).await;
        let result = service
            .upload_file("docs", "a b.txt", Bytes::from_static(b"hi"), "text/plain")
            .await
            .unwrap();
        assert_eq!(result.location, "http://localhost:3000/docs/a%20b.txt");
        assert_eq!(result.message, "File uploaded successfully");
        assert!(result.etag.is_some());
    }
}
