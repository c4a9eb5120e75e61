//! AWS S3 storage backend implementation
//!
//! Uses the aws-sdk-s3 client with support for:
//! - Explicit credentials (access key ID and secret access key)
//! - The default AWS credential chain when no keys are configured
//!   (environment, shared profile, IRSA, ECS task role, EC2 metadata)
//! - Custom endpoints and path-style addressing for S3-compatible services

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    Delete, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::BackendConfig;
use crate::storage::{
    join_object_url, BucketInfo, DeleteFailure, DeleteOutcome, ListRequest, ObjectInfo,
    ObjectPage, StorageBackend, StorageError, StoredObject,
};

/// Bodies larger than this go through a multipart upload
const PART_SIZE: usize = 5 * 1024 * 1024;

/// Parts uploaded concurrently during a multipart upload
const PART_CONCURRENCY: usize = 4;

/// AWS S3 storage backend
pub struct AwsBackend {
    client: Client,
    region: String,
    endpoint: Option<Url>,
}

impl AwsBackend {
    /// Create a new AWS S3 backend
    ///
    /// Supports two authentication modes:
    /// 1. Explicit credentials: both `access_key_id` and `secret_access_key` set
    /// 2. Default credential chain otherwise
    pub async fn new(config: &BackendConfig) -> Result<Self, StorageError> {
        let region = Region::new(config.region.clone());

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region.clone())
            .force_path_style(config.force_path_style);

        // Configure endpoint (for S3-compatible services like MinIO)
        let endpoint = match &config.endpoint {
            Some(endpoint) => {
                builder = builder.endpoint_url(endpoint);
                Some(Url::parse(endpoint).map_err(|e| {
                    StorageError::Service(format!("invalid endpoint {}: {}", endpoint, e))
                })?)
            }
            None => None,
        };

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials =
                Credentials::new(access_key_id, secret_access_key, None, None, "static");
            builder = builder.credentials_provider(credentials);
        } else {
            let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            if let Some(provider) = sdk_config.credentials_provider() {
                builder = builder.credentials_provider(provider);
            }
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region: config.region.clone(),
            endpoint,
        })
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<Option<String>, StorageError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(sdk_error)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::Service("missing multipart upload id".to_string()))?
            .to_string();

        debug!(bucket, key, size = data.len(), "Starting multipart upload");

        let result = match self.upload_parts(bucket, key, &upload_id, data).await {
            Ok(parts) => self.complete_parts(bucket, key, &upload_id, parts).await,
            Err(e) => Err(e),
        };

        // Any failure after creation leaves stored parts behind until aborted
        if result.is_err() {
            if let Err(abort) = self
                .client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(bucket, key, error = %DisplayErrorContext(abort), "Failed to abort multipart upload");
            }
        }
        result
    }

    async fn complete_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<Option<String>, StorageError> {
        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(completed.e_tag().map(str::to_string))
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        data: Bytes,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let chunks = (0..data.len())
            .step_by(PART_SIZE)
            .map(|start| data.slice(start..(start + PART_SIZE).min(data.len())))
            .enumerate()
            .map(|(index, chunk)| (index as i32 + 1, chunk));

        stream::iter(chunks)
            .map(|(part_number, chunk)| async move {
                let uploaded = self
                    .client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(chunk))
                    .send()
                    .await
                    .map_err(sdk_error)?;
                Ok::<_, StorageError>(
                    CompletedPart::builder()
                        .set_e_tag(uploaded.e_tag().map(str::to_string))
                        .part_number(part_number)
                        .build(),
                )
            })
            .buffered(PART_CONCURRENCY)
            .try_collect()
            .await
    }
}

#[async_trait]
impl StorageBackend for AwsBackend {
    async fn create_bucket(&self, bucket: &str) -> Result<Option<String>, StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint
        if self.endpoint.is_none() && self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        let output = request.send().await.map_err(sdk_error)?;
        Ok(output.location().map(str::to_string))
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError> {
        let output = self.client.list_buckets().send().await.map_err(sdk_error)?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| {
                Some(BucketInfo {
                    name: bucket.name()?.to_string(),
                    creation_date: bucket.creation_date().and_then(to_chrono),
                })
            })
            .collect())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<Option<String>, StorageError> {
        if data.len() > PART_SIZE {
            return self.put_multipart(bucket, key, data, content_type).await;
        }

        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(output.e_tag().map(str::to_string))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(sdk_error)?;

        let content_type = output.content_type().map(str::to_string);
        let etag = output.e_tag().map(str::to_string);
        let last_modified = output.last_modified().and_then(to_chrono);
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Service(format!("failed to read object body: {}", e)))?
            .into_bytes();

        Ok(StoredObject {
            data,
            content_type,
            etag,
            last_modified,
        })
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(sdk_error)?;
        Ok(request.uri().to_string())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        request: ListRequest,
    ) -> Result<ObjectPage, StorageError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(request.prefix)
            .set_continuation_token(request.continuation_token)
            .set_max_keys(request.max_keys)
            .send()
            .await
            .map_err(sdk_error)?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectInfo {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                    last_modified: object.last_modified().and_then(to_chrono),
                    etag: object.e_tag().map(str::to_string),
                    storage_class: object.storage_class().map(|c| c.as_str().to_string()),
                })
            })
            .collect();

        Ok(ObjectPage {
            objects,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_continuation_token: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<DeleteOutcome, StorageError> {
        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Service(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(false)
            .build()
            .map_err(|e| StorageError::Service(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(DeleteOutcome {
            deleted: output
                .deleted()
                .iter()
                .filter_map(|d| d.key().map(str::to_string))
                .collect(),
            errors: output
                .errors()
                .iter()
                .map(|e| DeleteFailure {
                    key: e.key().unwrap_or_default().to_string(),
                    code: e.code().map(str::to_string),
                    message: e.message().map(str::to_string),
                })
                .collect(),
        })
    }

    fn object_location(&self, bucket: &str, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => join_object_url(endpoint.as_str(), bucket, key),
            None => {
                let host = format!("https://{}.s3.{}.amazonaws.com", bucket, self.region);
                join_object_url(&host, "", key)
            }
        }
    }
}

/// Render an SDK error as `Code: message`, falling back to the full context
fn sdk_error<E, R>(err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if let (Some(code), Some(message)) = (err.code(), err.message()) {
        return StorageError::Service(format!("{}: {}", code, message));
    }
    StorageError::Service(DisplayErrorContext(err).to_string())
}

fn to_chrono(timestamp: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Request, State};
    use axum::http::{header, Method, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::Router;
    use std::sync::{Arc, Mutex};

    const XML: [(header::HeaderName, &str); 1] = [(header::CONTENT_TYPE, "application/xml")];

    /// Minimal S3 endpoint for the multipart upload calls
    #[derive(Clone)]
    struct MockS3 {
        calls: Arc<Mutex<Vec<String>>>,
        fail_complete: bool,
    }

    async fn mock_s3(State(mock): State<MockS3>, request: Request) -> Response {
        let method = request.method().clone();
        let query = request.uri().query().unwrap_or_default().to_string();
        let _ = axum::body::to_bytes(request.into_body(), usize::MAX).await;
        mock.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", method, query));

        if query.contains("partNumber") {
            return [(header::ETAG, "\"part-etag\"")].into_response();
        }
        if method == Method::DELETE {
            return StatusCode::NO_CONTENT.into_response();
        }
        if query.contains("uploadId") {
            if mock.fail_complete {
                return (
                    StatusCode::BAD_REQUEST,
                    XML,
                    "<Error><Code>InvalidPart</Code><Message>boom</Message></Error>",
                )
                    .into_response();
            }
            return (
                XML,
                "<CompleteMultipartUploadResult><Bucket>docs</Bucket><Key>big.bin</Key>\
                 <ETag>\"final-etag\"</ETag></CompleteMultipartUploadResult>",
            )
                .into_response();
        }
        if query.contains("uploads") {
            return (
                XML,
                "<InitiateMultipartUploadResult><Bucket>docs</Bucket><Key>big.bin</Key>\
                 <UploadId>up-1</UploadId></InitiateMultipartUploadResult>",
            )
                .into_response();
        }
        StatusCode::NOT_IMPLEMENTED.into_response()
    }

    async fn spawn_mock_s3(fail_complete: bool) -> (String, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().fallback(mock_s3).with_state(MockS3 {
            calls: calls.clone(),
            fail_complete,
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), calls)
    }

    fn large_body() -> Bytes {
        Bytes::from(vec![7u8; PART_SIZE + 1024 * 1024])
    }

    fn static_config(endpoint: Option<&str>) -> BackendConfig {
        BackendConfig {
            region: "eu-central-1".to_string(),
            endpoint: endpoint.map(str::to_string),
            force_path_style: endpoint.is_some(),
            access_key_id: Some("AKIDEXAMPLE".to_string()),
            secret_access_key: Some("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string()),
            ..BackendConfig::default()
        }
    }

    #[tokio::test]
    async fn test_virtual_hosted_location() {
        let backend = AwsBackend::new(&static_config(None)).await.unwrap();
        assert_eq!(
            backend.object_location("reports", "2024/q1 summary.pdf"),
            "https://reports.s3.eu-central-1.amazonaws.com/2024/q1%20summary.pdf"
        );
    }

    #[tokio::test]
    async fn test_custom_endpoint_location() {
        let backend = AwsBackend::new(&static_config(Some("http://localhost:9000")))
            .await
            .unwrap();
        assert_eq!(
            backend.object_location("reports", "a/b.txt"),
            "http://localhost:9000/reports/a/b.txt"
        );
    }

    #[tokio::test]
    async fn test_presign_is_offline_and_honours_expiry() {
        let backend = AwsBackend::new(&static_config(None)).await.unwrap();
        let url = backend
            .presign_get("reports", "q1.pdf", Duration::from_secs(900))
            .await
            .unwrap();
        assert!(url.starts_with("https://reports.s3.eu-central-1.amazonaws.com/q1.pdf?"));
        assert!(url.contains("X-Amz-Expires=900"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn test_presign_rejects_expiry_over_a_week() {
        let backend = AwsBackend::new(&static_config(None)).await.unwrap();
        let err = backend
            .presign_get("reports", "q1.pdf", Duration::from_secs(8 * 24 * 3600))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Presign(_)));
    }

    #[tokio::test]
    async fn test_multipart_upload_completes() {
        let (endpoint, calls) = spawn_mock_s3(false).await;
        let backend = AwsBackend::new(&static_config(Some(&endpoint))).await.unwrap();

        let etag = backend
            .put_object("docs", "big.bin", large_body(), "application/octet-stream")
            .await
            .unwrap();
        assert_eq!(etag.as_deref(), Some("\"final-etag\""));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| c.contains("partNumber")).count(), 2);
        assert!(!calls.iter().any(|c| c.starts_with("DELETE")));
    }

    #[tokio::test]
    async fn test_failed_completion_aborts_multipart_upload() {
        let (endpoint, calls) = spawn_mock_s3(true).await;
        let backend = AwsBackend::new(&static_config(Some(&endpoint))).await.unwrap();

        let err = backend
            .put_object("docs", "big.bin", large_body(), "application/octet-stream")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InvalidPart"), "{}", err);

        let calls = calls.lock().unwrap();
        assert!(
            calls
                .iter()
                .any(|c| c.starts_with("DELETE") && c.contains("uploadId=up-1")),
            "{:?}",
            calls
        );
    }
}
