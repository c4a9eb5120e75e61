//! Request handlers for the REST endpoints
//!
//! Each handler pulls its parameters out of the request, checks the required
//! ones, calls the matching [`S3Service`] method and wraps the result in the
//! response envelope. Failures are returned as [`S3ApiError`] and rendered by
//! its `IntoResponse` impl.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::errors::{ApiResponse, Result, S3ApiError};
use crate::routes::{
    BucketBody, DeleteBucketBody, DeleteObjectsBody, JsonBody, ListObjectsQuery, ObjectBody,
    ObjectQuery, PresignQuery, QueryParams, UploadForm,
};
use crate::s3::{
    BucketList, Confirmation, CreateBucketResult, DeleteObjectsResult, EmptyBucketResult,
    ObjectList, PresignedUrl, S3Service, UploadResult, DEFAULT_PRESIGN_EXPIRY_SECS,
};
use crate::storage::{ListRequest, MAX_DELETE_BATCH, MAX_LIST_KEYS};

type Envelope<T> = Json<ApiResponse<T>>;

fn ok<T: Serialize>(data: T) -> Envelope<T> {
    Json(ApiResponse::success(data))
}

/// A required string parameter; absent and empty are both missing
fn require(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| S3ApiError::missing(field))
}

/// API index
pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "S3 Operations API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /api/health": "Health check",
            "POST /api/buckets/create": "Create bucket",
            "GET /api/buckets/list": "List all buckets",
            "POST /api/upload": "Upload file",
            "GET /api/download": "Download file",
            "GET /api/presigned-url": "Get presigned URL",
            "GET /api/objects/list": "List objects in bucket",
            "DELETE /api/objects/delete": "Delete single object",
            "DELETE /api/objects/delete-multiple": "Delete multiple objects",
            "DELETE /api/buckets/empty": "Empty bucket",
            "DELETE /api/buckets/delete": "Delete bucket"
        }
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
}

/// Health check endpoint
#[instrument]
pub async fn health() -> Envelope<HealthStatus> {
    Json(ApiResponse::success(HealthStatus { status: "OK" }).with_message("S3 API is running"))
}

/// Prometheus metrics endpoint
#[instrument]
pub async fn metrics() -> Result<([(header::HeaderName, &'static str); 1], String)> {
    let body = crate::metrics::render()
        .map_err(|e| S3ApiError::Internal(format!("Failed to encode metrics: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

/// Fallback for unknown routes and methods
pub async fn not_found() -> S3ApiError {
    S3ApiError::RouteNotFound
}

/// CreateBucket - POST /api/buckets/create
#[instrument(skip(service))]
pub async fn create_bucket(
    State(service): State<S3Service>,
    JsonBody(body): JsonBody<BucketBody>,
) -> Result<Envelope<CreateBucketResult>> {
    let bucket = require(body.bucket_name, "bucketName")?;
    info!(bucket = %bucket, "CreateBucket request");

    Ok(ok(service.create_bucket(&bucket).await?))
}

/// ListBuckets - GET /api/buckets/list
#[instrument(skip(service))]
pub async fn list_buckets(State(service): State<S3Service>) -> Result<Envelope<BucketList>> {
    info!("ListBuckets request");

    Ok(ok(service.list_buckets().await?))
}

/// EmptyBucket - DELETE /api/buckets/empty
#[instrument(skip(service))]
pub async fn empty_bucket(
    State(service): State<S3Service>,
    JsonBody(body): JsonBody<BucketBody>,
) -> Result<Envelope<EmptyBucketResult>> {
    let bucket = require(body.bucket_name, "bucketName")?;
    info!(bucket = %bucket, "EmptyBucket request");

    Ok(ok(service.empty_bucket(&bucket).await?))
}

/// DeleteBucket - DELETE /api/buckets/delete
#[instrument(skip(service))]
pub async fn delete_bucket(
    State(service): State<S3Service>,
    JsonBody(body): JsonBody<DeleteBucketBody>,
) -> Result<Envelope<Confirmation>> {
    let bucket = require(body.bucket_name, "bucketName")?;
    let force = parse_force(body.force)?;
    info!(bucket = %bucket, force, "DeleteBucket request");

    Ok(ok(service.delete_bucket(&bucket, force).await?))
}

/// PutObject - POST /api/upload (multipart: bucketName, key, file)
#[instrument(skip(service, form))]
pub async fn upload_file(
    State(service): State<S3Service>,
    form: UploadForm,
) -> Result<Envelope<UploadResult>> {
    let bucket = require(form.bucket_name, "bucketName")?;
    let key = require(form.key, "key")?;
    let file = form.file.ok_or_else(|| S3ApiError::missing("file"))?;
    info!(
        bucket = %bucket,
        key = %key,
        file_name = ?file.file_name,
        content_type = %file.content_type,
        size = file.data.len(),
        "Upload request"
    );

    let result = service
        .upload_file(&bucket, &key, file.data, &file.content_type)
        .await?;
    Ok(ok(result))
}

/// GetObject - GET /api/download?bucketName=..&key=..
///
/// Responds with the raw object bytes rather than an envelope.
#[instrument(skip(service))]
pub async fn download_file(
    State(service): State<S3Service>,
    QueryParams(query): QueryParams<ObjectQuery>,
) -> Result<Response> {
    let bucket = require(query.bucket_name, "bucketName")?;
    let key = require(query.key, "key")?;
    info!(bucket = %bucket, key = %key, "Download request");

    let object = service.get_file(&bucket, &key).await?;
    let content_type = object
        .content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, object.data.len());
    if let Some(etag) = object.etag {
        response = response.header(header::ETAG, etag);
    }
    if let Some(last_modified) = object.last_modified {
        response = response.header(
            header::LAST_MODIFIED,
            last_modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
    }

    response
        .body(Body::from(object.data))
        .map_err(|e| S3ApiError::Internal(format!("Failed to build response: {}", e)))
}

/// Presigned GetObject URL - GET /api/presigned-url?bucketName=..&key=..&expiresIn=..
#[instrument(skip(service))]
pub async fn presigned_url(
    State(service): State<S3Service>,
    QueryParams(query): QueryParams<PresignQuery>,
) -> Result<Envelope<PresignedUrl>> {
    let bucket = require(query.bucket_name, "bucketName")?;
    let key = require(query.key, "key")?;
    let expires_in = parse_expires_in(query.expires_in)?;
    info!(bucket = %bucket, key = %key, expires_in, "PresignedUrl request");

    Ok(ok(service.presigned_url(&bucket, &key, expires_in).await?))
}

/// ListObjectsV2 - GET /api/objects/list?bucketName=..&prefix=..
#[instrument(skip(service))]
pub async fn list_objects(
    State(service): State<S3Service>,
    QueryParams(query): QueryParams<ListObjectsQuery>,
) -> Result<Envelope<ObjectList>> {
    let bucket = require(query.bucket_name, "bucketName")?;
    let max_keys = parse_max_keys(query.max_keys)?;
    info!(bucket = %bucket, prefix = ?query.prefix, "ListObjects request");

    let request = ListRequest {
        prefix: query.prefix.filter(|p| !p.is_empty()),
        continuation_token: query.continuation_token.filter(|t| !t.is_empty()),
        max_keys,
    };
    Ok(ok(service.list_objects(&bucket, request).await?))
}

/// DeleteObject - DELETE /api/objects/delete
#[instrument(skip(service))]
pub async fn delete_object(
    State(service): State<S3Service>,
    JsonBody(body): JsonBody<ObjectBody>,
) -> Result<Envelope<Confirmation>> {
    let bucket = require(body.bucket_name, "bucketName")?;
    let key = require(body.key, "key")?;
    info!(bucket = %bucket, key = %key, "DeleteObject request");

    Ok(ok(service.delete_object(&bucket, &key).await?))
}

/// DeleteObjects - DELETE /api/objects/delete-multiple
#[instrument(skip(service))]
pub async fn delete_multiple_objects(
    State(service): State<S3Service>,
    JsonBody(body): JsonBody<DeleteObjectsBody>,
) -> Result<Envelope<DeleteObjectsResult>> {
    let bucket = require(body.bucket_name, "bucketName")?;
    let keys = parse_keys(body.keys)?;
    info!(bucket = %bucket, count = keys.len(), "DeleteObjects request");

    Ok(ok(service.delete_objects(&bucket, &keys).await?))
}

fn parse_expires_in(value: Option<String>) -> Result<u64> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(DEFAULT_PRESIGN_EXPIRY_SECS),
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| S3ApiError::Validation("expiresIn must be a positive integer".to_string())),
    }
}

fn parse_max_keys(value: Option<String>) -> Result<Option<i32>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<i32>()
            .ok()
            .filter(|n| (1..=MAX_LIST_KEYS).contains(n))
            .map(Some)
            .ok_or_else(|| {
                S3ApiError::Validation(format!(
                    "maxKeys must be an integer between 1 and {}",
                    MAX_LIST_KEYS
                ))
            }),
    }
}

fn parse_force(value: Option<Value>) -> Result<bool> {
    let invalid = || S3ApiError::Validation("force must be a boolean".to_string());
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(force)) => Ok(force),
        Some(Value::Number(n)) => Ok(n.as_f64().map(|n| n != 0.0).unwrap_or(false)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(invalid()),
        },
        Some(_) => Err(invalid()),
    }
}

fn parse_keys(value: Option<Value>) -> Result<Vec<String>> {
    let items = match value {
        None | Some(Value::Null) => return Err(S3ApiError::missing("keys")),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(S3ApiError::Validation(
                "keys must be an array of strings".to_string(),
            ))
        }
    };

    let keys = items
        .into_iter()
        .map(|item| match item {
            Value::String(key) if !key.is_empty() => Ok(key),
            _ => Err(S3ApiError::Validation(
                "keys must be an array of strings".to_string(),
            )),
        })
        .collect::<Result<Vec<_>>>()?;

    if keys.is_empty() {
        return Err(S3ApiError::Validation("keys must not be empty".to_string()));
    }
    if keys.len() > MAX_DELETE_BATCH {
        return Err(S3ApiError::Validation(format!(
            "keys must contain at most {} entries",
            MAX_DELETE_BATCH
        )));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_in_defaults_and_overrides() {
        assert_eq!(parse_expires_in(None).unwrap(), 3600);
        assert_eq!(parse_expires_in(Some(String::new())).unwrap(), 3600);
        assert_eq!(parse_expires_in(Some("120".to_string())).unwrap(), 120);
        assert!(parse_expires_in(Some("0".to_string())).is_err());
        assert!(parse_expires_in(Some("soon".to_string())).is_err());
    }

    #[test]
    fn test_max_keys_bounds() {
        assert_eq!(parse_max_keys(None).unwrap(), None);
        assert_eq!(parse_max_keys(Some("50".to_string())).unwrap(), Some(50));
        assert!(parse_max_keys(Some("0".to_string())).is_err());
        assert!(parse_max_keys(Some("1001".to_string())).is_err());
    }

    #[test]
    fn test_keys_validation() {
        assert_eq!(
            parse_keys(None).unwrap_err().to_string(),
            "keys is required"
        );
        assert_eq!(
            parse_keys(Some(json!("a.txt"))).unwrap_err().to_string(),
            "keys must be an array of strings"
        );
        assert_eq!(
            parse_keys(Some(json!(["a.txt", 3]))).unwrap_err().to_string(),
            "keys must be an array of strings"
        );
        assert_eq!(
            parse_keys(Some(json!([]))).unwrap_err().to_string(),
            "keys must not be empty"
        );
        assert_eq!(
            parse_keys(Some(json!(["a.txt", "b.txt"]))).unwrap(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
    }

    #[test]
    fn test_force_accepts_bool_like_values() {
        assert!(!parse_force(None).unwrap());
        assert!(parse_force(Some(json!(true))).unwrap());
        assert!(parse_force(Some(json!("true"))).unwrap());
        assert!(parse_force(Some(json!(1))).unwrap());
        assert!(!parse_force(Some(json!("false"))).unwrap());
        assert!(!parse_force(Some(json!(0))).unwrap());
        assert_eq!(
            parse_force(Some(json!("sometimes"))).unwrap_err().to_string(),
            "force must be a boolean"
        );
    }

    #[test]
    fn test_require_treats_empty_as_missing() {
        assert_eq!(
            require(Some(String::new()), "bucketName").unwrap_err().to_string(),
            "bucketName is required"
        );
        assert_eq!(require(Some("b".to_string()), "bucketName").unwrap(), "b");
    }
}
