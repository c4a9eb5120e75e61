//! HTTP routes of the REST API
//!
//! Implements:
//! - GET    /api/health                    - liveness
//! - POST   /api/buckets/create            - CreateBucket
//! - GET    /api/buckets/list              - ListBuckets
//! - DELETE /api/buckets/empty             - delete every object in a bucket
//! - DELETE /api/buckets/delete            - DeleteBucket (optionally forced)
//! - POST   /api/upload                    - PutObject from a multipart form
//! - GET    /api/download                  - GetObject, raw bytes
//! - GET    /api/presigned-url             - presigned GetObject URL
//! - GET    /api/objects/list              - ListObjectsV2
//! - DELETE /api/objects/delete            - DeleteObject
//! - DELETE /api/objects/delete-multiple   - DeleteObjects
//!
//! Anything else, including a known path with the wrong method, is a 404.

mod extract;
mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;

use crate::s3::S3Service;

pub use extract::{JsonBody, QueryParams, UploadForm, UploadedFile};

/// Body of create / empty bucket requests
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketBody {
    pub bucket_name: Option<String>,
}

/// Body of a delete bucket request; `force` may be a boolean or a bool-like string or number
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBucketBody {
    pub bucket_name: Option<String>,
    pub force: Option<serde_json::Value>,
}

/// Body of a delete object request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBody {
    pub bucket_name: Option<String>,
    pub key: Option<String>,
}

/// Body of a bulk delete request; `keys` is checked by hand for a clearer message
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteObjectsBody {
    pub bucket_name: Option<String>,
    pub keys: Option<serde_json::Value>,
}

/// Query parameters for the download endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectQuery {
    pub bucket_name: Option<String>,
    pub key: Option<String>,
}

/// Query parameters for the presigned URL endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignQuery {
    pub bucket_name: Option<String>,
    pub key: Option<String>,
    pub expires_in: Option<String>,
}

/// Query parameters for ListObjects operation
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsQuery {
    pub bucket_name: Option<String>,
    pub prefix: Option<String>,
    pub max_keys: Option<String>,
    pub continuation_token: Option<String>,
}

/// Create the API router
pub fn create_router(service: S3Service) -> Router {
    Router::new()
        .route("/", get(handlers::index).fallback(handlers::not_found))
        .route("/metrics", get(handlers::metrics).fallback(handlers::not_found))
        .route("/api/health", get(handlers::health).fallback(handlers::not_found))
        .route(
            "/api/buckets/create",
            post(handlers::create_bucket).fallback(handlers::not_found),
        )
        .route(
            "/api/buckets/list",
            get(handlers::list_buckets).fallback(handlers::not_found),
        )
        .route(
            "/api/buckets/empty",
            delete(handlers::empty_bucket).fallback(handlers::not_found),
        )
        .route(
            "/api/buckets/delete",
            delete(handlers::delete_bucket).fallback(handlers::not_found),
        )
        .route(
            "/api/upload",
            post(handlers::upload_file).fallback(handlers::not_found),
        )
        .route(
            "/api/download",
            get(handlers::download_file).fallback(handlers::not_found),
        )
        .route(
            "/api/presigned-url",
            get(handlers::presigned_url).fallback(handlers::not_found),
        )
        .route(
            "/api/objects/list",
            get(handlers::list_objects).fallback(handlers::not_found),
        )
        .route(
            "/api/objects/delete",
            delete(handlers::delete_object).fallback(handlers::not_found),
        )
        .route(
            "/api/objects/delete-multiple",
            delete(handlers::delete_multiple_objects).fallback(handlers::not_found),
        )
        .fallback(handlers::not_found)
        .with_state(service)
}
