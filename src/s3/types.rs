//! JSON payloads returned inside the `data` field of the envelope

use serde::Serialize;

use crate::storage::{BucketInfo, DeleteFailure, ObjectInfo};

#[derive(Debug, Serialize)]
pub struct CreateBucketResult {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BucketList {
    pub buckets: Vec<BucketInfo>,
}

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub message: String,
    pub bucket: String,
    pub key: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    pub url: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectList {
    pub objects: Vec<ObjectInfo>,
    pub count: usize,
    pub is_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedKey {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteObjectsResult {
    pub deleted: Vec<DeletedKey>,
    pub errors: Vec<DeleteFailure>,
}

#[derive(Debug, Serialize)]
pub struct EmptyBucketResult {
    pub message: String,
    pub deleted: usize,
}

/// Plain confirmation for deletes
#[derive(Debug, Serialize)]
pub struct Confirmation {
    pub message: String,
}

impl Confirmation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
