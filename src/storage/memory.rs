//! In-process storage backend
//!
//! Keeps buckets and objects in memory and reproduces the error cases of the
//! real service that callers rely on. Used for local development
//! (`S3API_BACKEND_TYPE=memory`) and by the test suites.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use crate::storage::{
    join_object_url, BucketInfo, DeleteFailure, DeleteOutcome, ListRequest, ObjectInfo,
    ObjectPage, StorageBackend, StorageError, StoredObject, MAX_DELETE_BATCH, MAX_LIST_KEYS,
};

/// Longest validity a SigV4 presigned URL may have
const MAX_PRESIGN_SECS: u64 = 7 * 24 * 3600;

struct MemoryObject {
    data: Bytes,
    content_type: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

struct MemoryBucket {
    created: DateTime<Utc>,
    objects: BTreeMap<String, MemoryObject>,
}

/// In-memory storage backend
pub struct MemoryBackend {
    base_url: Url,
    buckets: RwLock<BTreeMap<String, MemoryBucket>>,
}

impl MemoryBackend {
    /// Create an empty store whose object URLs are rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self, StorageError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StorageError::Service(format!("invalid base url {}: {}", base_url, e)))?;
        Ok(Self {
            base_url,
            buckets: RwLock::new(BTreeMap::new()),
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:3000").expect("static url is valid"),
            buckets: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create_bucket(&self, bucket: &str) -> Result<Option<String>, StorageError> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(bucket) {
            return Err(StorageError::BucketAlreadyExists(bucket.to_string()));
        }
        buckets.insert(
            bucket.to_string(),
            MemoryBucket {
                created: Utc::now(),
                objects: BTreeMap::new(),
            },
        );
        Ok(Some(format!("/{}", bucket)))
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .iter()
            .map(|(name, bucket)| BucketInfo {
                name: name.clone(),
                creation_date: Some(bucket.created),
            })
            .collect())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().await;
        match buckets.get(bucket) {
            None => Err(StorageError::NoSuchBucket(bucket.to_string())),
            Some(b) if !b.objects.is_empty() => {
                Err(StorageError::BucketNotEmpty(bucket.to_string()))
            }
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<Option<String>, StorageError> {
        let mut buckets = self.buckets.write().await;
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;

        let etag = format!("\"{}\"", uuid::Uuid::new_v4().simple());
        entry.objects.insert(
            key.to_string(),
            MemoryObject {
                data,
                content_type: content_type.to_string(),
                etag: etag.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(Some(etag))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let buckets = self.buckets.read().await;
        let object = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?
            .objects
            .get(key)
            .ok_or_else(|| StorageError::NoSuchKey(key.to_string()))?;

        Ok(StoredObject {
            data: object.data.clone(),
            content_type: Some(object.content_type.clone()),
            etag: Some(object.etag.clone()),
            last_modified: Some(object.last_modified),
        })
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let secs = expires_in.as_secs();
        if secs == 0 || secs > MAX_PRESIGN_SECS {
            return Err(StorageError::Presign(format!(
                "expiry must be between 1 and {} seconds, got {}",
                MAX_PRESIGN_SECS, secs
            )));
        }

        Ok(format!(
            "{}?X-Amz-Date={}&X-Amz-Expires={}",
            join_object_url(self.base_url.as_str(), bucket, key),
            Utc::now().format("%Y%m%dT%H%M%SZ"),
            secs
        ))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        request: ListRequest,
    ) -> Result<ObjectPage, StorageError> {
        let buckets = self.buckets.read().await;
        let entry = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;

        let max_keys = request
            .max_keys
            .unwrap_or(MAX_LIST_KEYS)
            .clamp(0, MAX_LIST_KEYS) as usize;
        let prefix = request.prefix.unwrap_or_default();
        let start = match request.continuation_token {
            Some(token) => Bound::Excluded(token),
            None => Bound::Unbounded,
        };

        let mut matching = entry
            .objects
            .range((start, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(&prefix));

        let objects: Vec<ObjectInfo> = matching
            .by_ref()
            .take(max_keys)
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: Some(object.last_modified),
                etag: Some(object.etag.clone()),
                storage_class: Some("STANDARD".to_string()),
            })
            .collect();
        let is_truncated = matching.next().is_some();
        let next_continuation_token = if is_truncated {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            is_truncated,
            next_continuation_token,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().await;
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        // Deleting an absent key succeeds, as it does on S3
        entry.objects.remove(key);
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<DeleteOutcome, StorageError> {
        if keys.is_empty() || keys.len() > MAX_DELETE_BATCH {
            return Err(StorageError::Service(format!(
                "MalformedXML: a delete request must carry 1 to {} keys, got {}",
                MAX_DELETE_BATCH,
                keys.len()
            )));
        }

        let mut buckets = self.buckets.write().await;
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;

        let mut outcome = DeleteOutcome::default();
        for key in keys {
            if entry.objects.remove(key).is_some() {
                outcome.deleted.push(key.clone());
            } else {
                outcome.errors.push(DeleteFailure {
                    key: key.clone(),
                    code: Some("NoSuchKey".to_string()),
                    message: Some("The specified key does not exist.".to_string()),
                });
            }
        }
        Ok(outcome)
    }

    fn object_location(&self, bucket: &str, key: &str) -> String {
        join_object_url(self.base_url.as_str(), bucket, key)
    }
}
