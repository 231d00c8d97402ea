//! Object (blob) storage abstraction and an in-memory implementation.
//!
//! Blob services copy objects asynchronously on the server side: a copy is
//! started, then its [`CopyState`] is polled until it settles. The trait models
//! that directly; [`crate::storage::ObjectStoreAccessor`] hides the polling
//! behind the plain `copy` of [`crate::storage::StorageAccessor`].

use crate::storage::{StorageError, StorageErrorKind, StorageResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Metadata for an object in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<i64>, // Unix timestamp
    pub etag: Option<String>,
}

/// State of a server-side copy into a destination object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyState {
    Pending,
    Success,
    Failed(String),
    Aborted,
}

/// Trait for object storage operations.
pub trait ObjectStore: Send + Sync {
    /// Upload data to object storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Download an object.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the object doesn't exist.
    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete an object. Deleting a missing object is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// List objects with an optional key prefix, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the bucket doesn't exist.
    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<ObjectMetadata>>;

    /// Check if an object exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    fn object_exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;

    /// Fetch object attributes without downloading content.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the object doesn't exist.
    fn get_metadata(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata>;

    /// Start a server-side copy and return its copy id.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the source doesn't exist.
    fn start_copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StorageResult<String>;

    /// Poll the state of the most recent copy into `bucket/key`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if no copy targets the object and it doesn't exist.
    fn copy_state(&self, bucket: &str, key: &str) -> StorageResult<CopyState>;
}

// ============================================================================
// InMemoryObjectStore
// ============================================================================

type BucketStorage = Arc<Mutex<HashMap<String, HashMap<String, Vec<u8>>>>>;
type CopyTable = Arc<Mutex<HashMap<(String, String), PendingCopy>>>;

struct PendingCopy {
    data: Vec<u8>,
    remaining_polls: u32,
    failure: Option<String>,
}

/// In-memory [`ObjectStore`].
///
/// Clones share state. Server-side copies complete after `copy_latency` polls of
/// [`ObjectStore::copy_state`]; destinations registered with
/// [`InMemoryObjectStore::fail_copies_to`] settle as [`CopyState::Failed`].
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    storage: BucketStorage,
    copies: CopyTable,
    failing_copies: Arc<Mutex<HashMap<(String, String), String>>>,
    copy_latency: u32,
    copy_counter: Arc<AtomicU64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn metadata_for(key: &str, data: &[u8]) -> ObjectMetadata {
    ObjectMetadata {
        key: key.to_string(),
        size: data.len() as u64,
        content_type: Some("application/octet-stream".to_string()),
        last_modified: Some(0),
        etag: Some(format!("etag-{key}")),
    }
}

impl InMemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every server-side copy report [`CopyState::Pending`] for `polls`
    /// polls before completing.
    #[must_use]
    pub fn with_copy_latency(mut self, polls: u32) -> Self {
        self.copy_latency = polls;
        self
    }

    /// Make copies into `bucket/key` settle as failed with `reason`.
    pub fn fail_copies_to(&self, bucket: &str, key: &str, reason: impl Into<String>) {
        lock(&self.failing_copies).insert((bucket.to_string(), key.to_string()), reason.into());
    }

    fn next_copy_id(&self) -> String {
        let n = self.copy_counter.fetch_add(1, Ordering::Relaxed);
        format!("copy-{n}")
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> StorageResult<()> {
        lock(&self.storage)
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        lock(&self.storage)
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| {
                StorageError::new(
                    StorageErrorKind::NotFound,
                    format!("Object {bucket}/{key} not found"),
                )
            })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        if let Some(bucket_map) = lock(&self.storage).get_mut(bucket) {
            bucket_map.remove(key);
        }
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<ObjectMetadata>> {
        let storage = lock(&self.storage);
        let bucket_map = storage.get(bucket).ok_or_else(|| {
            StorageError::new(
                StorageErrorKind::NotFound,
                format!("Bucket {bucket} not found"),
            )
        })?;

        let mut objects: Vec<ObjectMetadata> = bucket_map
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .map(|(key, data)| metadata_for(key, data))
            .collect();

        drop(storage);
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn object_exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let storage = lock(&self.storage);
        Ok(storage.get(bucket).is_some_and(|b| b.contains_key(key)))
    }

    fn get_metadata(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        lock(&self.storage)
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|data| metadata_for(key, data))
            .ok_or_else(|| {
                StorageError::new(
                    StorageErrorKind::NotFound,
                    format!("Object {bucket}/{key} not found"),
                )
            })
    }

    fn start_copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StorageResult<String> {
        let data = self.get_object(src_bucket, src_key)?;
        let target = (dst_bucket.to_string(), dst_key.to_string());
        let failure = lock(&self.failing_copies).get(&target).cloned();

        if self.copy_latency == 0 && failure.is_none() {
            self.put_object(dst_bucket, dst_key, &data)?;
            lock(&self.copies).remove(&target);
        } else {
            lock(&self.copies).insert(
                target,
                PendingCopy {
                    data,
                    remaining_polls: self.copy_latency,
                    failure,
                },
            );
        }
        Ok(self.next_copy_id())
    }

    fn copy_state(&self, bucket: &str, key: &str) -> StorageResult<CopyState> {
        let target = (bucket.to_string(), key.to_string());
        let mut copies = lock(&self.copies);

        let Some(pending) = copies.get_mut(&target) else {
            drop(copies);
            // No copy in flight: a present object counts as a settled copy.
            return if self.object_exists(bucket, key)? {
                Ok(CopyState::Success)
            } else {
                Err(StorageError::new(
                    StorageErrorKind::NotFound,
                    format!("No copy targets {bucket}/{key}"),
                ))
            };
        };

        if pending.remaining_polls > 0 {
            pending.remaining_polls -= 1;
            return Ok(CopyState::Pending);
        }

        let settled = copies.remove(&target);
        drop(copies);
        match settled {
            Some(PendingCopy {
                failure: Some(reason),
                ..
            }) => Ok(CopyState::Failed(reason)),
            Some(PendingCopy { data, .. }) => {
                self.put_object(bucket, key, &data)?;
                Ok(CopyState::Success)
            }
            None => Ok(CopyState::Aborted),
        }
    }
}
