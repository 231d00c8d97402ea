//! [`StorageAccessor`] over an [`ObjectStore`], addressed with `scheme://bucket/key` URIs.
//!
//! Paths without a `://` separator are treated as local files, so a single
//! accessor can serve a partition whose files live in blob storage and the local
//! staging directory the partition copies them into.
//!
//! Copies between two objects are server-side and asynchronous; they are polled
//! to completion with a bounded, backed-off loop driven by [`CopyPollConfig`].

use crate::storage::object::{CopyState, ObjectStore};
use crate::storage::{
    ByteStream, LocalFileSystem, StorageAccessor, StorageError, StorageErrorKind, StorageResult,
};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// URI Parsing
// ============================================================================

/// A parsed `scheme://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub scheme: String,
    pub bucket: String,
    pub key: String,
}

/// Parse an object URI.
///
/// Returns `Ok(None)` for paths without a `scheme://` prefix (local paths).
///
/// # Errors
///
/// Returns an `InvalidInput` error if the URI has a scheme but no bucket or key.
pub fn parse_object_uri(uri: &str) -> StorageResult<Option<ObjectLocation>> {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return Ok(None);
    };

    let invalid = || {
        StorageError::new(
            StorageErrorKind::InvalidInput,
            format!("Invalid object URI format: {uri}"),
        )
    };

    if scheme.is_empty() {
        return Err(invalid());
    }
    let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
    if bucket.is_empty() {
        return Err(invalid());
    }

    Ok(Some(ObjectLocation {
        scheme: scheme.to_string(),
        bucket: bucket.to_string(),
        key: key.to_string(),
    }))
}

// ============================================================================
// Copy Polling
// ============================================================================

/// Polling behavior for server-side copies.
#[derive(Debug, Clone, Copy)]
pub struct CopyPollConfig {
    pub max_polls: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for CopyPollConfig {
    fn default() -> Self {
        Self {
            max_polls: 60,
            initial_delay_ms: 10,
            max_delay_ms: 1000,
        }
    }
}

// ============================================================================
// ObjectStoreAccessor
// ============================================================================

enum Location<'a> {
    Local(&'a str),
    Object(ObjectLocation),
}

/// Routes object URIs to an [`ObjectStore`] and bare paths to local disk.
#[derive(Clone)]
pub struct ObjectStoreAccessor<O> {
    store: O,
    scheme: String,
    poll: CopyPollConfig,
    local: LocalFileSystem,
}

impl<O: ObjectStore> ObjectStoreAccessor<O> {
    pub fn new(store: O, scheme: impl Into<String>) -> Self {
        Self {
            store,
            scheme: scheme.into(),
            poll: CopyPollConfig::default(),
            local: LocalFileSystem,
        }
    }

    #[must_use]
    pub fn with_poll_config(mut self, poll: CopyPollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn store(&self) -> &O {
        &self.store
    }

    fn locate<'a>(&self, path: &'a str) -> StorageResult<Location<'a>> {
        match parse_object_uri(path)? {
            None => Ok(Location::Local(path)),
            Some(loc) if loc.scheme == self.scheme => Ok(Location::Object(loc)),
            Some(loc) => Err(StorageError::new(
                StorageErrorKind::InvalidInput,
                format!(
                    "Scheme '{}' is not served by this accessor (expected '{}')",
                    loc.scheme, self.scheme
                ),
            )),
        }
    }

    fn wait_for_copy(&self, dst: &ObjectLocation) -> StorageResult<()> {
        let mut delay_ms = self.poll.initial_delay_ms;

        for _ in 0..self.poll.max_polls.max(1) {
            match self.store.copy_state(&dst.bucket, &dst.key)? {
                CopyState::Success => return Ok(()),
                CopyState::Pending => {
                    std::thread::sleep(Duration::from_millis(delay_ms));
                    delay_ms = delay_ms.saturating_mul(2).min(self.poll.max_delay_ms);
                }
                CopyState::Failed(reason) => {
                    return Err(StorageError::new(
                        StorageErrorKind::CopyFailed,
                        format!("Copy into {}/{} failed", dst.bucket, dst.key),
                    )
                    .with_source(reason));
                }
                CopyState::Aborted => {
                    return Err(StorageError::new(
                        StorageErrorKind::CopyFailed,
                        format!("Copy into {}/{} was aborted", dst.bucket, dst.key),
                    ));
                }
            }
        }

        Err(StorageError::new(
            StorageErrorKind::Pending,
            format!(
                "Copy into {}/{} still pending after {} polls",
                dst.bucket, dst.key, self.poll.max_polls
            ),
        ))
    }
}

impl<O: ObjectStore> StorageAccessor for ObjectStoreAccessor<O> {
    fn exists(&self, path: &str) -> StorageResult<bool> {
        match self.locate(path)? {
            Location::Local(p) => self.local.exists(p),
            Location::Object(loc) => self.store.object_exists(&loc.bucket, &loc.key),
        }
    }

    fn copy(&self, source: &str, dest: &str) -> StorageResult<()> {
        match (self.locate(source)?, self.locate(dest)?) {
            (Location::Local(src), Location::Local(dst)) => self.local.copy(src, dst),
            (Location::Object(src), Location::Local(dst)) => {
                let data = self.store.get_object(&src.bucket, &src.key)?;
                let dst_path = Path::new(dst);
                if let Some(parent) = dst_path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    fs::create_dir_all(parent).map_err(|e| StorageError::io(dst, &e))?;
                }
                fs::write(dst_path, &data).map_err(|e| StorageError::io(dst, &e))?;
                debug!(source, dest, bytes = data.len(), "downloaded object");
                Ok(())
            }
            (Location::Local(src), Location::Object(dst)) => {
                let data = fs::read(src).map_err(|e| StorageError::io(src, &e))?;
                self.store.put_object(&dst.bucket, &dst.key, &data)
            }
            (Location::Object(src), Location::Object(dst)) => {
                let copy_id = self
                    .store
                    .start_copy(&src.bucket, &src.key, &dst.bucket, &dst.key)?;
                debug!(source, dest, copy_id = %copy_id, "started server-side copy");
                self.wait_for_copy(&dst)
            }
        }
    }

    fn open(&self, path: &str) -> StorageResult<ByteStream> {
        match self.locate(path)? {
            Location::Local(p) => self.local.open(p),
            Location::Object(loc) => {
                let data = self.store.get_object(&loc.bucket, &loc.key)?;
                Ok(Box::new(Cursor::new(data)))
            }
        }
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        match self.locate(path)? {
            Location::Local(p) => self.local.delete(p),
            Location::Object(loc) => self.store.delete_object(&loc.bucket, &loc.key),
        }
    }

    fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        match self.locate(dir)? {
            Location::Local(p) => self.local.list(p),
            Location::Object(loc) => {
                let prefix = if loc.key.is_empty() || loc.key.ends_with('/') {
                    loc.key.clone()
                } else {
                    format!("{}/", loc.key)
                };
                let objects = self.store.list_objects(&loc.bucket, Some(&prefix))?;
                // Only direct children count as files of the directory
                let files: Vec<String> = objects
                    .into_iter()
                    .filter(|o| !o.key[prefix.len()..].contains('/'))
                    .map(|o| format!("{}://{}/{}", loc.scheme, loc.bucket, o.key))
                    .collect();
                if files.is_empty() {
                    return Err(StorageError::new(
                        StorageErrorKind::NotFound,
                        format!("Directory {dir} not found"),
                    ));
                }
                Ok(files)
            }
        }
    }
}
