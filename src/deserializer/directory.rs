//! Legacy single-directory entry point.
//!
//! Older callers hand a deserializer a directory instead of a file set. The
//! adapter expands the directory through [`StorageAccessor::list`] and delegates
//! to the wrapped set-based deserializer.

use crate::deserializer::{RecordDeserializer, Records};
use crate::error::{PartitionError, Result};
use crate::storage::{StorageAccessor, StorageErrorKind};
use std::marker::PhantomData;
use std::sync::Arc;

pub struct DirectoryAdapter<T, D> {
    inner: D,
    _marker: PhantomData<fn() -> T>,
}

impl<T, D: RecordDeserializer<T>> DirectoryAdapter<T, D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Read every file directly under `dir`.
    ///
    /// The listing happens eagerly; file contents are still read lazily.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if `dir` does not exist, or a `Read` error if
    /// it cannot be listed.
    pub fn deserialize_directory(
        &self,
        dir: &str,
        storage: Arc<dyn StorageAccessor>,
    ) -> Result<Records<T>> {
        let files = storage.list(dir).map_err(|e| match e.kind {
            StorageErrorKind::NotFound => {
                PartitionError::not_found(format!("directory {dir} does not exist"))
            }
            _ => PartitionError::read(format!("cannot list {dir}")).with_source(e),
        })?;
        Ok(self.inner.deserialize(files, storage))
    }
}
