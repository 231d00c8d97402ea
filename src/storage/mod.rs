//! Storage capability consumed by partitions and deserializers.
//!
//! A [`StorageAccessor`] exposes the small set of blocking operations the rest of
//! the crate needs over a named path: existence checks, copies, byte streams,
//! deletes and directory listings. Two families of backends are provided:
//!
//! - [`LocalFileSystem`] - plain `std::fs` paths
//! - [`ObjectStoreAccessor`] - any [`ObjectStore`] (blob storage) addressed with
//!   `scheme://bucket/key` URIs, falling back to local disk for bare paths
//!
//! ## Synchronous by Design
//! Partition materialization is a blocking, single-owner activity, so the traits
//! are synchronous. Implementations for async SDKs block internally.
//!
//! ## Testing
//! [`InMemoryObjectStore`] keeps all objects in memory and can simulate slow or
//! failing server-side copies, so the staging path can be tested without a real
//! blob service.

pub mod accessor;
pub mod local;
pub mod object;

pub use accessor::{CopyPollConfig, ObjectLocation, ObjectStoreAccessor, parse_object_uri};
pub use local::LocalFileSystem;
pub use object::{CopyState, InMemoryObjectStore, ObjectMetadata, ObjectStore};

use std::error::Error;
use std::fmt;
use std::io::Read;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    Io,
    CopyFailed,
    Pending,
}

/// Error reported by storage backends.
#[derive(Debug, Clone)]
pub struct StorageError {
    pub message: String,
    pub kind: StorageErrorKind,
    pub source: Option<String>,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl Error for StorageError {}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Wrap an `io::Error` raised while touching `path`.
    pub fn io(path: &str, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            std::io::ErrorKind::AlreadyExists => StorageErrorKind::AlreadyExists,
            _ => StorageErrorKind::Io,
        };
        Self::new(kind, format!("{path}: {err}"))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A readable byte stream handed out by [`StorageAccessor::open`].
pub type ByteStream = Box<dyn Read + Send>;

// ============================================================================
// StorageAccessor
// ============================================================================

/// Uniform, blocking access to files on one or more storage backends.
///
/// Paths are plain strings so that descriptors can carry them across process
/// boundaries unchanged; each backend decides how to interpret them.
pub trait StorageAccessor: Send + Sync {
    /// Returns whether an object exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot answer (e.g., malformed URI).
    fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Copy the object at `source` to `dest`, creating parent directories for
    /// local destinations.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is missing or the copy fails.
    fn copy(&self, source: &str, dest: &str) -> StorageResult<()>;

    /// Open the object at `path` as a byte stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or cannot be read.
    fn open(&self, path: &str) -> StorageResult<ByteStream>;

    /// Delete the object at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be deleted.
    fn delete(&self, path: &str) -> StorageResult<()>;

    /// List the files directly under the directory (or prefix) `dir`, sorted.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the directory does not exist.
    fn list(&self, dir: &str) -> StorageResult<Vec<String>>;
}

impl<S: StorageAccessor + ?Sized> StorageAccessor for std::sync::Arc<S> {
    fn exists(&self, path: &str) -> StorageResult<bool> {
        (**self).exists(path)
    }

    fn copy(&self, source: &str, dest: &str) -> StorageResult<()> {
        (**self).copy(source, dest)
    }

    fn open(&self, path: &str) -> StorageResult<ByteStream> {
        (**self).open(path)
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        (**self).delete(path)
    }

    fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        (**self).list(dir)
    }
}
