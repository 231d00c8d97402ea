//! Error type shared by dataset construction, descriptor decoding and partition reads.
//!
//! Every failure falls into one of three kinds:
//! - [`ErrorKind::Configuration`] - malformed grouping input, empty entries, an
//!   undecodable descriptor or an unknown deserializer binding
//! - [`ErrorKind::NotFound`] - a file or directory missing at read/staging time
//! - [`ErrorKind::Read`] - an I/O failure while copying or streaming bytes
//!
//! Nothing in this crate retries; errors surface at the point of detection.

use crate::storage::{StorageError, StorageErrorKind};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    Read,
}

/// Error returned by every fallible operation in the crate.
#[derive(Debug, Clone)]
pub struct PartitionError {
    pub kind: ErrorKind,
    pub message: String,
    pub source: Option<String>,
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl Error for PartitionError {}

impl PartitionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn read(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Read, message)
    }

    #[must_use]
    pub fn with_source(mut self, source: impl fmt::Display) -> Self {
        self.source = Some(source.to_string());
        self
    }

    #[must_use]
    pub fn is_configuration(&self) -> bool {
        self.kind == ErrorKind::Configuration
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    #[must_use]
    pub fn is_read(&self) -> bool {
        self.kind == ErrorKind::Read
    }
}

impl From<StorageError> for PartitionError {
    fn from(err: StorageError) -> Self {
        let kind = match err.kind {
            StorageErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Read,
        };
        Self {
            kind,
            message: err.message,
            source: err.source,
        }
    }
}

impl From<std::io::Error> for PartitionError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Read,
        };
        Self::new(kind, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PartitionError>;
