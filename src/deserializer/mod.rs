//! Record deserializers: turn a set of file paths into a lazy sequence of records.
//!
//! A [`RecordDeserializer`] is stateless; every call to
//! [`RecordDeserializer::deserialize`] returns a fresh [`Records`] cursor. The
//! cursors built here are driven by [`FileChain`], which:
//!
//! - opens nothing until the first call to `next`
//! - visits files in the order given, concatenating their records
//! - closes each exhausted file before opening the next, so at most one
//!   handle is open at a time
//! - yields a single `Err` on the first open/read failure and then ends;
//!   records already yielded stay valid
//!
//! Built-in formats:
//! - [`ByteDeserializer`] - one `u8` per byte
//! - [`RowDeserializer`] - one [`Row`] per byte
//! - [`LineDeserializer`] - one `String` per non-empty line, decompressing by extension
//! - [`JsonLinesDeserializer`] - one `T: DeserializeOwned` per non-empty JSON line
//!
//! [`DirectoryAdapter`] provides the legacy "read every file in a directory"
//! entry point on top of any of them.

pub mod bytes;
pub mod directory;
pub mod lines;

pub use bytes::{ByteDeserializer, Row, RowDeserializer};
pub use directory::DirectoryAdapter;
pub use lines::{JsonLinesDeserializer, LineDeserializer};

use crate::compression::{DecodedStream, auto_detect_reader};
use crate::error::{PartitionError, Result};
use crate::storage::StorageAccessor;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// A lazy, finite, single-pass sequence of records.
pub type Records<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

/// Turns file paths into a lazy sequence of `T`.
///
/// Implementations must not touch storage inside `deserialize` itself; all I/O
/// happens as the returned cursor is advanced.
pub trait RecordDeserializer<T>: Send + Sync {
    /// Binding name this deserializer is registered under (e.g., `"bytes"`).
    fn name(&self) -> &str;

    /// Build a cursor over the records of every file in `paths`.
    fn deserialize(&self, paths: Vec<String>, storage: Arc<dyn StorageAccessor>) -> Records<T>;
}

impl<T, D: RecordDeserializer<T> + ?Sized> RecordDeserializer<T> for Arc<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn deserialize(&self, paths: Vec<String>, storage: Arc<dyn StorageAccessor>) -> Records<T> {
        (**self).deserialize(paths, storage)
    }
}

/// Per-file record decoder used by [`FileChain`].
pub trait RecordDecoder<T>: Send {
    /// Decode the next record, or `Ok(None)` at end of file.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails or the bytes are malformed.
    fn decode(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<T>>;

    /// Called whenever a new file is opened.
    fn reset(&mut self) {}
}

struct OpenFile {
    path: String,
    reader: DecodedStream,
}

/// Iterator that streams records out of a list of files, one file at a time.
pub struct FileChain<T, D> {
    storage: Arc<dyn StorageAccessor>,
    pending: VecDeque<String>,
    current: Option<OpenFile>,
    decoder: D,
    decompress: bool,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T, D: RecordDecoder<T>> FileChain<T, D> {
    pub fn new(paths: Vec<String>, storage: Arc<dyn StorageAccessor>, decoder: D) -> Self {
        Self {
            storage,
            pending: paths.into(),
            current: None,
            decoder,
            decompress: false,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// Wrap each file with [`auto_detect_reader`] before decoding.
    #[must_use]
    pub fn decompressed(mut self) -> Self {
        self.decompress = true;
        self
    }

    fn open(&self, path: &str) -> Result<DecodedStream> {
        let raw = self.storage.open(path).map_err(|e| {
            PartitionError::read(format!("cannot open {path}")).with_source(e)
        })?;
        if self.decompress {
            auto_detect_reader(raw, path).map_err(|e| {
                PartitionError::read(format!("setup decompression for {path}")).with_source(e)
            })
        } else {
            Ok(Box::new(BufReader::new(raw)))
        }
    }

    fn fail(&mut self, err: PartitionError) -> Option<Result<T>> {
        self.finished = true;
        self.current = None;
        self.pending.clear();
        Some(Err(err))
    }
}

impl<T, D: RecordDecoder<T>> Iterator for FileChain<T, D> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if self.current.is_none() {
                let Some(path) = self.pending.pop_front() else {
                    self.finished = true;
                    return None;
                };
                match self.open(&path) {
                    Ok(reader) => {
                        debug!(path = %path, "opened file");
                        self.decoder.reset();
                        self.current = Some(OpenFile { path, reader });
                    }
                    Err(err) => return self.fail(err),
                }
            }

            let file = self.current.as_mut()?;
            match self.decoder.decode(&mut file.reader) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {
                    debug!(path = %file.path, "closed file");
                    self.current = None;
                }
                Err(e) => {
                    let err = PartitionError::read(format!("read failed in {}", file.path))
                        .with_source(e);
                    return self.fail(err);
                }
            }
        }
    }
}
