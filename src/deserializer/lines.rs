//! Line-oriented deserializers with transparent decompression.
//!
//! Empty and whitespace-only lines are skipped. Line numbers in error messages
//! are 1-based and restart for every file.

use crate::deserializer::{FileChain, RecordDecoder, RecordDeserializer, Records};
use crate::storage::StorageAccessor;
use serde::de::DeserializeOwned;
use std::io::{self, BufRead};
use std::marker::PhantomData;
use std::sync::Arc;

/// Reads the next non-blank line, without its line terminator.
#[derive(Default)]
struct LineCursor {
    line_no: u64,
    buf: String,
}

impl LineCursor {
    fn next_line(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<&str>> {
        loop {
            self.buf.clear();
            if reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if !self.buf.trim().is_empty() {
                return Ok(Some(self.buf.trim_end_matches(['\n', '\r'])));
            }
        }
    }
}

struct LineDecoder(LineCursor);

impl RecordDecoder<String> for LineDecoder {
    fn decode(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<String>> {
        Ok(self.0.next_line(reader)?.map(str::to_string))
    }

    fn reset(&mut self) {
        self.0.line_no = 0;
    }
}

/// Yields one `String` per non-empty line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineDeserializer;

impl LineDeserializer {
    pub const NAME: &'static str = "lines";
}

impl RecordDeserializer<String> for LineDeserializer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn deserialize(
        &self,
        paths: Vec<String>,
        storage: Arc<dyn StorageAccessor>,
    ) -> Records<String> {
        Box::new(FileChain::new(paths, storage, LineDecoder(LineCursor::default())).decompressed())
    }
}

struct JsonLineDecoder<T> {
    cursor: LineCursor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> RecordDecoder<T> for JsonLineDecoder<T> {
    fn decode(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<T>> {
        let Some(line) = self.cursor.next_line(reader)? else {
            return Ok(None);
        };
        serde_json::from_str(line).map(Some).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("parse JSONL line {}: {e}", self.cursor.line_no),
            )
        })
    }

    fn reset(&mut self) {
        self.cursor.line_no = 0;
    }
}

/// Yields one `T` per non-empty JSON line.
pub struct JsonLinesDeserializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonLinesDeserializer<T> {
    pub const NAME: &'static str = "jsonl";

    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonLinesDeserializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send + 'static> RecordDeserializer<T> for JsonLinesDeserializer<T> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn deserialize(&self, paths: Vec<String>, storage: Arc<dyn StorageAccessor>) -> Records<T> {
        let decoder = JsonLineDecoder {
            cursor: LineCursor::default(),
            _marker: PhantomData,
        };
        Box::new(FileChain::new(paths, storage, decoder).decompressed())
    }
}
