//! Byte-level deserializers.

use crate::deserializer::{FileChain, RecordDecoder, RecordDeserializer, Records};
use crate::storage::StorageAccessor;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead};
use std::sync::Arc;

fn next_byte(reader: &mut dyn BufRead) -> io::Result<Option<u8>> {
    let byte = match reader.fill_buf()?.first() {
        Some(&b) => b,
        None => return Ok(None),
    };
    reader.consume(1);
    Ok(Some(byte))
}

struct ByteDecoder;

impl RecordDecoder<u8> for ByteDecoder {
    fn decode(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<u8>> {
        next_byte(reader)
    }
}

/// Yields every byte of every file, files concatenated in path order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteDeserializer;

impl ByteDeserializer {
    pub const NAME: &'static str = "bytes";
}

impl RecordDeserializer<u8> for ByteDeserializer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn deserialize(&self, paths: Vec<String>, storage: Arc<dyn StorageAccessor>) -> Records<u8> {
        Box::new(FileChain::new(paths, storage, ByteDecoder))
    }
}

/// A single-byte record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Row(pub u8);

impl Row {
    #[must_use]
    pub fn value(&self) -> u8 {
        self.0
    }
}

struct RowDecoder;

impl RecordDecoder<Row> for RowDecoder {
    fn decode(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<Row>> {
        Ok(next_byte(reader)?.map(Row))
    }
}

/// Same traversal as [`ByteDeserializer`], wrapping each byte in a [`Row`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RowDeserializer;

impl RowDeserializer {
    pub const NAME: &'static str = "rows";
}

impl RecordDeserializer<Row> for RowDeserializer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn deserialize(&self, paths: Vec<String>, storage: Arc<dyn StorageAccessor>) -> Records<Row> {
        Box::new(FileChain::new(paths, storage, RowDecoder))
    }
}
