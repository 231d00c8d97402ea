//! # Ironpart
//!
//! Partitioned file input for distributed batch jobs.
//!
//! A control node describes how a collection of files is split into
//! independent partitions without reading any of them; each worker later
//! rebuilds exactly its own partition from a small descriptor and reads it
//! lazily through a pluggable record format.
//!
//! ## Key Features
//!
//! - **I/O-free partition assignment** - `;`-joined grouping entries become
//!   [`PartitionSpec`]s with a stable dataset id
//! - **Versioned descriptors** - JSON or checksummed binary blobs that cross
//!   process boundaries ([`PartitionConfiguration`])
//! - **Pluggable deserializers** - bytes, rows, lines, JSON lines, or your own,
//!   resolved by name through a [`DeserializerRegistry`]
//! - **Local staging** - optionally copy remote files into a per-reader
//!   directory that is removed when the reader is dropped
//! - **Storage backends** - local disk and object stores behind one
//!   [`StorageAccessor`] trait
//! - **Transparent decompression** - gzip, zstd, bzip2 and xz for the
//!   line-oriented formats (all optional via feature flags)
//!
//! ## Quick Start
//!
//! ```
//! use ironpart::testing::TestFiles;
//! use ironpart::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let files = TestFiles::new()?;
//! let a = files.write("a.bin", &[1, 2, 3])?;
//! let b = files.write("b.bin", &[4, 5, 6, 7])?;
//!
//! // Control node: one partition per entry, no I/O.
//! let dataset = PartitionedDataset::build([a, b], false, DeserializerBinding::bytes())?;
//! let blobs = dataset
//!     .configurations()
//!     .iter()
//!     .map(PartitionConfiguration::to_json)
//!     .collect::<Result<Vec<_>>>()?;
//!
//! // Worker: decode, resolve the deserializer, read.
//! let context = WorkerContext::local(DeserializerRegistry::<u8>::with_builtins());
//! let mut counts = Vec::new();
//! for blob in &blobs {
//!     counts.push(context.instantiate_json(blob)?.count()?);
//! }
//! assert_eq!(counts, vec![3, 4]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`,
//!   `compression-xz` - codecs used by the line-oriented deserializers
//! - `binary-descriptors` - postcard encoding with a SHA-256 checksum
//! - `parallel` - build descriptors on the rayon pool
//!
//! All features are enabled by default.
//!
//! ## Logging
//!
//! The crate emits [`tracing`](https://docs.rs/tracing) events and never
//! installs a subscriber.

pub mod compression;
pub mod config;
pub mod dataset;
pub mod descriptor;
pub mod deserializer;
pub mod discovery;
pub mod error;
pub mod partition;
pub mod registry;
pub mod storage;
pub mod testing;

pub use config::{DatasetConfig, EnvironmentConfig};
pub use dataset::{PartitionSpec, PartitionedDataset};
pub use descriptor::{PartitionConfigV1, PartitionConfiguration};
pub use deserializer::{
    ByteDeserializer, DirectoryAdapter, JsonLinesDeserializer, LineDeserializer,
    RecordDeserializer, Records, Row, RowDeserializer,
};
pub use discovery::{entries_from_glob, entries_from_glob_grouped};
pub use error::{ErrorKind, PartitionError, Result};
pub use partition::{Partition, PartitionReader, WorkerContext};
pub use registry::{BuiltinRecord, DeserializerBinding, DeserializerRegistry};
pub use storage::{LocalFileSystem, StorageAccessor, StorageError, StorageErrorKind};
