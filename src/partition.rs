//! Worker-side partitions.
//!
//! A [`WorkerContext<T>`] holds what a worker process brings to every
//! partition: the deserializer registry for its record type, a storage
//! accessor, and its [`EnvironmentConfig`]. Decoding a descriptor against a
//! context yields a [`Partition<T>`], and [`Partition::open`] yields a
//! [`PartitionReader<T>`] over the partition's records.
//!
//! # Staging
//!
//! When the descriptor asks for local staging, `open` copies every source file
//! into a fresh directory under the staging root before any record is read.
//! The directory is named after the partition id plus a random suffix, so two
//! readers of the same partition never share one. It belongs to the reader and
//! is removed when the reader is dropped, whether or not it was exhausted.
//!
//! ```
//! use ironpart::{DeserializerBinding, DeserializerRegistry, PartitionedDataset, WorkerContext};
//! use ironpart::testing::TestFiles;
//!
//! let files = TestFiles::new()?;
//! let a = files.write("a.bin", &[1, 2, 3])?;
//! let b = files.write("b.bin", &[4, 5, 6, 7])?;
//!
//! let dataset = PartitionedDataset::build([format!("{a};{b}")], true, DeserializerBinding::bytes())?;
//! let blob = dataset.partitions()[0].to_configuration().to_json()?;
//!
//! let context = WorkerContext::local(DeserializerRegistry::<u8>::with_builtins());
//! let partition = context.instantiate_json(&blob)?;
//! assert_eq!(partition.count()?, 7);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::config::EnvironmentConfig;
use crate::dataset::{PartitionSpec, basename};
use crate::deserializer::{RecordDeserializer, Records};
use crate::descriptor::PartitionConfiguration;
use crate::error::{PartitionError, Result};
use crate::registry::DeserializerRegistry;
use crate::storage::{LocalFileSystem, StorageAccessor, StorageErrorKind};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Process-local resources shared by every partition a worker materializes.
pub struct WorkerContext<T> {
    registry: DeserializerRegistry<T>,
    storage: Arc<dyn StorageAccessor>,
    environment: EnvironmentConfig,
}

impl<T> Clone for WorkerContext<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            storage: Arc::clone(&self.storage),
            environment: self.environment.clone(),
        }
    }
}

impl<T: 'static> WorkerContext<T> {
    pub fn new(registry: DeserializerRegistry<T>, storage: Arc<dyn StorageAccessor>) -> Self {
        Self {
            registry,
            storage,
            environment: EnvironmentConfig::default(),
        }
    }

    /// Context reading from the local filesystem.
    pub fn local(registry: DeserializerRegistry<T>) -> Self {
        Self::new(registry, Arc::new(LocalFileSystem::new()))
    }

    #[must_use]
    pub fn with_environment(mut self, environment: EnvironmentConfig) -> Self {
        self.environment = environment;
        self
    }

    pub fn registry(&self) -> &DeserializerRegistry<T> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeserializerRegistry<T> {
        &mut self.registry
    }

    pub fn storage(&self) -> &Arc<dyn StorageAccessor> {
        &self.storage
    }

    pub fn environment(&self) -> &EnvironmentConfig {
        &self.environment
    }

    /// Shorthand for [`Partition::from_configuration`].
    ///
    /// # Errors
    ///
    /// See [`Partition::from_configuration`].
    pub fn instantiate(&self, config: &PartitionConfiguration) -> Result<Partition<T>> {
        Partition::from_configuration(config, self)
    }

    /// Decode a JSON descriptor and build its partition.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the blob is malformed or its binding
    /// cannot be resolved.
    pub fn instantiate_json(&self, json: &str) -> Result<Partition<T>> {
        self.instantiate(&PartitionConfiguration::from_json(json)?)
    }

    /// Decode a binary descriptor and build its partition.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the blob is malformed, fails its
    /// checksum, or its binding cannot be resolved.
    #[cfg(feature = "binary-descriptors")]
    pub fn instantiate_bytes(&self, bytes: &[u8]) -> Result<Partition<T>> {
        self.instantiate(&PartitionConfiguration::from_bytes(bytes)?)
    }
}

/// A materialized partition, bound to a deserializer and a storage accessor.
///
/// Building a `Partition` touches no storage. Each call to [`open`](Self::open)
/// re-reads the source files from scratch.
pub struct Partition<T> {
    id: String,
    source_paths: BTreeSet<String>,
    stage_locally: bool,
    staging_root: PathBuf,
    deserializer: Arc<dyn RecordDeserializer<T>>,
    storage: Arc<dyn StorageAccessor>,
}

impl<T> fmt::Debug for Partition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("id", &self.id)
            .field("source_paths", &self.source_paths)
            .field("stage_locally", &self.stage_locally)
            .field("staging_root", &self.staging_root)
            .field("deserializer", &self.deserializer.name())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Partition<T> {
    /// Rebuild a partition from its descriptor.
    ///
    /// Fields in the descriptor always win; the context only fills in what the
    /// descriptor leaves open (the staging root).
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the descriptor names no file path or
    /// its deserializer binding is not registered in the context.
    pub fn from_configuration(
        config: &PartitionConfiguration,
        context: &WorkerContext<T>,
    ) -> Result<Self> {
        let source_paths = config.path_set();
        if source_paths.is_empty() {
            return Err(PartitionError::configuration(format!(
                "descriptor {} names no file path",
                config.id()
            )));
        }
        let deserializer = context.registry.resolve(config.deserializer())?;
        let staging_root = context
            .environment
            .resolve_temp_folder(config.temp_folder());

        debug!(
            partition_id = config.id(),
            files = source_paths.len(),
            stage_locally = config.stage_locally(),
            deserializer = deserializer.name(),
            "instantiated partition"
        );
        Ok(Self {
            id: config.id().to_string(),
            source_paths,
            stage_locally: config.stage_locally(),
            staging_root,
            deserializer,
            storage: Arc::clone(&context.storage),
        })
    }

    /// Build directly from a [`PartitionSpec`] in the same process.
    ///
    /// # Errors
    ///
    /// See [`from_configuration`](Self::from_configuration).
    pub fn from_spec(spec: &PartitionSpec, context: &WorkerContext<T>) -> Result<Self> {
        Self::from_configuration(&spec.to_configuration(), context)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn source_paths(&self) -> &BTreeSet<String> {
        &self.source_paths
    }

    #[must_use]
    pub fn stage_locally(&self) -> bool {
        self.stage_locally
    }

    /// Directory under which staging directories are created.
    #[must_use]
    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Start reading the partition's records.
    ///
    /// Every source is checked for existence first. With staging enabled, all
    /// sources are then copied locally before the reader is returned.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if any source is missing, or a `Read` error
    /// if the storage backend fails or a staging copy fails.
    pub fn open(&self) -> Result<PartitionReader<T>> {
        for path in &self.source_paths {
            let exists = self.storage.exists(path).map_err(|e| {
                PartitionError::read(format!("cannot check {path}")).with_source(e)
            })?;
            if !exists {
                return Err(PartitionError::not_found(format!(
                    "partition {}: source {path} does not exist",
                    self.id
                )));
            }
        }

        if !self.stage_locally {
            let paths: Vec<String> = self.source_paths.iter().cloned().collect();
            let records = self.deserializer.deserialize(paths, Arc::clone(&self.storage));
            return Ok(PartitionReader::new(self.id.clone(), records, None));
        }

        let staging = self.create_staging_dir()?;
        let mut staged = Vec::with_capacity(self.source_paths.len());
        for (index, source) in self.source_paths.iter().enumerate() {
            let dest = staging.path().join(staged_name(index, source));
            let dest = dest.to_string_lossy().into_owned();
            self.storage.copy(source, &dest).map_err(|e| {
                let message = format!("partition {}: cannot stage {source}", self.id);
                let err = match e.kind {
                    StorageErrorKind::NotFound => PartitionError::not_found(message),
                    _ => PartitionError::read(message),
                };
                err.with_source(e)
            })?;
            debug!(partition_id = %self.id, path = %source, staged = %dest, "staged file");
            staged.push(dest);
        }
        info!(
            partition_id = %self.id,
            count = staged.len(),
            dir = %staging.path().display(),
            "staged partition locally"
        );

        let records = self
            .deserializer
            .deserialize(staged, Arc::new(LocalFileSystem::new()));
        Ok(PartitionReader::new(self.id.clone(), records, Some(staging)))
    }

    /// Read the whole partition and return the number of records.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`open`](Self::open) or the reader.
    pub fn count(&self) -> Result<usize> {
        self.open()?.try_fold(0, |n, record| record.map(|_| n + 1))
    }

    fn create_staging_dir(&self) -> Result<TempDir> {
        std::fs::create_dir_all(&self.staging_root).map_err(|e| {
            PartitionError::read(format!(
                "cannot create staging root {}",
                self.staging_root.display()
            ))
            .with_source(e)
        })?;
        tempfile::Builder::new()
            .prefix(&format!("{}-", self.id))
            .tempdir_in(&self.staging_root)
            .map_err(|e| {
                PartitionError::read(format!(
                    "cannot create staging directory for partition {}",
                    self.id
                ))
                .with_source(e)
            })
    }
}

/// Name of the local copy of the `index`-th source. The index prefix keeps
/// sources with equal basenames apart and preserves read order.
fn staged_name(index: usize, source: &str) -> String {
    match basename(source) {
        "" => format!("{index:04}"),
        name => format!("{index:04}-{name}"),
    }
}

/// Forward-only cursor over one partition's records.
///
/// Owns the staging directory, if any; dropping the reader releases the open
/// file handle first and then removes the staged copies.
pub struct PartitionReader<T> {
    id: String,
    records: Option<Records<T>>,
    staging: Option<TempDir>,
    yielded: u64,
}

impl<T> PartitionReader<T> {
    fn new(id: String, records: Records<T>, staging: Option<TempDir>) -> Self {
        Self {
            id,
            records: Some(records),
            staging,
            yielded: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Local directory holding the staged copies, if the partition was staged.
    #[must_use]
    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging.as_ref().map(TempDir::path)
    }

    /// Release handles and remove the staging directory, reporting any
    /// failure instead of only logging it.
    ///
    /// # Errors
    ///
    /// Returns a `Read` error if the staging directory cannot be removed.
    pub fn close(mut self) -> Result<()> {
        self.records = None;
        if let Some(staging) = self.staging.take() {
            let dir = staging.path().display().to_string();
            staging.close().map_err(|e| {
                PartitionError::read(format!("cannot remove staging directory {dir}"))
                    .with_source(e)
            })?;
            debug!(partition_id = %self.id, dir = %dir, "removed staging directory");
        }
        Ok(())
    }
}

impl<T> Iterator for PartitionReader<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.records.as_mut()?.next();
        if matches!(item, Some(Ok(_))) {
            self.yielded += 1;
        }
        item
    }
}

impl<T> Drop for PartitionReader<T> {
    fn drop(&mut self) {
        self.records = None;
        if let Some(staging) = self.staging.take() {
            let dir = staging.path().display().to_string();
            match staging.close() {
                Ok(()) => debug!(
                    partition_id = %self.id,
                    dir = %dir,
                    count = self.yielded,
                    "removed staging directory"
                ),
                Err(e) => warn!(
                    partition_id = %self.id,
                    dir = %dir,
                    error = %e,
                    "failed to remove staging directory"
                ),
            }
        }
    }
}
