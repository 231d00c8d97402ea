//! Configuration for both sides of the description/materialization split.
//!
//! - [`DatasetConfig`] lives on the control node: the grouping entries, the
//!   staging flag and the deserializer binding. It is loaded from JSON and
//!   turned into a [`PartitionedDataset`].
//! - [`EnvironmentConfig`] lives on each worker: process-local concerns that
//!   have no meaning at description time, such as where to stage files.
//!   Values present in a partition descriptor always take precedence.

use crate::dataset::PartitionedDataset;
use crate::error::Result;
use crate::registry::DeserializerBinding;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Control-node description of a dataset.
///
/// ```
/// use ironpart::DatasetConfig;
///
/// let config = DatasetConfig::from_json_str(
///     r#"{
///         "partitions": ["/data/a.bin;/data/b.bin", "/data/c.bin"],
///         "stage_locally": true,
///         "deserializer": { "name": "bytes" }
///     }"#,
/// )?;
/// let dataset = config.build()?;
/// assert_eq!(dataset.len(), 2);
/// assert_eq!(dataset.id(), "FileSystemDataSet-c.bin");
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Grouping entries, one per partition; `;` joins paths within an entry.
    pub partitions: Vec<String>,
    /// Copy every source file into a local staging directory before reading.
    #[serde(default)]
    pub stage_locally: bool,
    pub deserializer: DeserializerBinding,
}

impl DatasetConfig {
    #[must_use]
    pub fn new(deserializer: DeserializerBinding) -> Self {
        Self {
            partitions: Vec::new(),
            stage_locally: false,
            deserializer,
        }
    }

    /// Append one grouping entry.
    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.partitions.push(entry.into());
        self
    }

    #[must_use]
    pub fn with_stage_locally(mut self, stage_locally: bool) -> Self {
        self.stage_locally = stage_locally;
        self
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid `DatasetConfig`.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("parse dataset config")
    }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid `DatasetConfig`.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read dataset config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("in {}", path.display()))
    }

    /// Build the partitioned dataset this config describes. Performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error under the same conditions as
    /// [`PartitionedDataset::build`].
    pub fn build(&self) -> Result<PartitionedDataset> {
        PartitionedDataset::build(&self.partitions, self.stage_locally, self.deserializer.clone())
    }
}

/// Environment variable suffix read by [`EnvironmentConfig::from_env`].
pub const TEMP_FOLDER_VAR: &str = "TEMP_FOLDER";

/// Worker-side, process-local configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Root under which partitions create their staging directories.
    #[serde(default)]
    pub temp_folder: Option<PathBuf>,
}

impl EnvironmentConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_temp_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.temp_folder = Some(folder.into());
        self
    }

    /// Load from environment variables named `<prefix>TEMP_FOLDER`.
    #[must_use]
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars_os())
    }

    /// Load from `(name, value)` pairs as [`from_env`](Self::from_env) does.
    ///
    /// Names that are not UTF-8 are skipped; values are taken as raw paths.
    #[must_use]
    pub fn from_vars<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let Some(name) = key.to_str().and_then(|k| k.strip_prefix(prefix)) else {
                continue;
            };
            let blank = value.to_str().is_some_and(|v| v.trim().is_empty());
            if name.eq_ignore_ascii_case(TEMP_FOLDER_VAR) && !value.is_empty() && !blank {
                config.temp_folder = Some(PathBuf::from(value));
            }
        }
        config
    }

    /// Staging root for a partition: the descriptor's folder if it names one,
    /// otherwise this environment's, otherwise the system temp directory.
    #[must_use]
    pub fn resolve_temp_folder(&self, from_descriptor: Option<&Path>) -> PathBuf {
        from_descriptor
            .map(Path::to_path_buf)
            .or_else(|| self.temp_folder.clone())
            .unwrap_or_else(std::env::temp_dir)
    }
}
