//! Partition assignment on the control node.
//!
//! [`PartitionedDataset::build`] turns raw grouping entries into
//! [`PartitionSpec`]s without touching storage: no file is opened and no
//! existence check happens here, so describing thousands of partitions costs
//! only string handling.
//!
//! # Grouping input
//!
//! Each entry becomes exactly one partition. Within an entry, `;` separates the
//! file paths owned by that partition; paths are trimmed and empty segments are
//! dropped. An entry with no usable path fails the whole build.
//!
//! ```
//! use ironpart::{DeserializerBinding, PartitionedDataset};
//!
//! let dataset = PartitionedDataset::build(
//!     ["/tmp/abc;tmp//cde.txt;efg;tmp\\hhh"],
//!     true,
//!     DeserializerBinding::bytes(),
//! )?;
//! assert_eq!(dataset.len(), 1);
//! assert_eq!(dataset.id(), "FileSystemDataSet-hhh");
//! # Ok::<(), ironpart::PartitionError>(())
//! ```

use crate::error::{PartitionError, Result};
use crate::registry::DeserializerBinding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Separates file paths within one grouping entry.
pub const PATH_DELIMITER: char = ';';

/// Prefix of every dataset id.
pub const DATASET_ID_PREFIX: &str = "FileSystemDataSet-";

/// Prefix of every partition id; the entry index follows it.
pub const PARTITION_ID_PREFIX: &str = "FileSystemInputPartition-";

const PATH_SEPARATORS: [char; 2] = ['/', '\\'];

/// Serializable description of one partition. Free of opened resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    id: String,
    file_paths: BTreeSet<String>,
    stage_locally: bool,
    deserializer: DeserializerBinding,
}

impl PartitionSpec {
    pub(crate) fn new(
        id: String,
        file_paths: BTreeSet<String>,
        stage_locally: bool,
        deserializer: DeserializerBinding,
    ) -> Self {
        Self {
            id,
            file_paths,
            stage_locally,
            deserializer,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn file_paths(&self) -> &BTreeSet<String> {
        &self.file_paths
    }

    #[must_use]
    pub fn stage_locally(&self) -> bool {
        self.stage_locally
    }

    #[must_use]
    pub fn deserializer(&self) -> &DeserializerBinding {
        &self.deserializer
    }
}

/// The partitions of a dataset, in entry order, and the dataset id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionedDataset {
    id: String,
    partitions: Vec<PartitionSpec>,
}

impl PartitionedDataset {
    /// Build one partition per entry.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if there are no entries, or if any entry
    /// contains only delimiters and whitespace.
    pub fn build<I, S>(
        entries: I,
        stage_locally: bool,
        deserializer: DeserializerBinding,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut partitions = Vec::new();
        let mut last_raw_path: Option<String> = None;

        for (index, entry) in entries.into_iter().enumerate() {
            let entry = entry.as_ref();
            let (paths, raw_last) = parse_entry(entry).ok_or_else(|| {
                PartitionError::configuration(format!(
                    "grouping entry #{index} contains no file path: {entry:?}"
                ))
            })?;
            last_raw_path = Some(raw_last.to_string());
            partitions.push(PartitionSpec::new(
                format!("{PARTITION_ID_PREFIX}{index}"),
                paths,
                stage_locally,
                deserializer.clone(),
            ));
        }

        let Some(last_raw_path) = last_raw_path else {
            return Err(PartitionError::configuration(
                "grouping input contains no entries",
            ));
        };

        let id = dataset_id(&last_raw_path);
        debug!(
            dataset_id = %id,
            partitions = partitions.len(),
            stage_locally,
            deserializer = %deserializer,
            "built dataset"
        );
        Ok(Self { id, partitions })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    #[must_use]
    pub fn partitions(&self) -> &[PartitionSpec] {
        &self.partitions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PartitionSpec> {
        self.partitions.iter()
    }

    /// Hand the specs off; they outlive the dataset once serialized.
    #[must_use]
    pub fn into_partitions(self) -> Vec<PartitionSpec> {
        self.partitions
    }
}

impl<'a> IntoIterator for &'a PartitionedDataset {
    type Item = &'a PartitionSpec;
    type IntoIter = std::slice::Iter<'a, PartitionSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.iter()
    }
}

impl IntoIterator for PartitionedDataset {
    type Item = PartitionSpec;
    type IntoIter = std::vec::IntoIter<PartitionSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.into_iter()
    }
}

/// Split one entry into its trimmed path set, plus the raw (untrimmed) text of
/// its final usable path. `None` if the entry has no usable path.
fn parse_entry(entry: &str) -> Option<(BTreeSet<String>, &str)> {
    let mut paths = BTreeSet::new();
    let mut raw_last = None;
    for raw in entry.split(PATH_DELIMITER) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        paths.insert(trimmed.to_string());
        raw_last = Some(raw);
    }
    raw_last.map(|raw| (paths, raw))
}

/// Trailing component of `path`, treating any run of `/` or `\` as one separator.
#[must_use]
pub fn basename(path: &str) -> &str {
    path.split(PATH_SEPARATORS)
        .filter(|part| !part.is_empty())
        .last()
        .unwrap_or("")
}

/// Dataset id for a dataset whose final entry ends with `last_path`.
#[must_use]
pub fn dataset_id(last_path: &str) -> String {
    format!("{DATASET_ID_PREFIX}{}", basename(last_path))
}
