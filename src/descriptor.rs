//! Versioned partition descriptors: the blob that travels from the control node
//! to a worker.
//!
//! A [`PartitionConfiguration`] carries everything needed to rebuild a partition
//! in another process: id, file paths, staging flag, deserializer binding and an
//! optional staging root. Two carriers are provided:
//!
//! - JSON ([`PartitionConfiguration::to_json`] / [`PartitionConfiguration::from_json`])
//! - a compact binary envelope with a SHA-256 checksum
//!   ([`PartitionConfiguration::to_bytes`] / [`PartitionConfiguration::from_bytes`]),
//!   behind the `binary-descriptors` feature
//!
//! The enum is externally tagged by version so that older workers reject newer
//! blobs with a `Configuration` error instead of misreading them.

use crate::dataset::{PartitionSpec, PartitionedDataset};
use crate::error::{PartitionError, Result};
use crate::registry::DeserializerBinding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[cfg(feature = "binary-descriptors")]
use sha2::{Digest, Sha256};

/// Serializable, versioned description of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionConfiguration {
    #[serde(rename = "v1")]
    V1(PartitionConfigV1),
}

/// Version 1 descriptor fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfigV1 {
    pub id: String,
    pub file_paths: Vec<String>,
    pub stage_locally: bool,
    pub deserializer: DeserializerBinding,
    /// Staging root chosen on the control node; overrides the worker's.
    #[serde(default)]
    pub temp_folder: Option<PathBuf>,
}

impl PartitionSpec {
    /// Descriptor for this partition, with no staging root of its own.
    #[must_use]
    pub fn to_configuration(&self) -> PartitionConfiguration {
        PartitionConfiguration::V1(PartitionConfigV1 {
            id: self.id().to_string(),
            file_paths: self.file_paths().iter().cloned().collect(),
            stage_locally: self.stage_locally(),
            deserializer: self.deserializer().clone(),
            temp_folder: None,
        })
    }
}

impl PartitionedDataset {
    /// One descriptor per partition, in partition order.
    #[must_use]
    pub fn configurations(&self) -> Vec<PartitionConfiguration> {
        self.iter().map(PartitionSpec::to_configuration).collect()
    }

    /// Same as [`configurations`](Self::configurations), built on the rayon pool.
    #[cfg(feature = "parallel")]
    #[must_use]
    pub fn configurations_par(&self) -> Vec<PartitionConfiguration> {
        use rayon::prelude::*;
        self.partitions()
            .par_iter()
            .map(PartitionSpec::to_configuration)
            .collect()
    }
}

impl PartitionConfiguration {
    fn v1(&self) -> &PartitionConfigV1 {
        match self {
            Self::V1(v1) => v1,
        }
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        match self {
            Self::V1(_) => 1,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.v1().id
    }

    #[must_use]
    pub fn file_paths(&self) -> &[String] {
        &self.v1().file_paths
    }

    #[must_use]
    pub fn stage_locally(&self) -> bool {
        self.v1().stage_locally
    }

    #[must_use]
    pub fn deserializer(&self) -> &DeserializerBinding {
        &self.v1().deserializer
    }

    #[must_use]
    pub fn temp_folder(&self) -> Option<&Path> {
        self.v1().temp_folder.as_deref()
    }

    /// Pin the staging root into the descriptor itself.
    #[must_use]
    pub fn with_temp_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        match &mut self {
            Self::V1(v1) => v1.temp_folder = Some(folder.into()),
        }
        self
    }

    /// Reject descriptors that could not have come from a valid dataset.
    fn validate(self) -> Result<Self> {
        let v1 = self.v1();
        if v1.id.trim().is_empty() {
            return Err(PartitionError::configuration("descriptor has an empty id"));
        }
        if v1.file_paths.iter().all(|p| p.trim().is_empty()) {
            return Err(PartitionError::configuration(format!(
                "descriptor {} names no file path",
                v1.id
            )));
        }
        if v1.deserializer.name.trim().is_empty() {
            return Err(PartitionError::configuration(format!(
                "descriptor {} has no deserializer binding",
                v1.id
            )));
        }
        Ok(self)
    }

    /// Path set as the worker reads it: trimmed, deduplicated, sorted.
    pub(crate) fn path_set(&self) -> BTreeSet<String> {
        self.file_paths()
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            PartitionError::configuration("cannot encode descriptor as JSON").with_source(e)
        })
    }

    /// Decode a JSON descriptor.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the blob is malformed, names an
    /// unknown version, or is missing its id or file paths.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            PartitionError::configuration("malformed JSON descriptor").with_source(e)
        })?;
        config.validate()
    }

    /// Encode as a checksummed binary envelope.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if serialization fails.
    #[cfg(feature = "binary-descriptors")]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = postcard::to_allocvec(self).map_err(|e| {
            PartitionError::configuration("cannot encode descriptor").with_source(e)
        })?;
        let envelope = Envelope {
            magic: ENVELOPE_MAGIC,
            checksum: compute_checksum(&payload),
            payload,
        };
        postcard::to_allocvec(&envelope).map_err(|e| {
            PartitionError::configuration("cannot encode descriptor envelope").with_source(e)
        })
    }

    /// Decode a binary envelope produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the envelope is truncated or foreign,
    /// the checksum does not match, or the payload is not a valid descriptor.
    #[cfg(feature = "binary-descriptors")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope = postcard::from_bytes(bytes).map_err(|e| {
            PartitionError::configuration("malformed binary descriptor").with_source(e)
        })?;
        if envelope.magic != ENVELOPE_MAGIC {
            return Err(PartitionError::configuration(
                "binary descriptor has an unknown envelope tag",
            ));
        }
        if compute_checksum(&envelope.payload) != envelope.checksum {
            return Err(PartitionError::configuration(
                "binary descriptor integrity check failed: checksum mismatch",
            ));
        }
        let config: Self = postcard::from_bytes(&envelope.payload).map_err(|e| {
            PartitionError::configuration("malformed descriptor payload").with_source(e)
        })?;
        config.validate()
    }
}

#[cfg(feature = "binary-descriptors")]
const ENVELOPE_MAGIC: [u8; 4] = *b"IPD1";

#[cfg(feature = "binary-descriptors")]
#[derive(Serialize, Deserialize)]
struct Envelope {
    magic: [u8; 4],
    checksum: String,
    payload: Vec<u8>,
}

/// Hex-encoded SHA-256 of `data`.
#[cfg(feature = "binary-descriptors")]
#[must_use]
pub fn compute_checksum(data: &[u8]) -> String {
    use std::fmt::Write;

    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().iter().fold(String::new(), |mut hex, byte| {
        let _ = write!(hex, "{byte:02x}");
        hex
    })
}
