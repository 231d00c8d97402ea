//! Build grouping entries from a directory layout.
//!
//! These helpers read the filesystem, unlike [`PartitionedDataset::build`],
//! which never does. Use them on the control node to produce the entries and
//! hand the result to `build`.
//!
//! ```no_run
//! use ironpart::discovery::entries_from_glob_grouped;
//! use ironpart::{DeserializerBinding, PartitionedDataset};
//!
//! let entries = entries_from_glob_grouped("data/day=*/*.bin", 4)?;
//! let dataset = PartitionedDataset::build(&entries, true, DeserializerBinding::bytes())?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! [`PartitionedDataset::build`]: crate::PartitionedDataset::build

use crate::dataset::PATH_DELIMITER;
use anyhow::{Context, Result, bail};
use glob::glob;

/// Regular files matching `pattern`, sorted.
fn matching_files(pattern: &str) -> Result<Vec<String>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut files = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if !path.is_file() {
            continue;
        }
        let Some(path) = path.to_str() else {
            bail!("non UTF-8 path matched {pattern}: {}", path.display());
        };
        files.push(path.to_string());
    }
    files.sort();
    Ok(files)
}

/// One grouping entry per file matching `pattern`.
///
/// # Errors
///
/// Returns an error if the pattern is invalid, a match cannot be read or is
/// not valid UTF-8, or nothing matches.
pub fn entries_from_glob(pattern: &str) -> Result<Vec<String>> {
    entries_from_glob_grouped(pattern, 1)
}

/// Chunk the files matching `pattern` into entries of at most
/// `files_per_partition` consecutive files each.
///
/// # Errors
///
/// Returns an error if `files_per_partition` is zero, or under the same
/// conditions as [`entries_from_glob`].
pub fn entries_from_glob_grouped(pattern: &str, files_per_partition: usize) -> Result<Vec<String>> {
    if files_per_partition == 0 {
        bail!("files_per_partition must be at least 1");
    }
    let files = matching_files(pattern)?;
    if files.is_empty() {
        bail!("no files found matching pattern: {pattern}");
    }
    let delimiter = PATH_DELIMITER.to_string();
    Ok(files
        .chunks(files_per_partition)
        .map(|chunk| chunk.join(&delimiter))
        .collect())
}
