//! Test fixtures backed by temporary directories.
//!
//! Used by this crate's integration tests and available to downstream crates
//! that want to exercise their own deserializers against real files.
//!
//! ```
//! use ironpart::testing::TestFiles;
//!
//! let files = TestFiles::new()?;
//! let path = files.write("nested/data.bin", b"abc")?;
//! assert_eq!(std::fs::read(&path)?, b"abc");
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory of test files, deleted on drop.
pub struct TestFiles {
    dir: TempDir,
}

impl TestFiles {
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().context("create test directory")?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `name` inside the directory, as a string. The file need
    /// not exist.
    #[must_use]
    pub fn file_path(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }

    /// Write `contents` to `name` (creating subdirectories) and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, name: &str, contents: &[u8]) -> Result<String> {
        let path = self.dir.path().join(name);
        write_test_file(&path, contents)?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Write `lines`, each followed by `\n`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_lines(&self, name: &str, lines: &[&str]) -> Result<String> {
        let mut contents = String::new();
        for line in lines {
            contents.push_str(line);
            contents.push('\n');
        }
        self.write(name, contents.as_bytes())
    }

    /// Create an empty subdirectory and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("create test directory {}", path.display()))?;
        Ok(path)
    }
}

/// Write `contents` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if a directory or the file cannot be written.
pub fn write_test_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("write test file {}", path.display()))
}

/// Gzip `contents` into a byte vector.
///
/// # Errors
///
/// Returns an error if compression fails.
#[cfg(feature = "compression-gzip")]
pub fn gzip(contents: &[u8]) -> Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(contents).context("gzip test data")?;
    encoder.finish().context("finish gzip stream")
}
