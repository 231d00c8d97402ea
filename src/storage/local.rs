//! Local filesystem backend.

use crate::storage::{ByteStream, StorageAccessor, StorageError, StorageErrorKind, StorageResult};
use std::fs::{self, File};
use std::path::Path;

/// [`StorageAccessor`] over `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StorageAccessor for LocalFileSystem {
    fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(Path::new(path).exists())
    }

    fn copy(&self, source: &str, dest: &str) -> StorageResult<()> {
        let dest_path = Path::new(dest);
        if let Some(parent) = dest_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(dest, &e))?;
        }
        fs::copy(source, dest_path).map_err(|e| StorageError::io(source, &e))?;
        Ok(())
    }

    fn open(&self, path: &str) -> StorageResult<ByteStream> {
        let file = File::open(path).map_err(|e| StorageError::io(path, &e))?;
        Ok(Box::new(file))
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        fs::remove_file(path).map_err(|e| StorageError::io(path, &e))
    }

    fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        let dir_path = Path::new(dir);
        if !dir_path.is_dir() {
            return Err(StorageError::new(
                StorageErrorKind::NotFound,
                format!("Directory {dir} not found"),
            ));
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(dir_path).map_err(|e| StorageError::io(dir, &e))? {
            let entry = entry.map_err(|e| StorageError::io(dir, &e))?;
            let path = entry.path();
            // Only include actual files, not directories
            if path.is_file() {
                files.push(path.to_string_lossy().into_owned());
            }
        }

        files.sort();
        Ok(files)
    }
}
