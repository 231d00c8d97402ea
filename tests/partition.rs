//! Integration tests for worker-side partitions: reading, staging and cleanup.

use anyhow::Result;
use ironpart::storage::{
    ByteStream, InMemoryObjectStore, ObjectStore, ObjectStoreAccessor, StorageResult,
};
use ironpart::testing::TestFiles;
use ironpart::*;
use std::path::Path;
use std::sync::Arc;

fn byte_context() -> WorkerContext<u8> {
    WorkerContext::local(DeserializerRegistry::with_builtins())
}

fn read_all<T>(reader: PartitionReader<T>) -> Result<Vec<T>> {
    Ok(reader.collect::<ironpart::Result<Vec<T>>>()?)
}

#[test]
fn test_single_file_entries_yield_their_bytes() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[1, 2, 3])?;
    let b = files.write("b.bin", &[4, 5, 6, 7])?;

    let dataset = PartitionedDataset::build([&a, &b], false, DeserializerBinding::bytes())?;
    assert_eq!(dataset.len(), 2);

    let context = byte_context();
    let counts = dataset
        .iter()
        .map(|spec| Partition::from_spec(spec, &context)?.count())
        .collect::<ironpart::Result<Vec<_>>>()?;
    assert_eq!(counts, vec![3, 4]);
    Ok(())
}

#[test]
fn test_combined_entry_yields_all_bytes_in_path_order() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[1, 2, 3])?;
    let b = files.write("b.bin", &[4, 5, 6, 7])?;

    // Order within the entry does not matter; paths are read sorted.
    let dataset =
        PartitionedDataset::build([format!("{b};{a}")], false, DeserializerBinding::bytes())?;
    assert_eq!(dataset.len(), 1);

    let partition = Partition::from_spec(&dataset.partitions()[0], &byte_context())?;
    assert_eq!(partition.id(), "FileSystemInputPartition-0");
    assert_eq!(read_all(partition.open()?)?, vec![1, 2, 3, 4, 5, 6, 7]);
    Ok(())
}

#[test]
fn test_row_deserializer() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[10, 20, 30])?;
    let b = files.write("b.bin", &[40, 50])?;

    let dataset =
        PartitionedDataset::build([format!("{a};{b}")], true, DeserializerBinding::rows())?;
    let context = WorkerContext::local(DeserializerRegistry::<Row>::with_builtins());
    let partition = Partition::from_spec(&dataset.partitions()[0], &context)?;

    let rows = read_all(partition.open()?)?;
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], Row(10));
    assert_eq!(rows[4].value(), 50);
    Ok(())
}

#[test]
fn test_staging_creates_and_removes_directory() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("in/a.bin", &[1, 2, 3])?;
    let b = files.write("in/b.bin", &[4, 5, 6, 7])?;
    let root = files.subdir("staging")?;

    let dataset =
        PartitionedDataset::build([format!("{a};{b}")], true, DeserializerBinding::bytes())?;
    let context = byte_context().with_environment(EnvironmentConfig::new().with_temp_folder(&root));
    let partition = Partition::from_spec(&dataset.partitions()[0], &context)?;
    assert_eq!(partition.staging_root(), root.as_path());

    let reader = partition.open()?;
    let staging_dir = reader
        .staging_dir()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("expected a staging directory"))?;
    assert!(staging_dir.is_dir());
    assert_eq!(staging_dir.parent(), Some(root.as_path()));
    assert!(
        staging_dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("FileSystemInputPartition-0-"))
    );
    assert_eq!(std::fs::read_dir(&staging_dir)?.count(), 2);

    assert_eq!(read_all(reader)?.len(), 7);
    assert!(!staging_dir.exists());
    Ok(())
}

#[test]
fn test_staging_with_duplicate_basenames() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("one/data.bin", &[1, 2])?;
    let b = files.write("two/data.bin", &[3])?;

    let dataset =
        PartitionedDataset::build([format!("{a};{b}")], true, DeserializerBinding::bytes())?;
    let context = byte_context()
        .with_environment(EnvironmentConfig::new().with_temp_folder(files.subdir("stage")?));
    let partition = Partition::from_spec(&dataset.partitions()[0], &context)?;
    assert_eq!(read_all(partition.open()?)?, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_unstaged_reader_has_no_staging_dir() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[1])?;
    let dataset = PartitionedDataset::build([a], false, DeserializerBinding::bytes())?;
    let partition = Partition::from_spec(&dataset.partitions()[0], &byte_context())?;

    let reader = partition.open()?;
    assert!(reader.staging_dir().is_none());
    assert_eq!(reader.id(), "FileSystemInputPartition-0");
    Ok(())
}

#[test]
fn test_early_drop_releases_staged_files() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[1, 2, 3, 4, 5])?;
    let root = files.subdir("staging")?;
    let dataset = PartitionedDataset::build([a], true, DeserializerBinding::bytes())?;
    let context = byte_context().with_environment(EnvironmentConfig::new().with_temp_folder(&root));
    let partition = Partition::from_spec(&dataset.partitions()[0], &context)?;

    let mut reader = partition.open()?;
    assert_eq!(reader.next().transpose()?, Some(1));
    let staging_dir = reader.staging_dir().map(Path::to_path_buf);
    drop(reader);

    assert!(staging_dir.is_some_and(|dir| !dir.exists()));
    assert_eq!(std::fs::read_dir(&root)?.count(), 0);
    Ok(())
}

#[test]
fn test_close_reports_cleanup() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[9])?;
    let dataset = PartitionedDataset::build([a], true, DeserializerBinding::bytes())?;
    let context = byte_context()
        .with_environment(EnvironmentConfig::new().with_temp_folder(files.subdir("s")?));
    let partition = Partition::from_spec(&dataset.partitions()[0], &context)?;

    let reader = partition.open()?;
    let staging_dir = reader.staging_dir().map(Path::to_path_buf);
    reader.close()?;
    assert!(staging_dir.is_some_and(|dir| !dir.exists()));
    Ok(())
}

#[test]
fn test_concurrent_readers_get_distinct_staging_dirs() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[1, 2])?;
    let dataset = PartitionedDataset::build([a], true, DeserializerBinding::bytes())?;
    let context = byte_context()
        .with_environment(EnvironmentConfig::new().with_temp_folder(files.subdir("s")?));
    let partition = Partition::from_spec(&dataset.partitions()[0], &context)?;

    let first = partition.open()?;
    let second = partition.open()?;
    assert_ne!(first.staging_dir(), second.staging_dir());
    assert_eq!(read_all(first)?, read_all(second)?);
    Ok(())
}

#[test]
fn test_reopening_yields_same_records() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[5, 3, 5])?;
    let b = files.write("b.bin", &[1])?;
    let dataset =
        PartitionedDataset::build([format!("{a};{b}")], false, DeserializerBinding::bytes())?;
    let partition = Partition::from_spec(&dataset.partitions()[0], &byte_context())?;

    let mut first = read_all(partition.open()?)?;
    let mut second = read_all(partition.open()?)?;
    first.sort_unstable();
    second.sort_unstable();
    assert_eq!(first, second);
    assert_eq!(partition.count()?, 4);
    Ok(())
}

#[test]
fn test_missing_source_is_not_found() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[1])?;
    let missing = files.file_path("missing.bin");

    for stage_locally in [false, true] {
        let dataset = PartitionedDataset::build(
            [format!("{a};{missing}")],
            stage_locally,
            DeserializerBinding::bytes(),
        )?;
        let partition = Partition::from_spec(&dataset.partitions()[0], &byte_context())?;
        let err = partition.open().err().ok_or_else(|| anyhow::anyhow!("open succeeded"))?;
        assert!(err.is_not_found(), "{err}");
        assert!(err.message.contains("missing.bin"));
    }
    Ok(())
}

#[test]
fn test_unknown_binding_is_configuration_error() -> Result<()> {
    let dataset = PartitionedDataset::build(["/a.bin"], false, DeserializerBinding::new("avro"))?;
    let err = Partition::from_spec(&dataset.partitions()[0], &byte_context()).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.message.contains("avro"));
    Ok(())
}

#[test]
fn test_record_type_mismatch_is_configuration_error() -> Result<()> {
    // A "rows" descriptor handed to a worker that consumes bytes.
    let dataset = PartitionedDataset::build(["/a.bin"], false, DeserializerBinding::rows())?;
    let err = Partition::from_spec(&dataset.partitions()[0], &byte_context()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    Ok(())
}

/// Local filesystem whose copies always fail.
struct BrokenCopies;

impl StorageAccessor for BrokenCopies {
    fn exists(&self, path: &str) -> StorageResult<bool> {
        LocalFileSystem.exists(path)
    }

    fn copy(&self, source: &str, _dest: &str) -> StorageResult<()> {
        Err(StorageError::new(
            StorageErrorKind::Io,
            format!("{source}: device full"),
        ))
    }

    fn open(&self, path: &str) -> StorageResult<ByteStream> {
        LocalFileSystem.open(path)
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        LocalFileSystem.delete(path)
    }

    fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        LocalFileSystem.list(dir)
    }
}

#[test]
fn test_staging_copy_failure_is_read_error() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[1, 2])?;
    let root = files.subdir("staging")?;
    let dataset = PartitionedDataset::build([a], true, DeserializerBinding::bytes())?;
    let context = WorkerContext::new(DeserializerRegistry::<u8>::with_builtins(), Arc::new(BrokenCopies))
        .with_environment(EnvironmentConfig::new().with_temp_folder(&root));
    let partition = Partition::from_spec(&dataset.partitions()[0], &context)?;

    let err = partition.open().err().ok_or_else(|| anyhow::anyhow!("open succeeded"))?;
    assert!(err.is_read(), "{err}");
    assert!(err.to_string().contains("device full"));
    // The half-built staging directory is not left behind.
    assert_eq!(std::fs::read_dir(&root)?.count(), 0);
    Ok(())
}

fn object_context(store: &InMemoryObjectStore, staging_root: &Path) -> WorkerContext<u8> {
    let accessor = ObjectStoreAccessor::new(store.clone(), "mem");
    WorkerContext::new(DeserializerRegistry::with_builtins(), Arc::new(accessor))
        .with_environment(EnvironmentConfig::new().with_temp_folder(staging_root))
}

#[test]
fn test_stage_from_object_store() -> Result<()> {
    let files = TestFiles::new()?;
    let store = InMemoryObjectStore::new();
    store.put_object("bucket", "input/a.bin", &[1, 2, 3])?;
    store.put_object("bucket", "input/b.bin", &[4, 5, 6, 7])?;

    let dataset = PartitionedDataset::build(
        ["mem://bucket/input/a.bin;mem://bucket/input/b.bin"],
        true,
        DeserializerBinding::bytes(),
    )?;
    assert_eq!(dataset.id(), "FileSystemDataSet-b.bin");

    let context = object_context(&store, &files.subdir("staging")?);
    let partition = Partition::from_spec(&dataset.partitions()[0], &context)?;
    let reader = partition.open()?;
    let staged: Vec<_> = reader
        .staging_dir()
        .map(std::fs::read_dir)
        .transpose()?
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(staged.len(), 2);
    assert_eq!(read_all(reader)?, vec![1, 2, 3, 4, 5, 6, 7]);
    Ok(())
}

#[test]
fn test_stream_from_object_store_without_staging() -> Result<()> {
    let files = TestFiles::new()?;
    let store = InMemoryObjectStore::new();
    store.put_object("bucket", "a.bin", &[8, 9])?;

    let dataset =
        PartitionedDataset::build(["mem://bucket/a.bin"], false, DeserializerBinding::bytes())?;
    let context = object_context(&store, &files.subdir("staging")?);
    let partition = Partition::from_spec(&dataset.partitions()[0], &context)?;
    assert_eq!(read_all(partition.open()?)?, vec![8, 9]);

    store.delete_object("bucket", "a.bin")?;
    let err = partition.open().err().ok_or_else(|| anyhow::anyhow!("open succeeded"))?;
    assert!(err.is_not_found());
    Ok(())
}
