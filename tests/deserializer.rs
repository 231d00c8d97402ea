//! Integration tests for record deserializers and the directory adapter.

use anyhow::Result;
use ironpart::storage::{ByteStream, StorageResult};
use ironpart::testing::TestFiles;
use ironpart::*;
use serde::Deserialize;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn local() -> Arc<dyn StorageAccessor> {
    Arc::new(LocalFileSystem::new())
}

/// Tracks how many streams are opened and how many are alive at once.
#[derive(Default)]
struct Tracker {
    opened: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

struct TrackedStream {
    inner: ByteStream,
    tracker: Arc<Tracker>,
}

impl Read for TrackedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct TrackingAccessor {
    tracker: Arc<Tracker>,
}

impl StorageAccessor for TrackingAccessor {
    fn exists(&self, path: &str) -> StorageResult<bool> {
        LocalFileSystem.exists(path)
    }

    fn copy(&self, source: &str, dest: &str) -> StorageResult<()> {
        LocalFileSystem.copy(source, dest)
    }

    fn open(&self, path: &str) -> StorageResult<ByteStream> {
        let inner = LocalFileSystem.open(path)?;
        self.tracker.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.tracker.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(TrackedStream {
            inner,
            tracker: Arc::clone(&self.tracker),
        }))
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        LocalFileSystem.delete(path)
    }

    fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        LocalFileSystem.list(dir)
    }
}

#[test]
fn test_nothing_is_opened_before_first_advance() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[1, 2])?;
    let b = files.write("b.bin", &[3])?;
    let tracker = Arc::new(Tracker::default());
    let storage = Arc::new(TrackingAccessor {
        tracker: Arc::clone(&tracker),
    });

    let mut records = ByteDeserializer.deserialize(vec![a, b], storage);
    assert_eq!(tracker.opened.load(Ordering::SeqCst), 0);

    assert_eq!(records.next().transpose()?, Some(1));
    assert_eq!(tracker.opened.load(Ordering::SeqCst), 1);

    let rest = records.collect::<ironpart::Result<Vec<u8>>>()?;
    assert_eq!(rest, vec![2, 3]);
    assert_eq!(tracker.opened.load(Ordering::SeqCst), 2);
    assert_eq!(tracker.max_live.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.live.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_missing_file_fails_only_when_reached() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.bin", &[7, 8])?;
    let missing = files.file_path("zz-missing.bin");

    let mut records = ByteDeserializer.deserialize(vec![a, missing], local());
    assert_eq!(records.next().transpose()?, Some(7));
    assert_eq!(records.next().transpose()?, Some(8));

    let err = records
        .next()
        .and_then(|r| r.err())
        .ok_or_else(|| anyhow::anyhow!("expected a read error"))?;
    assert!(err.is_read(), "{err}");
    assert!(err.message.contains("zz-missing.bin"));
    assert!(records.next().is_none());
    Ok(())
}

/// Serves a stream that returns two bytes and then fails.
struct FlakyAccessor;

struct FlakyStream {
    served: usize,
}

impl Read for FlakyStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.served >= 2 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let n = buf.len().min(2 - self.served);
        buf[..n].fill(0xAB);
        self.served += n;
        Ok(n)
    }
}

impl StorageAccessor for FlakyAccessor {
    fn exists(&self, _path: &str) -> StorageResult<bool> {
        Ok(true)
    }

    fn copy(&self, source: &str, _dest: &str) -> StorageResult<()> {
        Err(StorageError::new(StorageErrorKind::Io, format!("{source}: unsupported")))
    }

    fn open(&self, _path: &str) -> StorageResult<ByteStream> {
        Ok(Box::new(FlakyStream { served: 0 }))
    }

    fn delete(&self, _path: &str) -> StorageResult<()> {
        Ok(())
    }

    fn list(&self, _dir: &str) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_mid_stream_failure_keeps_yielded_records() {
    let mut records = RowDeserializer.deserialize(
        vec!["remote/a.bin".to_string(), "remote/b.bin".to_string()],
        Arc::new(FlakyAccessor),
    );

    let mut yielded = Vec::new();
    let mut errors = Vec::new();
    for record in records.by_ref() {
        match record {
            Ok(row) => yielded.push(row),
            Err(err) => errors.push(err),
        }
    }

    assert_eq!(yielded, vec![Row(0xAB), Row(0xAB)]);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_read());
    assert!(errors[0].to_string().contains("connection reset"));
    assert!(records.next().is_none());
}

#[test]
fn test_empty_file_set_yields_nothing() {
    let mut records = ByteDeserializer.deserialize(Vec::new(), local());
    assert!(records.next().is_none());
}

#[test]
fn test_directory_adapter_reads_every_file() -> Result<()> {
    let files = TestFiles::new()?;
    files.write("dir/a.bin", &[1, 2, 3])?;
    files.write("dir/b.bin", &[4, 5])?;
    files.write("dir/nested/ignored.bin", &[9, 9, 9])?;

    let adapter = DirectoryAdapter::new(ByteDeserializer);
    assert_eq!(adapter.inner().name(), "bytes");

    let dir = files.file_path("dir");
    let records = adapter.deserialize_directory(&dir, local())?;
    let bytes = records.collect::<ironpart::Result<Vec<u8>>>()?;
    assert_eq!(bytes, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[test]
fn test_directory_adapter_missing_directory() -> Result<()> {
    let files = TestFiles::new()?;
    let adapter = DirectoryAdapter::new(RowDeserializer);

    let err = adapter
        .deserialize_directory(&files.file_path("nope"), local())
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert!(err.is_not_found(), "{err}");
    Ok(())
}

#[test]
fn test_line_deserializer_skips_blank_lines() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write("a.txt", b"alpha\r\n\n  \nbeta\n")?;
    let b = files.write("b.txt", b"gamma")?;

    let lines = LineDeserializer
        .deserialize(vec![a, b], local())
        .collect::<ironpart::Result<Vec<String>>>()?;
    assert_eq!(lines, vec!["alpha", "beta", "gamma"]);
    Ok(())
}

#[derive(Debug, PartialEq, Deserialize)]
struct Event {
    id: u32,
    kind: String,
}

#[test]
fn test_json_lines_deserializer() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write_lines(
        "events.jsonl",
        &[r#"{"id": 1, "kind": "open"}"#, "", r#"{"id": 2, "kind": "close"}"#],
    )?;

    let events = JsonLinesDeserializer::<Event>::new()
        .deserialize(vec![a], local())
        .collect::<ironpart::Result<Vec<Event>>>()?;
    assert_eq!(
        events,
        vec![
            Event { id: 1, kind: "open".to_string() },
            Event { id: 2, kind: "close".to_string() },
        ]
    );
    Ok(())
}

#[test]
fn test_json_lines_reports_bad_line() -> Result<()> {
    let files = TestFiles::new()?;
    let a = files.write_lines("bad.jsonl", &[r#"{"id": 1, "kind": "open"}"#, "{not json"])?;

    let results: Vec<_> = JsonLinesDeserializer::<Event>::new()
        .deserialize(vec![a], local())
        .collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    let err = results[1]
        .as_ref()
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected a parse error"))?;
    assert!(err.is_read());
    assert!(err.to_string().contains("line 2"), "{err}");
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_gzip_lines_are_decompressed() -> Result<()> {
    let files = TestFiles::new()?;
    let plain = files.write("a.txt", b"one\ntwo\n")?;
    let packed = files.write("b.txt.gz", &ironpart::testing::gzip(b"three\nfour\n")?)?;

    let lines = LineDeserializer
        .deserialize(vec![plain, packed], local())
        .collect::<ironpart::Result<Vec<String>>>()?;
    assert_eq!(lines, vec!["one", "two", "three", "four"]);
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_gzip_detected_by_magic_bytes() -> Result<()> {
    let files = TestFiles::new()?;
    let packed = files.write("no-extension", &ironpart::testing::gzip(b"hidden\n")?)?;

    let lines = LineDeserializer
        .deserialize(vec![packed], local())
        .collect::<ironpart::Result<Vec<String>>>()?;
    assert_eq!(lines, vec!["hidden"]);
    Ok(())
}

#[test]
fn test_registry_resolution() -> Result<()> {
    let mut registry = DeserializerRegistry::<String>::with_builtins();
    assert_eq!(registry.names(), vec!["lines"]);
    assert!(registry.resolve(&DeserializerBinding::json_lines()).is_err());

    registry.register_json_lines();
    assert!(registry.contains("jsonl"));
    assert_eq!(registry.resolve(&DeserializerBinding::lines())?.name(), "lines");
    Ok(())
}

#[test]
fn test_registry_factory_sees_params() -> Result<()> {
    let seen = Arc::new(Mutex::new(None));
    let mut registry = DeserializerRegistry::<u8>::new();
    let captured = Arc::clone(&seen);
    registry.register("bytes", move |binding| {
        if let Ok(mut slot) = captured.lock() {
            *slot = binding.param("buffer").map(str::to_string);
        }
        Ok(Arc::new(ByteDeserializer) as Arc<dyn RecordDeserializer<u8>>)
    });

    let binding = DeserializerBinding::bytes().with_param("buffer", "64k");
    let deserializer = registry.resolve(&binding)?;
    assert_eq!(deserializer.name(), "bytes");
    assert_eq!(seen.lock().ok().and_then(|s| s.clone()), Some("64k".to_string()));
    Ok(())
}
