//! Durable key → bytes stores for resume checkpoints.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Records older than this are treated as absent by [`FileRecorder`].
pub const DEFAULT_RECORD_MAX_AGE: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Errors from recorder operations.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persists resume checkpoints under caller-chosen keys.
///
/// `get` is best effort: any failure reads as "no record".
pub trait Recorder: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn set(&self, key: &str, data: &[u8]) -> Result<(), RecorderError>;

    fn del(&self, key: &str) -> Result<(), RecorderError>;
}

/// Default recorder key for a file: destination key, absolute path and size.
pub fn recorder_key(key: Option<&str>, path: &Path, size: u64) -> String {
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("{}_._{}_._{size}", key.unwrap_or(""), path.display())
}

// ---------------------------------------------------------------------------
// MemoryRecorder
// ---------------------------------------------------------------------------

/// In-process recorder. Checkpoints die with the process.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Recorder for MemoryRecorder {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, data: &[u8]) -> Result<(), RecorderError> {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn del(&self, key: &str) -> Result<(), RecorderError> {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileRecorder
// ---------------------------------------------------------------------------

/// Stores one file per key under a directory.
///
/// File names are the hex SHA-256 of the key, so arbitrary keys (paths,
/// URLs) map to safe names.
#[derive(Debug, Clone)]
pub struct FileRecorder {
    dir: PathBuf,
    max_age: Duration,
}

impl FileRecorder {
    /// Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RecorderError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_age: DEFAULT_RECORD_MAX_AGE,
        })
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(hex::encode(Sha256::digest(key.as_bytes())))
    }

    fn is_expired(&self, path: &Path) -> bool {
        let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => return false,
        };
        SystemTime::now()
            .duration_since(modified)
            .is_ok_and(|age| age > self.max_age)
    }
}

impl Recorder for FileRecorder {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }
        if self.is_expired(&path) {
            debug!(path = %path.display(), "discarding expired record");
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove expired record");
            }
            return None;
        }
        match std::fs::read(&path) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read record");
                None
            }
        }
    }

    fn set(&self, key: &str, data: &[u8]) -> Result<(), RecorderError> {
        let path = self.path_for(key);
        // Write-then-rename so a crash never leaves a torn checkpoint.
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn del(&self, key: &str) -> Result<(), RecorderError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_recorder() -> (tempfile::TempDir, FileRecorder) {
        let tmp = tempfile::tempdir().unwrap();
        let recorder = FileRecorder::new(tmp.path().join("records")).unwrap();
        (tmp, recorder)
    }

    #[test]
    fn memory_set_get_del() {
        let rec = MemoryRecorder::new();
        assert!(rec.is_empty());
        rec.set("k", b"v1").unwrap();
        rec.set("k", b"v2").unwrap();
        assert_eq!(rec.get("k").unwrap(), b"v2");
        assert_eq!(rec.len(), 1);
        rec.del("k").unwrap();
        assert!(rec.get("k").is_none());
        rec.del("k").unwrap();
    }

    #[test]
    fn file_set_get_del() {
        let (_tmp, rec) = test_recorder();
        assert!(rec.get("a/b/c.bin").is_none());
        rec.set("a/b/c.bin", b"{}").unwrap();
        assert_eq!(rec.get("a/b/c.bin").unwrap(), b"{}");
        rec.del("a/b/c.bin").unwrap();
        assert!(rec.get("a/b/c.bin").is_none());
    }

    #[test]
    fn file_del_missing_is_ok() {
        let (_tmp, rec) = test_recorder();
        rec.del("never-written").unwrap();
    }

    #[test]
    fn file_records_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("records");
        {
            let rec = FileRecorder::new(&dir).unwrap();
            rec.set("k1", b"one").unwrap();
            rec.set("k2", b"two").unwrap();
        }
        let rec = FileRecorder::new(&dir).unwrap();
        assert_eq!(rec.get("k1").unwrap(), b"one");
        assert_eq!(rec.get("k2").unwrap(), b"two");
    }

    #[test]
    fn file_names_are_hashed() {
        let (_tmp, rec) = test_recorder();
        rec.set("../../escape", b"x").unwrap();
        let names: Vec<_> = std::fs::read_dir(rec.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].len(), 64);
    }

    #[test]
    fn expired_records_are_dropped() {
        let (_tmp, rec) = test_recorder();
        let rec = rec.with_max_age(Duration::ZERO);
        rec.set("old", b"x").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(rec.get("old").is_none());
        assert!(std::fs::read_dir(rec.dir()).unwrap().next().is_none());
    }

    #[test]
    fn recorder_key_includes_size_and_path() {
        let k1 = recorder_key(Some("obj"), Path::new("/data/a.bin"), 10);
        let k2 = recorder_key(Some("obj"), Path::new("/data/a.bin"), 11);
        let k3 = recorder_key(None, Path::new("/data/b.bin"), 10);
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
        assert!(k1.starts_with("obj_._"));
        assert!(k1.contains("a.bin"));
    }
}
