//! Durable storage of output artifacts, keyed by file name.

use crate::coordination::{broadcast_with, Coordinator};
use crate::error::{JobError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub trait ArtifactStore: Send + Sync {
    fn write(&self, name: &str, bytes: &[u8]) -> Result<()>;
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>>;

    fn exists(&self, name: &str) -> bool {
        matches!(self.read(name), Ok(Some(_)))
    }
}

/// Artifacts as files below a root directory.
///
/// Each write goes to a hidden sibling first and is renamed into place, so a
/// reader never observes a half-written artifact.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryStore { root: root.into() }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn artifact_error(name: &str, source: io::Error) -> JobError {
    JobError::Artifact {
        name: name.to_string(),
        source,
    }
}

impl ArtifactStore for DirectoryStore {
    fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(name);
        let file_name = path
            .file_name()
            .ok_or_else(|| artifact_error(name, io::Error::other("not a file name")))?
            .to_string_lossy()
            .into_owned();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| artifact_error(name, e))?;
        }

        let partial = path.with_file_name(format!(".{file_name}.partial"));
        fs::write(&partial, bytes).map_err(|e| artifact_error(name, e))?;
        fs::rename(&partial, &path).map_err(|e| artifact_error(name, e))?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(artifact_error(name, e)),
        }
    }
}

/// Artifacts kept in memory; remembers the order in which names were written.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<'a, T>(name: &str, mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
        mutex
            .lock()
            .map_err(|_| artifact_error(name, io::Error::other("store lock poisoned")))
    }

    /// Every write in call order, repeated names included.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn json(&self, name: &str) -> Option<serde_json::Value> {
        let bytes = self.read(name).ok()??;
        serde_json::from_slice(&bytes).ok()
    }
}

impl ArtifactStore for MemoryStore {
    fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        Self::lock(name, &self.files)?.insert(name.to_string(), bytes.to_vec());
        Self::lock(name, &self.writes)?.push(name.to_string());
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(Self::lock(name, &self.files)?.get(name).cloned())
    }
}

/// Serializes `value` as JSON and writes it, on the coordinator only.
///
/// Returns whether this process performed the write.
pub fn store_json<T: Serialize + ?Sized>(
    coordinator: &dyn Coordinator,
    store: &dyn ArtifactStore,
    name: &str,
    value: &T,
) -> Result<bool> {
    if !coordinator.is_coordinator() {
        return Ok(false);
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    coordinator.write_shared_artifact(store, name, &bytes)
}

/// Like [`store_json`], but every rank learns whether the write succeeded.
pub fn publish_json<T: Serialize + ?Sized>(
    coordinator: &dyn Coordinator,
    store: &dyn ArtifactStore,
    name: &str,
    value: &T,
) -> Result<()> {
    broadcast_with(coordinator, || {
        store_json(coordinator, store, name, value).map(|_| ())
    })
}

pub fn load_json<T: DeserializeOwned>(store: &dyn ArtifactStore, name: &str) -> Result<Option<T>> {
    match store.read(name)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::SingleProcess;
    use serde_json::json;

    #[test]
    fn directory_store_round_trips_and_leaves_no_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());

        store.write("nested/out.json", b"{\"a\":1}").unwrap();
        assert_eq!(store.read("nested/out.json").unwrap().unwrap(), b"{\"a\":1}");
        assert!(store.exists("nested/out.json"));

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["out.json".to_string()]);
    }

    #[test]
    fn missing_artifact_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(store.read("absent.json").unwrap().is_none());
        assert!(!store.exists("absent.json"));
    }

    #[test]
    fn memory_store_tracks_write_order() {
        let store = MemoryStore::new();
        store.write("b", b"1").unwrap();
        store.write("a", b"2").unwrap();
        store.write("b", b"3").unwrap();
        assert_eq!(store.writes(), vec!["b", "a", "b"]);
        assert_eq!(store.read("b").unwrap().unwrap(), b"3");
    }

    #[test]
    fn json_helpers_round_trip() {
        let store = MemoryStore::new();
        let written = store_json(&SingleProcess, &store, "status.json", &json!({"converged": true})).unwrap();
        assert!(written);

        let value: serde_json::Value = load_json(&store, "status.json").unwrap().unwrap();
        assert_eq!(value["converged"], true);
        assert!(load_json::<serde_json::Value>(&store, "other.json").unwrap().is_none());
    }
}
