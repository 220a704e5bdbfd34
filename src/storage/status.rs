//! Listing status tracking and persistence.
//!
//! Saves are serialized and the snapshot is taken under the save lock, so the
//! file on disk never moves backwards.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::storage::{version, PackageStatusProvider, StorageError};

/// Thread-safe listed/unlisted map. Unknown packages count as listed.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusProvider {
    /// `lower id/normalized version` → listed.
    inner: Arc<DashMap<String, bool>>,
    persistence_path: Option<PathBuf>,
    save_lock: Arc<Mutex<()>>,
}

fn key(id: &str, package_version: &str) -> String {
    format!("{}/{}", id.to_lowercase(), version::normalize(package_version))
}

impl MemoryStatusProvider {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load from file if it exists; later changes are saved back to it.
    pub fn load_from_file(path: &Path) -> std::io::Result<Self> {
        let provider = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<String, bool> = serde_json::from_reader(reader)?;
            for (k, v) in map {
                provider.inner.insert(k, v);
            }
            tracing::info!(entries = provider.inner.len(), path = ?path, "Loaded package status file");
        }
        Ok(provider)
    }

    fn snapshot(&self) -> HashMap<String, bool> {
        self.inner.iter().map(|r| (r.key().clone(), *r.value())).collect()
    }

    /// Save to the persistence file, if configured.
    pub fn save_to_file(&self) -> std::io::Result<()> {
        match &self.persistence_path {
            Some(path) => write_snapshot(path, &self.snapshot()),
            None => Ok(()),
        }
    }

    pub fn unlisted_count(&self) -> usize {
        self.inner.iter().filter(|r| !*r.value()).count()
    }
}

/// Replace `path` with `map` via a uniquely named temporary file beside it.
fn write_snapshot(path: &Path, map: &HashMap<String, bool>) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        serde_json::to_writer(&mut writer, map)?;
        writer.flush()?;
    }
    staged.persist(path).map_err(|e| e.error)?;
    tracing::debug!(entries = map.len(), "Saved package status file");
    Ok(())
}

#[async_trait]
impl PackageStatusProvider for MemoryStatusProvider {
    async fn is_listed(&self, id: &str, version: &str) -> Result<bool, StorageError> {
        Ok(self.inner.get(&key(id, version)).map(|r| *r.value()).unwrap_or(true))
    }

    async fn set_listed(&self, id: &str, version: &str, listed: bool) -> Result<(), StorageError> {
        self.inner.insert(key(id, version), listed);
        tracing::info!(id, version, listed, "Package listing changed");

        if let Some(path) = self.persistence_path.clone() {
            let _guard = self.save_lock.lock().await;
            let snapshot = self.snapshot();
            tokio::task::spawn_blocking(move || write_snapshot(&path, &snapshot)).await??;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_listed_and_toggle() {
        let status = MemoryStatusProvider::new(None);
        assert!(status.is_listed("Foo", "1.0.0").await.unwrap());
        status.set_listed("Foo", "1.0.0", false).await.unwrap();
        assert!(!status.is_listed("foo", "1.0.0+meta").await.unwrap());
        assert_eq!(status.unlisted_count(), 1);
        status.set_listed("FOO", "1.0.0", true).await.unwrap();
        assert!(status.is_listed("Foo", "1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        let status = MemoryStatusProvider::load_from_file(&path).unwrap();
        status.set_listed("Foo", "1.0.0", false).await.unwrap();

        let reloaded = MemoryStatusProvider::load_from_file(&path).unwrap();
        assert!(!reloaded.is_listed("Foo", "1.0.0").await.unwrap());
        assert!(reloaded.is_listed("Bar", "1.0.0").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_changes_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let status = MemoryStatusProvider::load_from_file(&path).unwrap();

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let status = status.clone();
                tokio::spawn(async move { status.set_listed("Foo", &format!("1.0.{}", i), false).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reloaded = MemoryStatusProvider::load_from_file(&path).unwrap();
        assert_eq!(reloaded.unlisted_count(), 64);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_save_without_path_is_noop() {
        let status = MemoryStatusProvider::new(None);
        status.save_to_file().unwrap();
    }
}
