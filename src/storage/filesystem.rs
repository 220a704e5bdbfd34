//! Filesystem package store.
//!
//! # Layout
//! ```text
//! {root}/{lower id}/{lower version}/{lower id}.{lower version}.nupkg
//! {root}/{lower id}/{lower version}/{lower id}.nuspec
//! ```
//!
//! # Design Decisions
//! - Enumeration walks the tree on every call, so new files show up without restart
//! - Archives found elsewhere under the root are enumerated too
//! - Extracted manifests are cached by archive path and modification time
//! - Writes are staged in uniquely named temporary files beside their targets
//! - The archive name is claimed without overwriting; losing a race is a conflict

use async_trait::async_trait;
use axum::body::Bytes;
use futures_util::stream::{self, StreamExt};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;

use crate::observability::metrics;
use crate::storage::cache::CacheProvider;
use crate::storage::{
    nuspec, version, PackageContent, PackagePublisher, PackageRecord, PackageSource, PackageStream, StorageError,
};

/// Package store rooted at a directory.
pub struct FileSystemStore {
    root: PathBuf,
    cache: Arc<dyn CacheProvider>,
    max_package_size: u64,
}

impl FileSystemStore {
    pub fn new(root: impl Into<PathBuf>, cache: Arc<dyn CacheProvider>, max_package_size: u64) -> Self {
        Self {
            root: root.into(),
            cache,
            max_package_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, id: &str, package_version: &str) -> Option<PathBuf> {
        let lower_id = id.to_lowercase();
        let lower_version = version::normalize(package_version);
        if !nuspec::is_valid_id(&lower_id) || !is_safe_segment(&lower_version) {
            return None;
        }
        Some(self.root.join(lower_id).join(lower_version))
    }

    /// Location of the archive for `id` / `version`; `None` for unsafe input.
    pub fn archive_path(&self, id: &str, package_version: &str) -> Option<PathBuf> {
        let lower_id = id.to_lowercase();
        let lower_version = version::normalize(package_version);
        self.package_dir(id, package_version)
            .map(|dir| dir.join(format!("{}.{}.nupkg", lower_id, lower_version)))
    }

    /// Location of the extracted manifest for `id` / `version`.
    pub fn manifest_path(&self, id: &str, package_version: &str) -> Option<PathBuf> {
        let lower_id = id.to_lowercase();
        self.package_dir(id, package_version)
            .map(|dir| dir.join(format!("{}.nuspec", lower_id)))
    }

    async fn read_record(cache: Arc<dyn CacheProvider>, path: PathBuf) -> Result<PackageRecord, StorageError> {
        let manifest = Self::cached_manifest(&cache, &path).await?;
        nuspec::parse(&manifest, &path)
    }

    /// Manifest bytes of the archive at `path`, via the cache.
    async fn cached_manifest(cache: &Arc<dyn CacheProvider>, path: &Path) -> Result<Bytes, StorageError> {
        let modified = tokio::fs::metadata(path)
            .await?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let key = format!("manifest:{}:{}", path.display(), modified);

        if let Some(hit) = cache.get(&key).await {
            return Ok(hit);
        }

        let archive = tokio::fs::read(path).await?;
        let manifest = Bytes::from(tokio::task::spawn_blocking(move || nuspec::extract(&archive)).await??);
        cache.put(&key, manifest.clone()).await;
        Ok(manifest)
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}

/// Every `*.nupkg` below `root`, sorted for stable enumeration.
fn find_archives(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = ?dir, error = %e, "Skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => pending.push(path),
                Ok(t) if t.is_file() => {
                    let is_archive = path
                        .extension()
                        .map(|e| e.eq_ignore_ascii_case("nupkg"))
                        .unwrap_or(false);
                    if is_archive {
                        found.push(path);
                    }
                }
                _ => {}
            }
        }
    }
    found.sort();
    found
}

/// Write `bytes` to a fresh temporary file in `dir`. Dropping it removes the file.
fn stage(dir: &Path, bytes: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(".staging-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    Ok(file)
}

/// Move staged archive and manifest into place.
///
/// Returns `Ok(false)` when the archive already exists. Staged files that
/// are not persisted are deleted on every exit path.
fn commit_package(
    archive_path: &Path,
    manifest_path: &Path,
    archive: &[u8],
    manifest: &[u8],
) -> std::io::Result<bool> {
    let dir = archive_path
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "archive path has no parent"))?;
    std::fs::create_dir_all(dir)?;
    let staged_archive = stage(dir, archive)?;
    let staged_manifest = stage(dir, manifest)?;

    match staged_archive.persist_noclobber(archive_path) {
        Ok(_) => {}
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.error),
    }
    // Readers fall back to the archive while the manifest is missing.
    staged_manifest.persist(manifest_path).map_err(|e| e.error)?;
    Ok(true)
}

async fn read_optional(path: &Path) -> Result<Option<Bytes>, StorageError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(Bytes::from(bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl PackageSource for FileSystemStore {
    async fn packages(&self) -> Result<PackageStream, StorageError> {
        let root = self.root.clone();
        if !tokio::fs::try_exists(&root).await? {
            return Ok(stream::empty().boxed());
        }
        let paths = tokio::task::spawn_blocking(move || find_archives(&root)).await?;
        tracing::debug!(count = paths.len(), root = ?self.root, "Enumerating packages");

        let cache = self.cache.clone();
        let records = stream::iter(paths)
            .then(move |path| Self::read_record(cache.clone(), path))
            .filter_map(|result| async move {
                match result {
                    Ok(record) => Some(Ok(record)),
                    Err(StorageError::Archive(reason)) | Err(StorageError::Manifest(reason)) => {
                        tracing::warn!(reason = %reason, "Skipping unreadable package");
                        None
                    }
                    Err(e) => Some(Err(e)),
                }
            });
        Ok(records.boxed())
    }
}

#[async_trait]
impl PackageContent for FileSystemStore {
    async fn archive(&self, id: &str, version: &str) -> Result<Option<Bytes>, StorageError> {
        match self.archive_path(id, version) {
            Some(path) => read_optional(&path).await,
            None => Ok(None),
        }
    }

    async fn manifest(&self, id: &str, version: &str) -> Result<Option<Bytes>, StorageError> {
        let Some(manifest_path) = self.manifest_path(id, version) else {
            return Ok(None);
        };
        if let Some(manifest) = read_optional(&manifest_path).await? {
            return Ok(Some(manifest));
        }
        let Some(archive_path) = self.archive_path(id, version) else {
            return Ok(None);
        };
        if !tokio::fs::try_exists(&archive_path).await? {
            return Ok(None);
        }
        Self::cached_manifest(&self.cache, &archive_path).await.map(Some)
    }
}

#[async_trait]
impl PackagePublisher for FileSystemStore {
    async fn publish(&self, archive: Bytes) -> Result<PackageRecord, StorageError> {
        let size = archive.len() as u64;
        if size > self.max_package_size {
            return Err(StorageError::TooLarge {
                size,
                limit: self.max_package_size,
            });
        }

        let content = archive.clone();
        let manifest = tokio::task::spawn_blocking(move || nuspec::extract(&content)).await??;

        let mut record = nuspec::parse(&manifest, Path::new(""))?;
        let (archive_path, manifest_path) = match (
            self.archive_path(&record.id, &record.version),
            self.manifest_path(&record.id, &record.version),
        ) {
            (Some(a), Some(m)) => (a, m),
            _ => {
                return Err(StorageError::Manifest(format!(
                    "unusable package identity {} {}",
                    record.id, record.version
                )))
            }
        };
        record.location = archive_path.clone();
        if tokio::fs::try_exists(&archive_path).await? {
            return Err(StorageError::Conflict {
                id: record.id,
                version: record.version,
            });
        }

        let committed =
            tokio::task::spawn_blocking(move || commit_package(&archive_path, &manifest_path, &archive, &manifest))
                .await??;
        if !committed {
            return Err(StorageError::Conflict {
                id: record.id,
                version: record.version,
            });
        }

        metrics::record_publish();
        tracing::info!(id = %record.id, version = %record.version, size, "Package published");
        Ok(record)
    }

    async fn exists(&self, id: &str, version: &str) -> Result<bool, StorageError> {
        match self.archive_path(id, version) {
            Some(path) => Ok(tokio::fs::try_exists(&path).await?),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::cache::MemoryCache;
    use crate::storage::nuspec::tests::archive_bytes;
    use futures_util::TryStreamExt;

    fn store(root: &Path) -> FileSystemStore {
        FileSystemStore::new(root, Arc::new(MemoryCache::default()), 1024 * 1024)
    }

    #[tokio::test]
    async fn test_publish_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let archive = Bytes::from(archive_bytes("Foo", "1.0.0"));
        let record = store.publish(archive.clone()).await.unwrap();
        assert_eq!(record.id, "Foo");
        assert!(record.location.ends_with("foo/1.0.0/foo.1.0.0.nupkg"));

        assert_eq!(store.archive("FOO", "1.0.0").await.unwrap().unwrap(), archive);
        let manifest = store.manifest("foo", "1.0.0").await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&manifest).contains("<id>Foo</id>"));
        assert!(store.exists("foo", "1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_absent_package_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.archive("nope", "1.0.0").await.unwrap().is_none());
        assert!(store.manifest("nope", "1.0.0").await.unwrap().is_none());
        assert!(store.archive("../etc", "1.0.0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_conflict_and_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let archive = Bytes::from(archive_bytes("Foo", "1.0.0"));
        store.publish(archive.clone()).await.unwrap();
        assert!(matches!(store.publish(archive).await, Err(StorageError::Conflict { .. })));

        let tiny = FileSystemStore::new(dir.path(), Arc::new(MemoryCache::default()), 10);
        let archive = Bytes::from(archive_bytes("Bar", "1.0.0"));
        assert!(matches!(tiny.publish(archive).await, Err(StorageError::TooLarge { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish_of_same_package_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store(dir.path()));
        let archive = Bytes::from(archive_bytes("Foo", "1.0.0"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let archive = archive.clone();
                tokio::spawn(async move { store.publish(archive).await })
            })
            .collect();

        let mut published = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => published += 1,
                Err(StorageError::Conflict { .. }) => {}
                Err(e) => panic!("unexpected publish error: {}", e),
            }
        }
        assert_eq!(published, 1);
        assert_eq!(store.archive("foo", "1.0.0").await.unwrap().unwrap(), archive);
    }

    #[tokio::test]
    async fn test_publish_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let archive = Bytes::from(archive_bytes("Foo", "1.0.0"));
        store.publish(archive.clone()).await.unwrap();

        let package_dir = dir.path().join("foo").join("1.0.0");
        // A losing writer that got past the existence check still cleans up.
        assert!(!commit_package(
            &package_dir.join("foo.1.0.0.nupkg"),
            &package_dir.join("foo.nuspec"),
            b"other",
            b"other",
        )
        .unwrap());

        let mut names: Vec<String> = std::fs::read_dir(&package_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["foo.1.0.0.nupkg", "foo.nuspec"]);
        assert_eq!(store.archive("foo", "1.0.0").await.unwrap().unwrap(), archive);
    }

    #[tokio::test]
    async fn test_enumeration_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.publish(Bytes::from(archive_bytes("Foo", "1.0.0"))).await.unwrap();
        store.publish(Bytes::from(archive_bytes("Foo", "2.0.0"))).await.unwrap();
        std::fs::write(dir.path().join("broken.nupkg"), b"garbage").unwrap();

        let first: Vec<PackageRecord> = store.packages().await.unwrap().try_collect().await.unwrap();
        assert_eq!(first.len(), 2);

        store.publish(Bytes::from(archive_bytes("Bar", "1.0.0"))).await.unwrap();
        let second: Vec<PackageRecord> = store.packages().await.unwrap().try_collect().await.unwrap();
        assert_eq!(second.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_root_enumerates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir.path().join("missing"));
        let all: Vec<PackageRecord> = store.packages().await.unwrap().try_collect().await.unwrap();
        assert!(all.is_empty());
    }
}
