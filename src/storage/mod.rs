//! Package storage collaborators.
//!
//! # Data Flow
//! ```text
//! Handlers
//!     → PackageSource::packages()      (lazy stream of PackageRecord, rescanned per call)
//!     → PackageContent::archive()      (raw .nupkg bytes or None)
//!     → PackageContent::manifest()     (raw .nuspec bytes or None)
//!     → PackagePublisher::publish()    (validate + store archive)
//!     → PackageStatusProvider          (listed / unlisted)
//!
//! FileSystemStore (filesystem.rs)
//!     → nuspec.rs (manifest parsing)
//!     → CacheProvider (cache.rs, extracted manifests)
//! ```
//!
//! # Design Decisions
//! - Dispatch code only sees the traits, never the storage mechanism
//! - "Absent" is `Ok(None)`, failures are `Err(StorageError)`; no retries here
//! - Blocking archive work runs on the blocking pool

pub mod cache;
pub mod filesystem;
pub mod nuspec;
pub mod status;
pub mod version;

use async_trait::async_trait;
use axum::body::Bytes;
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use cache::{CacheProvider, MemoryCache};
pub use filesystem::FileSystemStore;
pub use status::MemoryStatusProvider;

/// Errors raised by storage collaborators.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid package archive: {0}")]
    Archive(String),

    #[error("invalid package manifest: {0}")]
    Manifest(String),

    #[error("package {id} {version} already exists")]
    Conflict { id: String, version: String },

    #[error("package of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageError::Task(e.to_string())
    }
}

/// A dependency on another package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub id: String,
    pub range: Option<String>,
}

/// Dependencies for one target framework (or all, when `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGroup {
    pub target_framework: Option<String>,
    pub dependencies: Vec<Dependency>,
}

/// A package found in the store, with its parsed manifest metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    /// Where the archive lives.
    pub location: PathBuf,
    pub id: String,
    pub version: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub project_url: Option<String>,
    pub icon_url: Option<String>,
    pub license_url: Option<String>,
    pub dependency_groups: Vec<DependencyGroup>,
}

impl PackageRecord {
    pub fn lower_id(&self) -> String {
        self.id.to_lowercase()
    }

    pub fn normalized_version(&self) -> String {
        version::normalize(&self.version)
    }

    pub fn is_prerelease(&self) -> bool {
        version::is_prerelease(&self.version)
    }
}

/// Finite stream of package records.
pub type PackageStream = BoxStream<'static, Result<PackageRecord, StorageError>>;

/// Enumerates packages in the store.
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Start a fresh enumeration. Each call rescans the store.
    async fn packages(&self) -> Result<PackageStream, StorageError>;
}

/// Reads package artifacts.
#[async_trait]
pub trait PackageContent: Send + Sync {
    /// Raw archive bytes, or `None` when the package does not exist.
    async fn archive(&self, id: &str, version: &str) -> Result<Option<Bytes>, StorageError>;

    /// Raw manifest bytes, or `None` when the package does not exist.
    async fn manifest(&self, id: &str, version: &str) -> Result<Option<Bytes>, StorageError>;
}

/// Accepts new packages.
#[async_trait]
pub trait PackagePublisher: Send + Sync {
    /// Validate and store an archive, returning its record.
    async fn publish(&self, archive: Bytes) -> Result<PackageRecord, StorageError>;

    async fn exists(&self, id: &str, version: &str) -> Result<bool, StorageError>;
}

/// Tracks listed / unlisted state per package version.
#[async_trait]
pub trait PackageStatusProvider: Send + Sync {
    async fn is_listed(&self, id: &str, version: &str) -> Result<bool, StorageError>;

    async fn set_listed(&self, id: &str, version: &str, listed: bool) -> Result<(), StorageError>;
}

/// The collaborators handlers call through.
#[derive(Clone)]
pub struct Backends {
    pub source: Arc<dyn PackageSource>,
    pub content: Arc<dyn PackageContent>,
    pub publisher: Arc<dyn PackagePublisher>,
    pub status: Arc<dyn PackageStatusProvider>,
}

impl Backends {
    /// All collaborators served by one filesystem store.
    pub fn filesystem(store: Arc<FileSystemStore>, status: Arc<dyn PackageStatusProvider>) -> Self {
        Self {
            source: store.clone(),
            content: store.clone(),
            publisher: store,
            status,
        }
    }

    /// Enumerate all packages whose version is listed.
    pub async fn listed_packages(&self) -> Result<Vec<PackageRecord>, StorageError> {
        let all: Vec<PackageRecord> = self.source.packages().await?.try_collect().await?;
        let mut listed = Vec::with_capacity(all.len());
        for record in all {
            if self.status.is_listed(&record.id, &record.version).await? {
                listed.push(record);
            }
        }
        Ok(listed)
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}
