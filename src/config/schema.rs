//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the feed server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resources::ApiVersion;

/// Root configuration for the feed server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FeedConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// API version and serialization mode.
    pub api: ApiConfig,

    /// Feature modules to enable.
    pub features: FeatureConfig,

    /// Path overrides keyed by resource type name, e.g. `PackageBaseAddress = "/flatcontainer"`.
    pub resources: BTreeMap<String, String>,

    /// Package storage settings.
    pub storage: StorageConfig,

    /// Response settings.
    pub http: HttpConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Maximum concurrently processed requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            max_connections: 10_000,
        }
    }
}

/// API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Served API version; the major part prefixes every resource path.
    pub version: Option<ApiVersion>,

    /// Pretty-print JSON responses.
    pub development_mode: bool,

    /// Absolute URL prefix for service index entries (e.g. "https://feed.example.com").
    pub public_base_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            version: Some(ApiVersion::default()),
            development_mode: false,
            public_base_url: None,
        }
    }
}

/// Feature module toggles. The service index is always served.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub package_base_address: bool,
    pub package_publish: bool,
    pub search_query: bool,
    pub search_autocomplete: bool,
    pub version_redirect: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            package_base_address: true,
            package_publish: true,
            search_query: true,
            search_autocomplete: true,
            version_redirect: true,
        }
    }
}

/// Package storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding package archives.
    pub packages_dir: String,

    /// Optional file persisting listed/unlisted state.
    pub status_file: Option<String>,

    /// Largest accepted archive, in bytes.
    pub max_package_size: u64,

    /// Maximum cached manifests.
    pub cache_entries: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            packages_dir: "./packages".to_string(),
            status_file: None,
            max_package_size: 250 * 1024 * 1024,
            cache_entries: 4096,
        }
    }
}

/// Response configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Allow gzip for JSON responses when the client accepts it.
    pub gzip_json: bool,

    /// Chunk size used when copying bodies to the client.
    pub write_buffer_size: usize,

    /// 301 (true) or 302 (false) for version redirects.
    pub permanent_redirects: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            gzip_json: true,
            write_buffer_size: 8 * 1024,
            permanent_redirects: true,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 120 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
