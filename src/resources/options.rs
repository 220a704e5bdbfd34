//! Options model: API version and the resource → path table.
//!
//! # Responsibilities
//! - Parse and hold the API version the server speaks
//! - Collect resource paths registered by feature modules
//! - Normalize registered paths ("package" → "/package")
//!
//! # Design Decisions
//! - Built once at startup, frozen into a `ResourceRegistry`
//! - Duplicate registration is an error, never a silent overwrite

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::resources::registry::RegistryError;
use crate::resources::types::ResourceType;

/// Version of the feed API, e.g. `3.0.0`. Only `major` shapes URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// URL prefix for this version, e.g. `/v3`.
    pub fn path_prefix(&self) -> String {
        format!("/v{}", self.major)
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::new(3, 0, 0)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    /// Accepts `3`, `3.0` or `3.0.0`; pre-release and build parts are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 3 {
            return Err(format!("too many api version components in '{}'", s));
        }
        while parts.len() < 3 {
            parts.push("0");
        }
        let parsed =
            semver::Version::parse(&parts.join(".")).map_err(|e| format!("invalid api version '{}': {}", s, e))?;
        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(format!("api version '{}' must be plain major.minor.patch", s));
        }
        let component = |value: u64| {
            u32::try_from(value).map_err(|_| format!("api version component {} out of range in '{}'", value, s))
        };
        Ok(Self {
            major: component(parsed.major)?,
            minor: component(parsed.minor)?,
            patch: component(parsed.patch)?,
        })
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(version: ApiVersion) -> Self {
        version.to_string()
    }
}

/// Resource type → relative path table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMap {
    entries: HashMap<ResourceType, String>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` for `resource_type`.
    ///
    /// Paths are normalized to a single leading slash and no trailing slash.
    pub fn register(&mut self, resource_type: ResourceType, path: &str) -> Result<(), RegistryError> {
        let normalized = normalize_resource_path(path)
            .ok_or_else(|| RegistryError::InvalidPath(resource_type, path.to_string()))?;

        if self.entries.contains_key(&resource_type) {
            return Err(RegistryError::DuplicateResource(resource_type));
        }

        tracing::debug!(resource = %resource_type, path = %normalized, "Resource registered");
        self.entries.insert(resource_type, normalized);
        Ok(())
    }

    pub fn get(&self, resource_type: ResourceType) -> Option<&str> {
        self.entries.get(&resource_type).map(String::as_str)
    }

    pub fn contains(&self, resource_type: ResourceType) -> bool {
        self.entries.contains_key(&resource_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceType, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

fn normalize_resource_path(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return None;
    }
    if segments.iter().any(|s| s.chars().any(|c| c.is_whitespace() || c == '?' || c == '#')) {
        return None;
    }
    Some(format!("/{}", segments.join("/")))
}

/// Immutable feed options handed to the registry.
#[derive(Debug, Clone, Default)]
pub struct FeedOptions {
    /// API version; `None` is a configuration error surfaced by the registry.
    pub api_version: Option<ApiVersion>,
    pub resources: ResourceMap,
    /// Pretty-print JSON responses.
    pub development_mode: bool,
}

impl FeedOptions {
    pub fn new(api_version: ApiVersion) -> Self {
        Self {
            api_version: Some(api_version),
            resources: ResourceMap::new(),
            development_mode: false,
        }
    }

    pub fn with_resource(mut self, resource_type: ResourceType, path: &str) -> Result<Self, RegistryError> {
        self.resources.register(resource_type, path)?;
        Ok(self)
    }

    pub fn with_development_mode(mut self, enabled: bool) -> Self {
        self.development_mode = enabled;
        self
    }
}
