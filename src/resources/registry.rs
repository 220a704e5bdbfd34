//! Resource registry: the single source of truth for resource URLs.
//!
//! # Responsibilities
//! - Resolve the relative path configured for a resource type
//! - Build absolute, version-prefixed paths (`/v3/flatcontainer`)
//! - Fail loudly when the API version or a resource is not configured
//!
//! # Design Decisions
//! - API version presence is checked when the registry is built
//! - Lookups are pure functions over immutable state, safe to call concurrently

use thiserror::Error;

use crate::resources::options::{ApiVersion, FeedOptions, ResourceMap};
use crate::resources::types::ResourceType;

/// Configuration faults detected while building or querying the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("feed api version not specified")]
    ApiVersionNotSpecified,

    #[error("feed resource {0} not specified")]
    ResourceNotSpecified(ResourceType),

    #[error("feed resource {0} registered more than once")]
    DuplicateResource(ResourceType),

    #[error("feed resource {0} has invalid path '{1}'")]
    InvalidPath(ResourceType, String),
}

/// Frozen view over `FeedOptions`.
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    api_version: ApiVersion,
    resources: ResourceMap,
    development_mode: bool,
}

impl ResourceRegistry {
    /// Build a registry, rejecting options without an API version.
    pub fn new(options: FeedOptions) -> Result<Self, RegistryError> {
        let api_version = options.api_version.ok_or(RegistryError::ApiVersionNotSpecified)?;

        tracing::info!(
            api_version = %api_version,
            resources = options.resources.len(),
            "Resource registry built"
        );

        Ok(Self {
            api_version,
            resources: options.resources,
            development_mode: options.development_mode,
        })
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    pub fn development_mode(&self) -> bool {
        self.development_mode
    }

    /// `/v{major}` for the served API version.
    pub fn version_prefix(&self) -> String {
        self.api_version.path_prefix()
    }

    /// Relative path configured for `resource_type`.
    pub fn resource_path(&self, resource_type: ResourceType) -> Result<&str, RegistryError> {
        self.resources
            .get(resource_type)
            .ok_or(RegistryError::ResourceNotSpecified(resource_type))
    }

    /// Version-prefixed path for `resource_type`.
    pub fn versioned_path(&self, resource_type: ResourceType) -> Result<String, RegistryError> {
        let path = self.resource_path(resource_type)?;
        Ok(format!("{}{}", self.version_prefix(), path))
    }

    /// Version-prefixed paths for each of `resource_types`, in order.
    pub fn versioned_paths(&self, resource_types: &[ResourceType]) -> Result<Vec<String>, RegistryError> {
        resource_types
            .iter()
            .map(|t| self.versioned_path(*t))
            .collect()
    }

    pub fn is_registered(&self, resource_type: ResourceType) -> bool {
        self.resources.contains(resource_type)
    }

    /// All registered resource types in stable (declaration) order.
    pub fn registered(&self) -> Vec<ResourceType> {
        ResourceType::ALL
            .iter()
            .copied()
            .filter(|t| self.resources.contains(*t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ResourceRegistry {
        let options = FeedOptions::new(ApiVersion::new(3, 0, 0))
            .with_resource(ResourceType::PackageBaseAddress, "/flatcontainer")
            .unwrap()
            .with_resource(ResourceType::SearchQueryService, "/query")
            .unwrap();
        ResourceRegistry::new(options).unwrap()
    }

    #[test]
    fn test_versioned_path() {
        let registry = registry();
        assert_eq!(
            registry.versioned_path(ResourceType::PackageBaseAddress).unwrap(),
            "/v3/flatcontainer"
        );
    }

    #[test]
    fn test_versioned_path_has_prefix_and_suffix() {
        let registry = registry();
        for ty in registry.registered() {
            let path = registry.versioned_path(ty).unwrap();
            assert!(path.starts_with("/v3"));
            assert!(path.ends_with(registry.resource_path(ty).unwrap()));
        }
    }

    #[test]
    fn test_unregistered_resource_fails() {
        let registry = registry();
        assert_eq!(
            registry.resource_path(ResourceType::PackagePublish),
            Err(RegistryError::ResourceNotSpecified(ResourceType::PackagePublish))
        );
        assert_eq!(
            registry.versioned_path(ResourceType::PackagePublish),
            Err(RegistryError::ResourceNotSpecified(ResourceType::PackagePublish))
        );
    }

    #[test]
    fn test_missing_api_version_fails() {
        let options = FeedOptions::default();
        assert_eq!(
            ResourceRegistry::new(options).unwrap_err(),
            RegistryError::ApiVersionNotSpecified
        );
    }

    #[test]
    fn test_versioned_paths() {
        let registry = registry();
        assert!(registry.versioned_paths(&[]).unwrap().is_empty());
        assert_eq!(
            registry
                .versioned_paths(&[ResourceType::SearchQueryService, ResourceType::PackageBaseAddress])
                .unwrap(),
            vec!["/v3/query".to_string(), "/v3/flatcontainer".to_string()]
        );
        assert!(registry
            .versioned_paths(&[ResourceType::SearchQueryService, ResourceType::PackagePublish])
            .is_err());
    }

    #[test]
    fn test_registered_order_is_stable() {
        let registry = registry();
        assert_eq!(
            registry.registered(),
            vec![ResourceType::PackageBaseAddress, ResourceType::SearchQueryService]
        );
    }
}
