//! Feature modules: resource registration and resource handlers.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     FeedConfig.features / [resources]
//!     → build_options()   (each enabled feature registers its types + default paths)
//!     → ResourceRegistry
//!     → build_pipeline()  (one handler per feature, in fixed order)
//!
//! Per request:
//!     Pipeline → service_index | package_base_address | package_publish
//!              | search_query | autocomplete | version_redirect
//! ```
//!
//! # Design Decisions
//! - Handler order is fixed; the version redirect runs last so every
//!   legacy-path handler gets a chance to claim `/v2/...` first
//! - `[resources]` overrides replace a feature's default path, never add types

pub mod autocomplete;
pub mod package_base_address;
pub mod package_publish;
pub mod search_query;
pub mod service_index;
pub mod version_redirect;

use std::sync::Arc;

use crate::config::FeedConfig;
use crate::dispatch::Pipeline;
use crate::resources::{FeedOptions, RegistryError, ResourceMap, ResourceRegistry, ResourceType};
use crate::storage::Backends;

pub use autocomplete::AutocompleteHandler;
pub use package_base_address::PackageBaseAddressHandler;
pub use package_publish::PackagePublishHandler;
pub use search_query::SearchQueryHandler;
pub use service_index::ServiceIndexHandler;
pub use version_redirect::VersionRedirectHandler;

/// Register `resource_type` at its configured override, or at `default_path`.
pub(crate) fn register(
    map: &mut ResourceMap,
    config: &FeedConfig,
    resource_type: ResourceType,
    default_path: &str,
) -> Result<(), RegistryError> {
    let path = config
        .resources
        .get(resource_type.name())
        .map(String::as_str)
        .unwrap_or(default_path);
    map.register(resource_type, path)
}

/// Collect the resource table of every enabled feature.
pub fn build_options(config: &FeedConfig) -> Result<FeedOptions, RegistryError> {
    let mut resources = ResourceMap::new();
    let features = &config.features;

    service_index::register(&mut resources, config)?;
    if features.package_base_address {
        package_base_address::register(&mut resources, config)?;
    }
    if features.package_publish {
        package_publish::register(&mut resources, config)?;
    }
    if features.search_query {
        search_query::register(&mut resources, config)?;
    }
    if features.search_autocomplete {
        autocomplete::register(&mut resources, config)?;
    }

    Ok(FeedOptions {
        api_version: config.api.version,
        resources,
        development_mode: config.api.development_mode,
    })
}

/// Build the handler pipeline for the enabled features.
pub fn build_pipeline(
    config: &FeedConfig,
    registry: Arc<ResourceRegistry>,
    backends: Backends,
) -> Result<Pipeline, RegistryError> {
    let features = &config.features;
    let mut pipeline = Pipeline::new();

    pipeline.push(Arc::new(ServiceIndexHandler::new(
        registry.clone(),
        config.api.public_base_url.clone(),
    )?));
    if features.package_base_address {
        pipeline.push(Arc::new(PackageBaseAddressHandler::new(&registry, backends.clone())?));
    }
    if features.package_publish {
        pipeline.push(Arc::new(PackagePublishHandler::new(registry.clone(), backends.clone())?));
    }
    if features.search_query {
        pipeline.push(Arc::new(SearchQueryHandler::new(registry.clone(), backends.clone())?));
    }
    if features.search_autocomplete {
        pipeline.push(Arc::new(AutocompleteHandler::new(&registry, backends)?));
    }
    if features.version_redirect {
        pipeline.push(Arc::new(VersionRedirectHandler::new(
            registry,
            config.http.permanent_redirects,
        )));
    }

    tracing::info!(handlers = ?pipeline.handler_names(), "Dispatch pipeline built");
    Ok(pipeline)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the handler tests.

    use axum::body::{Body, Bytes};
    use axum::http::{Request, Response};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    use crate::config::FeedConfig;
    use crate::dispatch::RequestContext;
    use crate::http::response::ResponseWriter;
    use crate::resources::ResourceRegistry;
    use crate::storage::nuspec::tests::archive_bytes;
    use crate::storage::{Backends, FileSystemStore, MemoryCache, MemoryStatusProvider, PackagePublisher};

    pub struct Fixture {
        pub registry: Arc<ResourceRegistry>,
        pub backends: Backends,
        pub store: Arc<FileSystemStore>,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        pub fn new() -> Self {
            let config = FeedConfig::default();
            let registry = Arc::new(ResourceRegistry::new(super::build_options(&config).unwrap()).unwrap());
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(FileSystemStore::new(
                dir.path(),
                Arc::new(MemoryCache::default()),
                1024 * 1024,
            ));
            let backends = Backends::filesystem(store.clone(), Arc::new(MemoryStatusProvider::new(None)));
            Self {
                registry,
                backends,
                store,
                _dir: dir,
            }
        }

        pub async fn publish(&self, id: &str, version: &str) {
            self.store
                .publish(Bytes::from(archive_bytes(id, version)))
                .await
                .unwrap();
        }
    }

    pub fn ctx() -> RequestContext {
        RequestContext::new(ResponseWriter::default(), CancellationToken::new(), "test")
    }

    pub fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
