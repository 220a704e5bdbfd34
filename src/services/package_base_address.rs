//! Package content ("flat container").
//!
//! # Routes (below `{v}/flatcontainer`)
//! ```text
//! GET|HEAD {id}/index.json                       → {"versions": [...]}
//! GET|HEAD {id}/{version}/{id}.{version}.nupkg   → archive bytes
//! GET|HEAD {id}/{version}/{id}.nuspec            → manifest bytes
//! ```
//!
//! # Design Decisions
//! - Ids and versions compare case-insensitively; URLs use the lower-cased forms
//! - Requests are claimed by prefix and file extension; malformed names below
//!   the prefix get a 404 rather than falling through to later handlers
//! - Unlisted versions are hidden from the version list but remain downloadable

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use serde::Serialize;

use crate::config::FeedConfig;
use crate::dispatch::{DispatchError, RequestContext, ResourceHandler};
use crate::resources::{RegistryError, ResourceMap, ResourceRegistry, ResourceType};
use crate::routing::matcher::{
    path_has_extension, segments_under, AndMatcher, AnyMatcher, ExtensionMatcher, Matcher, PathPrefixMatcher,
    VerbMatcher,
};
use crate::storage::{version, Backends};

pub const DEFAULT_PATH: &str = "/flatcontainer";

const ARCHIVE_EXTENSION: &str = ".nupkg";
const MANIFEST_EXTENSION: &str = ".nuspec";
const VERSION_LIST: &str = "index.json";
const ARCHIVE_CONTENT_TYPE: &str = "application/octet-stream";
const MANIFEST_CONTENT_TYPE: &str = "text/xml";

pub fn register(map: &mut ResourceMap, config: &FeedConfig) -> Result<(), RegistryError> {
    super::register(map, config, ResourceType::PackageBaseAddress, DEFAULT_PATH)
}

/// What a flat-container request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ContentRequest {
    Versions { id: String },
    Archive { id: String, version: String },
    Manifest { id: String, version: String },
}

impl ContentRequest {
    /// Classify the segments below the flat-container prefix.
    fn parse(segments: &[&str]) -> Option<Self> {
        match segments {
            [id, file] if file.eq_ignore_ascii_case(VERSION_LIST) => Some(ContentRequest::Versions {
                id: id.to_lowercase(),
            }),
            [id, package_version, file] => {
                let id = id.to_lowercase();
                let package_version = version::normalize(package_version);
                let path = format!("/{}", file);
                if path_has_extension(&path, ARCHIVE_EXTENSION) {
                    let expected = format!("{}.{}{}", id, package_version, ARCHIVE_EXTENSION);
                    file.eq_ignore_ascii_case(&expected).then_some(ContentRequest::Archive {
                        id,
                        version: package_version,
                    })
                } else if path_has_extension(&path, MANIFEST_EXTENSION) {
                    let expected = format!("{}{}", id, MANIFEST_EXTENSION);
                    file.eq_ignore_ascii_case(&expected).then_some(ContentRequest::Manifest {
                        id,
                        version: package_version,
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct VersionList {
    versions: Vec<String>,
}

/// Serves package archives, manifests and version lists.
#[derive(Debug)]
pub struct PackageBaseAddressHandler {
    prefix: String,
    matcher: AndMatcher,
    backends: Backends,
}

impl PackageBaseAddressHandler {
    pub fn new(registry: &ResourceRegistry, backends: Backends) -> Result<Self, RegistryError> {
        let prefix = registry.versioned_path(ResourceType::PackageBaseAddress)?;
        let matcher = AndMatcher::new(vec![
            Box::new(VerbMatcher::get_or_head()),
            Box::new(PathPrefixMatcher::new(prefix.clone())),
            Box::new(AnyMatcher::new(vec![
                Box::new(ExtensionMatcher::new(VERSION_LIST)),
                Box::new(ExtensionMatcher::new(ARCHIVE_EXTENSION)),
                Box::new(ExtensionMatcher::new(MANIFEST_EXTENSION)),
            ])),
        ]);
        Ok(Self {
            prefix,
            matcher,
            backends,
        })
    }

    fn classify<B>(&self, req: &Request<B>) -> Option<ContentRequest> {
        let segments = segments_under(req.uri().path(), &self.prefix)?;
        ContentRequest::parse(&segments)
    }

    /// Ascending, lower-cased listed versions of `id`; `None` when there are none.
    async fn versions(&self, id: &str) -> Result<Option<VersionList>, DispatchError> {
        let mut versions: Vec<String> = self
            .backends
            .listed_packages()
            .await?
            .into_iter()
            .filter(|p| p.lower_id() == id)
            .map(|p| p.normalized_version())
            .collect();
        if versions.is_empty() {
            return Ok(None);
        }
        versions.sort_by(|a, b| version::compare(a, b));
        versions.dedup();
        Ok(Some(VersionList { versions }))
    }
}

#[async_trait]
impl ResourceHandler for PackageBaseAddressHandler {
    fn name(&self) -> &'static str {
        "package_base_address"
    }

    fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }

    async fn handle(&self, req: Request<Body>, ctx: &RequestContext) -> Result<Response<Body>, DispatchError> {
        let Some(request) = self.classify(&req) else {
            return Ok(ctx.writer.not_found());
        };
        let method = req.method();

        match request {
            ContentRequest::Versions { id } => {
                let versions = self.versions(&id).await?;
                let encoding = ctx.json_encoding(&req);
                Ok(ctx.writer.json(method, versions.as_ref(), encoding, ctx.cancel.clone())?)
            }
            ContentRequest::Archive { id, version } => {
                let archive = self.backends.content.archive(&id, &version).await?;
                Ok(ctx.writer.raw(method, ARCHIVE_CONTENT_TYPE, archive, ctx.cancel.clone()))
            }
            ContentRequest::Manifest { id, version } => {
                let manifest = self.backends.content.manifest(&id, &version).await?;
                Ok(ctx.writer.raw(method, MANIFEST_CONTENT_TYPE, manifest, ctx.cancel.clone()))
            }
        }
    }
}
