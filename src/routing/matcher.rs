//! Request matching logic.
//!
//! # Responsibilities
//! - Match HTTP verbs (case-insensitive)
//! - Match exact resource paths, versioned or legacy
//! - Match file extensions of the final path segment
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Path comparison ignores ASCII case and a single trailing slash
//! - Empty or relative paths never match
//! - Matching is structural only: no I/O, never panics
//! - Registry lookups happen when a matcher is built, not per request

use axum::body::Body;
use axum::http::{Method, Request};
use std::sync::Arc;

use crate::resources::{RegistryError, ResourceRegistry, ResourceType};

/// Verb membership test, e.g. [`is_get_or_head`].
pub type VerbPredicate = fn(&Method) -> bool;

fn method_is(method: &Method, name: &str) -> bool {
    method.as_str().eq_ignore_ascii_case(name)
}

pub fn is_get(method: &Method) -> bool {
    method_is(method, "GET")
}

pub fn is_head(method: &Method) -> bool {
    method_is(method, "HEAD")
}

pub fn is_get_or_head(method: &Method) -> bool {
    is_get(method) || is_head(method)
}

pub fn is_put(method: &Method) -> bool {
    method_is(method, "PUT")
}

pub fn is_post(method: &Method) -> bool {
    method_is(method, "POST")
}

pub fn is_delete(method: &Method) -> bool {
    method_is(method, "DELETE")
}

/// True iff at least one predicate accepts the request method.
pub fn matches_verb<B>(req: &Request<B>, verbs: &[VerbPredicate]) -> bool {
    verbs.iter().any(|accepts| accepts(req.method()))
}

/// Strip a single trailing slash; reject empty and relative paths.
fn normalize_path(path: &str) -> Option<&str> {
    if !path.starts_with('/') {
        return None;
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    Some(if trimmed.is_empty() { "/" } else { trimmed })
}

/// Trailing-slash and ASCII-case insensitive path equality.
pub fn paths_equal(left: &str, right: &str) -> bool {
    match (normalize_path(left), normalize_path(right)) {
        (Some(l), Some(r)) => l.eq_ignore_ascii_case(r),
        _ => false,
    }
}

/// True iff the request path equals one of `candidates`.
pub fn matches_any_path<B, S: AsRef<str>>(req: &Request<B>, candidates: &[S]) -> bool {
    let path = req.uri().path();
    candidates.iter().any(|c| paths_equal(path, c.as_ref()))
}

/// True iff the final path segment ends with `extension` (ASCII case-insensitive).
pub fn matches_extension<B>(req: &Request<B>, extension: &str) -> bool {
    path_has_extension(req.uri().path(), extension)
}

pub fn path_has_extension(path: &str, extension: &str) -> bool {
    if extension.is_empty() || !path.starts_with('/') {
        return false;
    }
    let last = path.rsplit('/').next().unwrap_or_default();
    last.len() >= extension.len()
        && last.as_bytes()[last.len() - extension.len()..].eq_ignore_ascii_case(extension.as_bytes())
}

/// Segments of `path` below `prefix`, or `None` when `path` is not under it.
///
/// `/v3/flatcontainer/foo/index.json` under `/v3/flatcontainer` yields `["foo", "index.json"]`.
/// An empty trailing segment is dropped.
pub fn segments_under<'a>(path: &'a str, prefix: &str) -> Option<Vec<&'a str>> {
    let prefix = normalize_path(prefix)?;
    if !path.starts_with('/') || path.len() < prefix.len() || !path.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, rest) = path.split_at(prefix.len());
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    if !rest.is_empty() && !rest.starts_with('/') && prefix != "/" {
        return None;
    }
    let mut segments: Vec<&str> = rest.split('/').skip_while(|s| s.is_empty()).collect();
    if segments.last() == Some(&"") {
        segments.pop();
    }
    Some(segments)
}

/// Registry-aware matching of requests against resource types.
#[derive(Debug, Clone)]
pub struct RequestMatcher {
    registry: Arc<ResourceRegistry>,
}

impl RequestMatcher {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// True iff the request targets the versioned path of `resource_type`.
    pub fn matches_resource<B>(&self, req: &Request<B>, resource_type: ResourceType) -> Result<bool, RegistryError> {
        let path = self.registry.versioned_path(resource_type)?;
        Ok(matches_any_path(req, &[path]))
    }

    /// True iff the request targets the versioned path of any of `resource_types`.
    pub fn matches_resources<B>(&self, req: &Request<B>, resource_types: &[ResourceType]) -> Result<bool, RegistryError> {
        let paths = self.registry.versioned_paths(resource_types)?;
        Ok(matches_any_path(req, &paths))
    }

    /// True iff the request targets any legacy form of `resource_type`.
    pub fn matches_resource_legacy<B>(&self, req: &Request<B>, resource_type: ResourceType) -> Result<bool, RegistryError> {
        let paths = self.legacy_paths(resource_type)?;
        Ok(matches_any_path(req, &paths))
    }

    /// Current versioned path, bare path, `/v2` and `/api/v2` forms.
    pub fn legacy_paths(&self, resource_type: ResourceType) -> Result<Vec<String>, RegistryError> {
        let current = self.registry.versioned_path(resource_type)?;
        let bare = self.registry.resource_path(resource_type)?;
        Ok(vec![
            current,
            bare.to_string(),
            format!("/v2{}", bare),
            format!("/api/v2{}", bare),
        ])
    }
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Matches a set of HTTP verbs.
#[derive(Clone)]
pub struct VerbMatcher {
    verbs: Vec<VerbPredicate>,
}

impl std::fmt::Debug for VerbMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerbMatcher")
            .field("verbs", &self.verbs.len())
            .finish()
    }
}

impl VerbMatcher {
    pub fn new(verbs: Vec<VerbPredicate>) -> Self {
        Self { verbs }
    }

    pub fn get_or_head() -> Self {
        Self::new(vec![is_get_or_head as VerbPredicate])
    }
}

impl Matcher for VerbMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        matches_verb(req, &self.verbs)
    }
}

/// Matches any of a fixed set of paths.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    paths: Vec<String>,
}

impl PathMatcher {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    /// Versioned path of each resource type.
    pub fn resources(registry: &ResourceRegistry, resource_types: &[ResourceType]) -> Result<Self, RegistryError> {
        Ok(Self::new(registry.versioned_paths(resource_types)?))
    }

    /// Legacy forms of each resource type.
    pub fn legacy(matcher: &RequestMatcher, resource_types: &[ResourceType]) -> Result<Self, RegistryError> {
        let mut paths = Vec::new();
        for ty in resource_types {
            for path in matcher.legacy_paths(*ty)? {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        Ok(Self::new(paths))
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        matches_any_path(req, &self.paths)
    }
}

/// Matches requests below a path prefix, segment-aligned.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        segments_under(req.uri().path(), &self.prefix).is_some()
    }
}

/// Matches the suffix of the final path segment.
#[derive(Debug, Clone)]
pub struct ExtensionMatcher {
    extension: String,
}

impl ExtensionMatcher {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl Matcher for ExtensionMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        matches_extension(req, &self.extension)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}

/// Combines multiple matchers with OR semantics.
#[derive(Debug)]
pub struct AnyMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AnyMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AnyMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matchers.iter().any(|m| m.matches(req))
    }
}
