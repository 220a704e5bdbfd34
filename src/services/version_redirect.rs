//! Redirects requests for other API versions to the served one.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use std::sync::Arc;

use crate::dispatch::{DispatchError, RequestContext, ResourceHandler};
use crate::resources::ResourceRegistry;
use crate::routing::VersionRedirector;

/// Claims `/v{n}/...` for any `n` other than the current major.
#[derive(Debug)]
pub struct VersionRedirectHandler {
    redirector: VersionRedirector,
    current_major: u32,
    permanent: bool,
}

impl VersionRedirectHandler {
    pub fn new(registry: Arc<ResourceRegistry>, permanent: bool) -> Self {
        let current_major = registry.api_version().major;
        Self {
            redirector: VersionRedirector::new(registry),
            current_major,
            permanent,
        }
    }

    /// Major version named by the first path segment, e.g. `2` for `/v2/query`.
    fn requested_major(path: &str) -> Option<u32> {
        let first = path.split('/').find(|s| !s.is_empty())?;
        let digits = first.strip_prefix(['v', 'V'])?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

#[async_trait]
impl ResourceHandler for VersionRedirectHandler {
    fn name(&self) -> &'static str {
        "version_redirect"
    }

    fn matches(&self, req: &Request<Body>) -> bool {
        req.uri().path().starts_with('/')
            && Self::requested_major(req.uri().path()).is_some_and(|major| major != self.current_major)
    }

    async fn handle(&self, req: Request<Body>, _ctx: &RequestContext) -> Result<Response<Body>, DispatchError> {
        Ok(self.redirector.redirect(&req, self.permanent))
    }
}
