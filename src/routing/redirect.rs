//! Version redirection.
//!
//! Rewrites `/{anything}/rest/of/path?query` to `/v{current}/rest/of/path?query`.

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use std::sync::Arc;

use crate::resources::ResourceRegistry;

/// Redirects requests to the currently served API version.
#[derive(Debug, Clone)]
pub struct VersionRedirector {
    registry: Arc<ResourceRegistry>,
}

impl VersionRedirector {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }

    /// Location for `path` under the current version prefix.
    ///
    /// The first path segment is replaced; the rest and the query are kept verbatim.
    pub fn target(&self, path: &str, query: Option<&str>) -> String {
        let mut target = self.registry.version_prefix();
        let rest: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).skip(1).collect();
        if !rest.is_empty() {
            target.push('/');
            target.push_str(&rest.join("/"));
        }
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    /// Build the redirect response for `req`.
    ///
    /// `permanent` selects 301 Moved Permanently over 302 Found.
    pub fn redirect<B>(&self, req: &Request<B>, permanent: bool) -> Response<Body> {
        let location = self.target(req.uri().path(), req.uri().query());
        let status = if permanent {
            StatusCode::MOVED_PERMANENTLY
        } else {
            StatusCode::FOUND
        };

        tracing::debug!(
            from = %req.uri(),
            to = %location,
            permanent,
            "Redirecting to current api version"
        );

        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        match HeaderValue::from_str(&location) {
            Ok(value) => {
                response.headers_mut().insert(header::LOCATION, value);
            }
            Err(_) => {
                *response.status_mut() = StatusCode::BAD_REQUEST;
            }
        }
        response
    }
}
