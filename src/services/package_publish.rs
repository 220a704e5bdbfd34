//! Package publishing: push, unlist and relist.
//!
//! # Routes
//! ```text
//! PUT    {v}/package                  → 201 | 400 | 409 | 413
//! DELETE {v}/package/{id}/{version}   → 204 (unlisted) | 404
//! POST   {v}/package/{id}/{version}   → 200 (relisted) | 404
//! ```
//! Legacy forms (`/package`, `/v2/package`, `/api/v2/package`) are accepted
//! because older push clients hard-code them.
//!
//! # Design Decisions
//! - The archive is the raw body, or the first part of a multipart form
//! - Size is enforced by the body limit layer and again by the publisher
//! - Deleting only unlists; archives are never removed

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, Request, Response, StatusCode};
use std::sync::Arc;

use crate::config::FeedConfig;
use crate::dispatch::{DispatchError, RequestContext, ResourceHandler};
use crate::resources::{RegistryError, ResourceMap, ResourceRegistry, ResourceType};
use crate::routing::matcher::{is_delete, is_post, is_put, matches_any_path, segments_under, RequestMatcher};
use crate::storage::Backends;

pub const DEFAULT_PATH: &str = "/package";

pub fn register(map: &mut ResourceMap, config: &FeedConfig) -> Result<(), RegistryError> {
    super::register(map, config, ResourceType::PackagePublish, DEFAULT_PATH)
}

/// Handles pushes and listing changes.
#[derive(Debug)]
pub struct PackagePublishHandler {
    /// Versioned path first, then the legacy forms.
    bases: Vec<String>,
    backends: Backends,
}

impl PackagePublishHandler {
    pub fn new(registry: Arc<ResourceRegistry>, backends: Backends) -> Result<Self, RegistryError> {
        let bases = RequestMatcher::new(registry).legacy_paths(ResourceType::PackagePublish)?;
        Ok(Self { bases, backends })
    }

    /// `(id, version)` of a `{base}/{id}/{version}` path.
    fn identity<B>(&self, req: &Request<B>) -> Option<(String, String)> {
        self.bases.iter().find_map(|base| match segments_under(req.uri().path(), base)?.as_slice() {
            [id, version] => Some((id.to_string(), version.to_string())),
            _ => None,
        })
    }

    async fn push(&self, req: Request<Body>, ctx: &RequestContext) -> Result<Response<Body>, DispatchError> {
        let archive = read_archive(req).await?;
        let record = self.backends.publisher.publish(archive).await?;
        tracing::info!(
            request_id = %ctx.request_id,
            id = %record.id,
            version = %record.version,
            "Package pushed"
        );
        Ok(ctx.writer.status(StatusCode::CREATED))
    }

    async fn set_listed(
        &self,
        id: &str,
        version: &str,
        listed: bool,
        ctx: &RequestContext,
    ) -> Result<Response<Body>, DispatchError> {
        if !self.backends.publisher.exists(id, version).await? {
            return Ok(ctx.writer.not_found());
        }
        self.backends.status.set_listed(id, version, listed).await?;
        let status = if listed { StatusCode::OK } else { StatusCode::NO_CONTENT };
        Ok(ctx.writer.status(status))
    }
}

fn is_multipart<B>(req: &Request<B>) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

fn body_error(status: StatusCode, detail: String) -> DispatchError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        DispatchError::BodyTooLarge
    } else {
        DispatchError::BadRequest(detail)
    }
}

/// The pushed archive: raw body, or the first multipart field.
async fn read_archive(req: Request<Body>) -> Result<Bytes, DispatchError> {
    if !is_multipart(&req) {
        return Bytes::from_request(req, &())
            .await
            .map_err(|rejection| body_error(rejection.status(), rejection.body_text()));
    }

    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|rejection| body_error(rejection.status(), rejection.body_text()))?;
    let field = multipart
        .next_field()
        .await
        .map_err(|e| body_error(e.status(), e.body_text()))?
        .ok_or_else(|| DispatchError::BadRequest("multipart body has no parts".into()))?;
    field.bytes().await.map_err(|e| body_error(e.status(), e.body_text()))
}

#[async_trait]
impl ResourceHandler for PackagePublishHandler {
    fn name(&self) -> &'static str {
        "package_publish"
    }

    fn matches(&self, req: &Request<Body>) -> bool {
        let method = req.method();
        if is_put(method) {
            return matches_any_path(req, &self.bases);
        }
        (is_delete(method) || is_post(method)) && self.identity(req).is_some()
    }

    async fn handle(&self, req: Request<Body>, ctx: &RequestContext) -> Result<Response<Body>, DispatchError> {
        if is_put(req.method()) {
            return self.push(req, ctx).await;
        }
        let Some((id, version)) = self.identity(&req) else {
            return Ok(ctx.writer.not_found());
        };
        let listed = is_post(req.method());
        self.set_listed(&id, &version, listed, ctx).await
    }
}
