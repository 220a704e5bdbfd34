//! Service index: the discovery document listing every resource.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use serde::Serialize;
use std::sync::Arc;

use crate::config::FeedConfig;
use crate::dispatch::{DispatchError, RequestContext, ResourceHandler};
use crate::resources::{RegistryError, ResourceMap, ResourceRegistry, ResourceType};
use crate::routing::matcher::{AndMatcher, Matcher, PathMatcher, RequestMatcher, VerbMatcher};

pub const DEFAULT_PATH: &str = "/index.json";

pub fn register(map: &mut ResourceMap, config: &FeedConfig) -> Result<(), RegistryError> {
    super::register(map, config, ResourceType::ServiceIndex, DEFAULT_PATH)
}

#[derive(Debug, Serialize)]
struct ServiceIndex {
    version: String,
    resources: Vec<ServiceResource>,
}

#[derive(Debug, Serialize)]
struct ServiceResource {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    resource_type: &'static str,
    comment: &'static str,
}

/// Serves `GET|HEAD {v}/index.json` and its legacy forms.
#[derive(Debug)]
pub struct ServiceIndexHandler {
    registry: Arc<ResourceRegistry>,
    matcher: AndMatcher,
    /// Resource type and versioned path of every advertised entry.
    entries: Vec<(ResourceType, String)>,
    public_base_url: Option<String>,
}

impl ServiceIndexHandler {
    pub fn new(registry: Arc<ResourceRegistry>, public_base_url: Option<String>) -> Result<Self, RegistryError> {
        let request_matcher = RequestMatcher::new(registry.clone());
        let matcher = AndMatcher::new(vec![
            Box::new(VerbMatcher::get_or_head()),
            Box::new(PathMatcher::legacy(&request_matcher, &[ResourceType::ServiceIndex])?),
        ]);

        let advertised: Vec<ResourceType> = registry
            .registered()
            .into_iter()
            .filter(|t| *t != ResourceType::ServiceIndex)
            .collect();
        let entries = advertised
            .iter()
            .copied()
            .zip(registry.versioned_paths(&advertised)?)
            .collect();

        Ok(Self {
            registry,
            matcher,
            entries,
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    /// URL prefix for `@id` values: configured base, else the request's own origin.
    fn base_url<B>(&self, req: &Request<B>) -> String {
        if let Some(base) = &self.public_base_url {
            return base.clone();
        }
        let Some(host) = req.headers().get(header::HOST).and_then(|h| h.to_str().ok()) else {
            return String::new();
        };
        let scheme = req
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .or_else(|| req.uri().scheme_str())
            .unwrap_or("http");
        format!("{}://{}", scheme, host)
    }
}

#[async_trait]
impl ResourceHandler for ServiceIndexHandler {
    fn name(&self) -> &'static str {
        "service_index"
    }

    fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }

    async fn handle(&self, req: Request<Body>, ctx: &RequestContext) -> Result<Response<Body>, DispatchError> {
        let base = self.base_url(&req);
        let index = ServiceIndex {
            version: self.registry.api_version().to_string(),
            resources: self
                .entries
                .iter()
                .map(|(ty, path)| ServiceResource {
                    id: format!("{}{}", base, path),
                    resource_type: ty.type_id(),
                    comment: ty.comment(),
                })
                .collect(),
        };

        let encoding = ctx.json_encoding(&req);
        Ok(ctx.writer.json(req.method(), Some(&index), encoding, ctx.cancel.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{body_json, ctx, request, Fixture};

    #[tokio::test]
    async fn test_lists_resources_with_host_origin() {
        let fixture = Fixture::new();
        let handler = ServiceIndexHandler::new(fixture.registry.clone(), None).unwrap();

        let req = Request::builder()
            .uri("/v3/index.json")
            .header(header::HOST, "feed.local:5000")
            .body(Body::empty())
            .unwrap();
        assert!(handler.matches(&req));

        let json = body_json(handler.handle(req, &ctx()).await.unwrap()).await;
        assert_eq!(json["version"], "3.0.0");
        let resources = json["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 6);
        assert_eq!(resources[0]["@id"], "http://feed.local:5000/v3/flatcontainer");
        assert_eq!(resources[0]["@type"], "PackageBaseAddress/3.0.0");
        assert!(resources.iter().all(|r| r["@type"] != "ServiceIndex"));
        let query_types: Vec<&str> = resources
            .iter()
            .filter(|r| r["@id"] == "http://feed.local:5000/v3/query")
            .map(|r| r["@type"].as_str().unwrap())
            .collect();
        assert_eq!(
            query_types,
            vec!["SearchQueryService", "SearchQueryService/3.0.0-beta", "SearchQueryService/3.0.0-rc"]
        );
    }

    #[tokio::test]
    async fn test_public_base_url_wins() {
        let fixture = Fixture::new();
        let handler =
            ServiceIndexHandler::new(fixture.registry.clone(), Some("https://feed.example.com/".into())).unwrap();
        let json = body_json(handler.handle(request("GET", "/index.json"), &ctx()).await.unwrap()).await;
        assert_eq!(json["resources"][0]["@id"], "https://feed.example.com/v3/flatcontainer");
    }

    #[tokio::test]
    async fn test_no_host_yields_bare_paths() {
        let fixture = Fixture::new();
        let handler = ServiceIndexHandler::new(fixture.registry.clone(), None).unwrap();
        let json = body_json(handler.handle(request("GET", "/v3/index.json"), &ctx()).await.unwrap()).await;
        assert_eq!(json["resources"][1]["@id"], "/v3/package");
    }

    #[test]
    fn test_matches_legacy_forms_only_for_reads() {
        let fixture = Fixture::new();
        let handler = ServiceIndexHandler::new(fixture.registry.clone(), None).unwrap();
        for path in ["/v3/index.json", "/index.json", "/v2/index.json", "/api/v2/index.json", "/V3/Index.json/"] {
            assert!(handler.matches(&request("GET", path)), "{}", path);
        }
        assert!(handler.matches(&request("HEAD", "/v3/index.json")));
        assert!(!handler.matches(&request("POST", "/v3/index.json")));
        assert!(!handler.matches(&request("GET", "/v4/index.json")));
    }
}
