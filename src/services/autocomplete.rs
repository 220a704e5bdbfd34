//! Search autocomplete: package ids by substring, or the versions of one id.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use serde::Serialize;

use crate::config::FeedConfig;
use crate::dispatch::{DispatchError, RequestContext, ResourceHandler};
use crate::resources::{RegistryError, ResourceMap, ResourceRegistry, ResourceType};
use crate::routing::matcher::{AndMatcher, Matcher, PathMatcher, VerbMatcher};
use crate::services::search_query::{group_by_id, SearchParams};
use crate::storage::{Backends, PackageRecord};

pub const DEFAULT_PATH: &str = "/autocomplete";

pub fn register(map: &mut ResourceMap, config: &FeedConfig) -> Result<(), RegistryError> {
    super::register(map, config, ResourceType::SearchAutocompleteService, DEFAULT_PATH)
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteResults {
    pub total_hits: usize,
    pub data: Vec<String>,
}

/// `?id=` lists that package's versions; otherwise ids containing `q`.
pub fn autocomplete(records: Vec<PackageRecord>, params: &SearchParams) -> AutocompleteResults {
    let groups = group_by_id(records, params.prerelease());

    if let Some(id) = params.id.as_deref() {
        let data: Vec<String> = groups
            .get(&id.to_lowercase())
            .map(|versions| versions.iter().map(|r| r.normalized_version()).collect())
            .unwrap_or_default();
        return AutocompleteResults {
            total_hits: data.len(),
            data,
        };
    }

    let needle = params.q.as_deref().unwrap_or_default().trim().to_lowercase();
    let ids: Vec<String> = groups
        .iter()
        .filter(|(lower_id, _)| lower_id.contains(&needle))
        .filter_map(|(_, versions)| versions.last().map(|r| r.id.clone()))
        .collect();

    AutocompleteResults {
        total_hits: ids.len(),
        data: ids.into_iter().skip(params.skip()).take(params.take()).collect(),
    }
}

/// Serves `GET|HEAD {v}/autocomplete`.
#[derive(Debug)]
pub struct AutocompleteHandler {
    matcher: AndMatcher,
    backends: Backends,
}

impl AutocompleteHandler {
    pub fn new(registry: &ResourceRegistry, backends: Backends) -> Result<Self, RegistryError> {
        let matcher = AndMatcher::new(vec![
            Box::new(VerbMatcher::get_or_head()),
            Box::new(PathMatcher::resources(registry, &[ResourceType::SearchAutocompleteService])?),
        ]);
        Ok(Self { matcher, backends })
    }
}

#[async_trait]
impl ResourceHandler for AutocompleteHandler {
    fn name(&self) -> &'static str {
        "search_autocomplete"
    }

    fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }

    async fn handle(&self, req: Request<Body>, ctx: &RequestContext) -> Result<Response<Body>, DispatchError> {
        let params = SearchParams::from_request(&req)?;
        let results = autocomplete(self.backends.listed_packages().await?, &params);
        let encoding = ctx.json_encoding(&req);
        Ok(ctx.writer.json(req.method(), Some(&results), encoding, ctx.cancel.clone())?)
    }
}
