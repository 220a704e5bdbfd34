//! Search query service.
//!
//! # Responsibilities
//! - Parse `q`, `skip`, `take`, `prerelease` from the query string
//! - Group listed packages by id, newest version first for metadata
//! - Filter by search terms, page, and render the search document
//!
//! # Design Decisions
//! - Every whitespace-separated term must match id, title, description or a tag
//! - Results are ordered by lower-cased id so pages are stable
//! - The three search type aliases share one handler and one path
//! - Download counts are not tracked and always report 0

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Query;
use axum::http::{Request, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::FeedConfig;
use crate::dispatch::{DispatchError, RequestContext, ResourceHandler};
use crate::resources::{RegistryError, ResourceMap, ResourceRegistry, ResourceType};
use crate::routing::matcher::{AndMatcher, Matcher, PathMatcher, RequestMatcher, VerbMatcher};
use crate::storage::{version, Backends, PackageRecord};

pub const DEFAULT_PATH: &str = "/query";

pub const DEFAULT_TAKE: usize = 20;
pub const MAX_TAKE: usize = 1000;

/// Every resource type answered by the search handler.
pub const SEARCH_TYPES: [ResourceType; 3] = [
    ResourceType::SearchQueryService,
    ResourceType::SearchQueryService_3_0_0_beta,
    ResourceType::SearchQueryService_3_0_0_rc,
];

pub fn register(map: &mut ResourceMap, config: &FeedConfig) -> Result<(), RegistryError> {
    for ty in SEARCH_TYPES {
        super::register(map, config, ty, DEFAULT_PATH)?;
    }
    Ok(())
}

/// Query-string parameters shared by search and autocomplete.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub id: Option<String>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    pub prerelease: Option<bool>,
}

impl SearchParams {
    pub fn from_request<B>(req: &Request<B>) -> Result<Self, DispatchError> {
        Query::<SearchParams>::try_from_uri(req.uri())
            .map(|Query(params)| params)
            .map_err(|e| DispatchError::BadRequest(e.body_text()))
    }

    pub fn skip(&self) -> usize {
        self.skip.unwrap_or(0)
    }

    pub fn take(&self) -> usize {
        self.take.unwrap_or(DEFAULT_TAKE).min(MAX_TAKE)
    }

    pub fn prerelease(&self) -> bool {
        self.prerelease.unwrap_or(false)
    }

    /// Lower-cased search terms; empty when `q` is absent or blank.
    pub fn terms(&self) -> Vec<String> {
        self.q
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect()
    }
}

/// Listed records grouped by lower-cased id, each group sorted oldest to newest.
pub fn group_by_id(records: Vec<PackageRecord>, include_prerelease: bool) -> BTreeMap<String, Vec<PackageRecord>> {
    let mut groups: BTreeMap<String, Vec<PackageRecord>> = BTreeMap::new();
    for record in records {
        if !include_prerelease && record.is_prerelease() {
            continue;
        }
        groups.entry(record.lower_id()).or_default().push(record);
    }
    for versions in groups.values_mut() {
        versions.sort_by(|a, b| version::compare(&a.version, &b.version));
        versions.dedup_by(|a, b| version::same(&a.version, &b.version));
    }
    groups
}

fn matches_terms(record: &PackageRecord, terms: &[String]) -> bool {
    let mut haystack = vec![record.id.to_lowercase()];
    haystack.extend(record.title.as_deref().map(str::to_lowercase));
    haystack.extend(record.description.as_deref().map(str::to_lowercase));
    haystack.extend(record.tags.iter().map(|t| t.to_lowercase()));
    terms.iter().all(|term| haystack.iter().any(|field| field.contains(term.as_str())))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub total_hits: usize,
    pub data: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(rename = "@type")]
    pub result_type: &'static str,
    pub id: String,
    pub version: String,
    pub description: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub icon_url: Option<String>,
    pub project_url: Option<String>,
    pub license_url: Option<String>,
    pub total_downloads: u64,
    pub versions: Vec<SearchVersion>,
}

#[derive(Debug, Serialize)]
pub struct SearchVersion {
    pub version: String,
    pub downloads: u64,
}

impl SearchResult {
    /// Build from one id's versions, oldest first; `None` for an empty group.
    fn from_group(versions: &[PackageRecord]) -> Option<Self> {
        let latest = versions.last()?;
        Some(Self {
            result_type: "Package",
            id: latest.id.clone(),
            version: latest.version.clone(),
            description: latest.description.clone(),
            title: latest.title.clone(),
            summary: latest.summary.clone(),
            authors: latest.authors.clone(),
            tags: latest.tags.clone(),
            icon_url: latest.icon_url.clone(),
            project_url: latest.project_url.clone(),
            license_url: latest.license_url.clone(),
            total_downloads: 0,
            versions: versions
                .iter()
                .map(|r| SearchVersion {
                    version: r.version.clone(),
                    downloads: 0,
                })
                .collect(),
        })
    }
}

/// Run a search over `records`.
pub fn search(records: Vec<PackageRecord>, params: &SearchParams) -> SearchResults {
    let terms = params.terms();
    let hits: Vec<SearchResult> = group_by_id(records, params.prerelease())
        .values()
        .filter(|versions| versions.last().map(|r| matches_terms(r, &terms)).unwrap_or(false))
        .filter_map(|versions| SearchResult::from_group(versions))
        .collect();

    SearchResults {
        total_hits: hits.len(),
        data: hits.into_iter().skip(params.skip()).take(params.take()).collect(),
    }
}

/// Serves `GET|HEAD {v}/query` for every search alias.
#[derive(Debug)]
pub struct SearchQueryHandler {
    matcher: AndMatcher,
    backends: Backends,
}

impl SearchQueryHandler {
    pub fn new(registry: Arc<ResourceRegistry>, backends: Backends) -> Result<Self, RegistryError> {
        let request_matcher = RequestMatcher::new(registry);
        let matcher = AndMatcher::new(vec![
            Box::new(VerbMatcher::get_or_head()),
            Box::new(PathMatcher::legacy(&request_matcher, &SEARCH_TYPES)?),
        ]);
        Ok(Self { matcher, backends })
    }
}

#[async_trait]
impl ResourceHandler for SearchQueryHandler {
    fn name(&self) -> &'static str {
        "search_query"
    }

    fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }

    async fn handle(&self, req: Request<Body>, ctx: &RequestContext) -> Result<Response<Body>, DispatchError> {
        let params = SearchParams::from_request(&req)?;
        let results = search(self.backends.listed_packages().await?, &params);
        tracing::debug!(
            request_id = %ctx.request_id,
            q = params.q.as_deref().unwrap_or_default(),
            total_hits = results.total_hits,
            "Search completed"
        );

        let encoding = ctx.json_encoding(&req);
        Ok(ctx.writer.json(req.method(), Some(&results), encoding, ctx.cancel.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{body_json, ctx, request, Fixture};
    use std::path::PathBuf;

    fn record(id: &str, version: &str, tags: &[&str]) -> PackageRecord {
        PackageRecord {
            location: PathBuf::new(),
            id: id.into(),
            version: version.into(),
            title: None,
            authors: vec!["Alice".into()],
            description: Some(format!("About {}", id)),
            summary: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            project_url: None,
            icon_url: None,
            license_url: None,
            dependency_groups: vec![],
        }
    }

    fn params(query: &str) -> SearchParams {
        let uri: axum::http::Uri = format!("/v3/query?{}", query).parse().unwrap();
        Query::<SearchParams>::try_from_uri(&uri).unwrap().0
    }

    fn corpus() -> Vec<PackageRecord> {
        vec![
            record("Zeta", "1.0.0", &["json"]),
            record("alpha", "1.0.0", &["xml"]),
            record("Alpha", "2.0.0-beta", &["xml"]),
            record("alpha", "1.5.0", &["xml", "json"]),
            record("Beta", "0.1.0", &[]),
        ]
    }

    #[test]
    fn test_params_defaults_and_clamp() {
        let p = params("");
        assert_eq!((p.skip(), p.take(), p.prerelease()), (0, DEFAULT_TAKE, false));
        let p = params("take=5000&skip=3&prerelease=true&q=Foo%20Bar");
        assert_eq!((p.skip(), p.take(), p.prerelease()), (3, MAX_TAKE, true));
        assert_eq!(p.terms(), vec!["foo", "bar"]);
    }

    #[test]
    fn test_groups_by_id_ordered() {
        let results = search(corpus(), &params(""));
        assert_eq!(results.total_hits, 3);
        let ids: Vec<&str> = results.data.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "Beta", "Zeta"]);
        let alpha = &results.data[0];
        assert_eq!(alpha.version, "1.5.0");
        assert_eq!(alpha.versions.len(), 2);
    }

    #[test]
    fn test_prerelease_included_on_request() {
        let results = search(corpus(), &params("prerelease=true&q=alpha"));
        assert_eq!(results.total_hits, 1);
        assert_eq!(results.data[0].version, "2.0.0-beta");
        assert_eq!(results.data[0].versions.len(), 3);
    }

    #[test]
    fn test_all_terms_must_match() {
        assert_eq!(search(corpus(), &params("q=json")).total_hits, 2);
        assert_eq!(search(corpus(), &params("q=json+alpha")).total_hits, 1);
        assert_eq!(search(corpus(), &params("q=json+nothing")).total_hits, 0);
    }

    #[test]
    fn test_paging_keeps_total() {
        let results = search(corpus(), &params("skip=1&take=1"));
        assert_eq!(results.total_hits, 3);
        assert_eq!(results.data.len(), 1);
        assert_eq!(results.data[0].id, "Beta");
    }

    #[tokio::test]
    async fn test_handler_renders_search_document() {
        let fixture = Fixture::new();
        fixture.publish("Foo", "1.0.0").await;
        fixture.publish("Bar", "1.0.0").await;
        let handler = SearchQueryHandler::new(fixture.registry.clone(), fixture.backends.clone()).unwrap();

        let req = request("GET", "/api/v2/query?q=foo");
        assert!(handler.matches(&req));
        let json = body_json(handler.handle(req, &ctx()).await.unwrap()).await;
        assert_eq!(json["totalHits"], 1);
        let hit = &json["data"][0];
        assert_eq!(hit["@type"], "Package");
        assert_eq!(hit["id"], "Foo");
        assert_eq!(hit["projectUrl"], "https://example.com/Foo");
        assert_eq!(hit["totalDownloads"], 0);
        assert!(hit.get("iconUrl").is_none());
        assert_eq!(hit["versions"][0]["version"], "1.0.0");
    }

    #[tokio::test]
    async fn test_bad_query_is_rejected() {
        let fixture = Fixture::new();
        let handler = SearchQueryHandler::new(fixture.registry.clone(), fixture.backends.clone()).unwrap();
        let err = handler.handle(request("GET", "/v3/query?take=many"), &ctx()).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
