//! Logical resource kinds exposed by the feed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A logical capability advertised in the service index.
///
/// Variant names double as configuration keys in the `[resources]` table.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    ServiceIndex,
    PackageBaseAddress,
    PackagePublish,
    SearchQueryService,
    SearchQueryService_3_0_0_beta,
    SearchQueryService_3_0_0_rc,
    SearchAutocompleteService,
}

impl ResourceType {
    /// Every variant, in service-index order.
    pub const ALL: [ResourceType; 7] = [
        ResourceType::ServiceIndex,
        ResourceType::PackageBaseAddress,
        ResourceType::PackagePublish,
        ResourceType::SearchQueryService,
        ResourceType::SearchQueryService_3_0_0_beta,
        ResourceType::SearchQueryService_3_0_0_rc,
        ResourceType::SearchAutocompleteService,
    ];

    /// The `@type` identifier clients look for in the service index.
    pub fn type_id(&self) -> &'static str {
        match self {
            ResourceType::ServiceIndex => "ServiceIndex",
            ResourceType::PackageBaseAddress => "PackageBaseAddress/3.0.0",
            ResourceType::PackagePublish => "PackagePublish/2.0.0",
            ResourceType::SearchQueryService => "SearchQueryService",
            ResourceType::SearchQueryService_3_0_0_beta => "SearchQueryService/3.0.0-beta",
            ResourceType::SearchQueryService_3_0_0_rc => "SearchQueryService/3.0.0-rc",
            ResourceType::SearchAutocompleteService => "SearchAutocompleteService",
        }
    }

    /// Human readable comment attached to the service index entry.
    pub fn comment(&self) -> &'static str {
        match self {
            ResourceType::ServiceIndex => "Service index",
            ResourceType::PackageBaseAddress => "Base URL of where package content is stored",
            ResourceType::PackagePublish => "Push and delete (or unlist) packages",
            ResourceType::SearchQueryService
            | ResourceType::SearchQueryService_3_0_0_beta
            | ResourceType::SearchQueryService_3_0_0_rc => "Query endpoint of the search service",
            ResourceType::SearchAutocompleteService => "Autocomplete endpoint of the search service",
        }
    }

    /// Configuration key for this resource type.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::ServiceIndex => "ServiceIndex",
            ResourceType::PackageBaseAddress => "PackageBaseAddress",
            ResourceType::PackagePublish => "PackagePublish",
            ResourceType::SearchQueryService => "SearchQueryService",
            ResourceType::SearchQueryService_3_0_0_beta => "SearchQueryService_3_0_0_beta",
            ResourceType::SearchQueryService_3_0_0_rc => "SearchQueryService_3_0_0_rc",
            ResourceType::SearchAutocompleteService => "SearchAutocompleteService",
        }
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown resource type '{}'", s))
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
