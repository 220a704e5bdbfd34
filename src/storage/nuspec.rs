//! Package manifest (`.nuspec`) parsing and extraction.

use serde::Deserialize;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::storage::{Dependency, DependencyGroup, PackageRecord, StorageError};

#[derive(Debug, Deserialize)]
struct NuspecDocument {
    metadata: NuspecMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NuspecMetadata {
    id: String,
    version: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    project_url: Option<String>,
    #[serde(default)]
    icon_url: Option<String>,
    #[serde(default)]
    license_url: Option<String>,
    #[serde(default)]
    dependencies: Option<NuspecDependencies>,
}

#[derive(Debug, Default, Deserialize)]
struct NuspecDependencies {
    #[serde(default, rename = "group")]
    groups: Vec<NuspecGroup>,
    #[serde(default, rename = "dependency")]
    dependencies: Vec<NuspecDependency>,
}

#[derive(Debug, Deserialize)]
struct NuspecGroup {
    #[serde(default, rename = "@targetFramework")]
    target_framework: Option<String>,
    #[serde(default, rename = "dependency")]
    dependencies: Vec<NuspecDependency>,
}

#[derive(Debug, Deserialize)]
struct NuspecDependency {
    #[serde(rename = "@id")]
    id: String,
    #[serde(default, rename = "@version")]
    version: Option<String>,
}

impl From<NuspecDependency> for Dependency {
    fn from(d: NuspecDependency) -> Self {
        Dependency {
            id: d.id,
            range: d.version,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse manifest XML into a record located at `location`.
pub fn parse(xml: &[u8], location: &Path) -> Result<PackageRecord, StorageError> {
    let text = std::str::from_utf8(xml)
        .map_err(|e| StorageError::Manifest(format!("manifest is not UTF-8: {}", e)))?;
    let text = text.trim_start_matches('\u{feff}');
    let document: NuspecDocument =
        quick_xml::de::from_str(text).map_err(|e| StorageError::Manifest(e.to_string()))?;
    let metadata = document.metadata;

    let id = metadata.id.trim().to_string();
    let version = metadata.version.trim().to_string();
    if !is_valid_id(&id) {
        return Err(StorageError::Manifest(format!("invalid package id '{}'", id)));
    }
    if version.is_empty() || version.contains(['/', '\\']) {
        return Err(StorageError::Manifest(format!("invalid package version '{}'", version)));
    }

    let mut dependency_groups = Vec::new();
    if let Some(deps) = metadata.dependencies {
        if !deps.dependencies.is_empty() {
            dependency_groups.push(DependencyGroup {
                target_framework: None,
                dependencies: deps.dependencies.into_iter().map(Dependency::from).collect(),
            });
        }
        for group in deps.groups {
            dependency_groups.push(DependencyGroup {
                target_framework: non_empty(group.target_framework),
                dependencies: group.dependencies.into_iter().map(Dependency::from).collect(),
            });
        }
    }

    Ok(PackageRecord {
        location: location.to_path_buf(),
        id,
        version,
        title: non_empty(metadata.title),
        authors: non_empty(metadata.authors)
            .map(|a| a.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default(),
        description: non_empty(metadata.description),
        summary: non_empty(metadata.summary),
        tags: non_empty(metadata.tags)
            .map(|t| t.split([' ', ',', ';']).filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default(),
        project_url: non_empty(metadata.project_url),
        icon_url: non_empty(metadata.icon_url),
        license_url: non_empty(metadata.license_url),
        dependency_groups,
    })
}

/// Package ids: letters, digits, `.`, `-`, `_`; no leading dot.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 100
        && !id.starts_with('.')
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// Read the root-level `.nuspec` entry out of a package archive.
pub fn extract(archive: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| StorageError::Archive(e.to_string()))?;

    let name = zip
        .file_names()
        .find(|name| !name.contains('/') && name.to_ascii_lowercase().ends_with(".nuspec"))
        .map(str::to_string)
        .ok_or_else(|| StorageError::Archive("archive contains no manifest".to_string()))?;

    let mut entry = zip
        .by_name(&name)
        .map_err(|e| StorageError::Archive(e.to_string()))?;
    let mut content = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut content)?;
    Ok(content)
}
