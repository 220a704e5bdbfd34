//! Package version helpers.
//!
//! Versions are compared with SemVer rules where they parse, after padding
//! `1.0` to `1.0.0`; four-part and otherwise odd versions fall back to a
//! numeric-aware segment comparison.

use semver::Version;
use std::cmp::Ordering;

/// Lower-cased version without build metadata, used in URLs and lookups.
pub fn normalize(version: &str) -> String {
    version
        .split('+')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

pub fn is_prerelease(version: &str) -> bool {
    normalize(version).contains('-')
}

fn parse(version: &str) -> Option<Version> {
    let normalized = normalize(version);
    let (release, pre) = match normalized.split_once('-') {
        Some((r, p)) => (r.to_string(), Some(p.to_string())),
        None => (normalized.clone(), None),
    };
    let mut parts: Vec<&str> = release.split('.').collect();
    if parts.len() > 3 {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    let padded = match pre {
        Some(pre) => format!("{}-{}", parts.join("."), pre),
        None => parts.join("."),
    };
    Version::parse(&padded).ok()
}

/// Order two versions, lowest first.
pub fn compare(left: &str, right: &str) -> Ordering {
    match (parse(left), parse(right)) {
        (Some(l), Some(r)) => l.cmp(&r),
        _ => compare_segments(&normalize(left), &normalize(right)),
    }
}

fn compare_segments(left: &str, right: &str) -> Ordering {
    let mut l = left.split(['.', '-']);
    let mut r = right.split(['.', '-']);
    loop {
        match (l.next(), r.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) => {
                let ord = match (a.parse::<u64>(), b.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    _ => a.cmp(b),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Versions are the same package version (case- and metadata-insensitive).
pub fn same(left: &str, right: &str) -> bool {
    normalize(left) == normalize(right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("1.0.0-Beta+abc"), "1.0.0-beta");
        assert_eq!(normalize("2.1.0"), "2.1.0");
    }

    #[test]
    fn test_prerelease() {
        assert!(is_prerelease("1.0.0-rc.1"));
        assert!(!is_prerelease("1.0.0+build-5"));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare("1.0.0-beta", "1.0.0"), Ordering::Less);
        assert_eq!(compare("1.0.0.2", "1.0.0.10"), Ordering::Less);
    }

    #[test]
    fn test_sort_versions() {
        let mut versions = vec!["2.0.0", "1.0.0-alpha", "1.0.0", "10.0.0"];
        versions.sort_by(|a, b| compare(a, b));
        assert_eq!(versions, vec!["1.0.0-alpha", "1.0.0", "2.0.0", "10.0.0"]);
    }
}
