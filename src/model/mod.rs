//! The indexable representation of an ingested module.
//!
//! Everything here is produced by one ingestion, handed to the data
//! source for persistence, and never mutated afterwards. Units reference
//! packages by path, not by pointer, so the tree stays acyclic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::licenses::{License, LicenseMetadata};
use crate::source::SourceInfo;

/// Basic, persisted information about a module version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub module_path: String,
    pub version: String,
    pub commit_time: Option<DateTime<Utc>>,
    pub is_redistributable: bool,
    pub has_go_mod: bool,
    pub source_info: Option<SourceInfo>,
}

/// A versioned collection of packages rooted at a module path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub module_info: ModuleInfo,
    /// Path of the README sitting at the module root, if any.
    pub readme_file_path: Option<String>,
    pub readme_contents: Option<String>,
    pub packages: Vec<Package>,
    pub licenses: Vec<License>,
    pub units: Vec<Unit>,
}

/// A buildable unit of source files sharing one package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Import path: module path joined with the directory inside the
    /// module (for the standard library, the directory alone).
    pub path: String,
    pub name: String,
    pub synopsis: String,
    pub v1_path: String,
    pub imports: Vec<String>,
    pub documentation_html: String,
    pub goos: String,
    pub goarch: String,
    pub is_redistributable: bool,
    pub licenses: Vec<LicenseMetadata>,
}

/// A README-like file, path relative to the module root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readme {
    pub filepath: String,
    pub contents: String,
}

/// Identity shared by every node in the unit tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMeta {
    pub path: String,
    pub module_path: String,
    pub version: String,
    /// Package name when the unit is a package, empty otherwise.
    pub name: String,
    pub is_redistributable: bool,
}

/// Rendered documentation for a package unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Documentation {
    pub synopsis: String,
    pub html: String,
    pub goos: String,
    pub goarch: String,
}

/// A directory-level node in the module's tree.
///
/// There is one unit per directory from the module root down to every
/// package directory; intermediate directories get empty units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub meta: UnitMeta,
    pub readme: Option<Readme>,
    pub documentation: Option<Documentation>,
    pub imports: Vec<String>,
    /// Metadata for the licenses that apply to this directory.
    pub licenses: Vec<LicenseMetadata>,
    /// Full license texts; only populated at the module root.
    pub license_contents: Vec<License>,
}

/// Terminal outcome for one package path considered during ingestion,
/// including directories rejected before their contents were read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersionState {
    pub module_path: String,
    pub package_path: String,
    pub version: String,
    pub status: u16,
    pub error: Option<String>,
}

/// A version-map row: the recorded status of one `(module path,
/// requested version)` pair, written by ingestion and read by the
/// on-demand coordinator's polling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMap {
    pub module_path: String,
    pub requested_version: String,
    pub resolved_version: Option<String>,
    pub status: u16,
    pub error: Option<String>,
}

/// The import path a package would have had in major version 1.
///
/// Strips a `/vN` (N ≥ 2) suffix from the module-path portion of
/// `import_path`, leaving the directory inside the module untouched.
#[must_use]
pub fn v1_path(import_path: &str, module_path: &str) -> String {
    let series = series_path(module_path);
    if import_path == module_path {
        return series.to_string();
    }
    match import_path.strip_prefix(module_path) {
        Some(inner) => format!("{series}{inner}"),
        None => import_path.to_string(),
    }
}

/// The module path without its major-version suffix.
fn series_path(module_path: &str) -> &str {
    if let Some((prefix, last)) = module_path.rsplit_once('/') {
        if let Some(n) = last.strip_prefix('v') {
            if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) && n != "0" && n != "1" {
                return prefix;
            }
        }
    }
    module_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_map_serde_round_trip() {
        let entry = VersionMap {
            module_path: "github.com/module".to_string(),
            requested_version: "latest".to_string(),
            resolved_version: Some("v1.5.2".to_string()),
            status: 200,
            error: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"status\":200"));
        let back: VersionMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_v1_path_without_major_suffix() {
        assert_eq!(
            v1_path("github.com/module/bar/foo", "github.com/module"),
            "github.com/module/bar/foo"
        );
    }

    #[test]
    fn test_v1_path_strips_major_suffix() {
        assert_eq!(
            v1_path("github.com/module/v2/bar", "github.com/module/v2"),
            "github.com/module/bar"
        );
        assert_eq!(v1_path("github.com/module/v3", "github.com/module/v3"), "github.com/module");
    }

    #[test]
    fn test_v1_path_keeps_v1_and_v0_elements() {
        assert_eq!(v1_path("github.com/module/v1", "github.com/module/v1"), "github.com/module/v1");
        assert_eq!(v1_path("example.com/m/v0/a", "example.com/m/v0"), "example.com/m/v0/a");
    }

    #[test]
    fn test_v1_path_ignores_versionish_directories() {
        // The suffix rule applies to the module path, not inner dirs.
        assert_eq!(
            v1_path("github.com/module/v2/sub", "github.com/module"),
            "github.com/module/v2/sub"
        );
    }
}
