//! Core data model shared by every subsystem.
//!
//! A [`Package`] is a request to install one concrete artifact; a [`Formula`]
//! is registry metadata with the download URL already selected for the host
//! platform; an [`InstalledPackage`] is the durable record the state store
//! keeps per name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Archive suffixes the cache, fetcher, and extractor agree on.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tbz2", ".tar.zst", ".tzst", ".tar",
    ".zip", ".dmg", ".pkg",
];

/// Match `name` against the supported extension set, longest suffix wins.
pub fn archive_ext(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .filter(|ext| lower.ends_with(*ext))
        .max_by_key(|ext| ext.len())
        .copied()
}

/// `version` if the revision is empty or "0", otherwise `version_revision`.
pub fn format_version(version: &str, revision: &str) -> String {
    if revision.is_empty() || revision == "0" {
        version.to_string()
    } else {
        format!("{}_{}", version, revision)
    }
}

/// A concrete install/remove request handed to the manager.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub revision: String,
    pub download_url: String,
    pub sha256: String,
    pub is_dep: bool,
    pub is_cask: bool,
    /// Expected app bundle names for casks; lets an interrupted cask install
    /// be reclaimed before the bundles are discovered on disk.
    pub apps: Vec<String>,
}

impl Package {
    pub fn full_version(&self) -> String {
        format_version(&self.version, &self.revision)
    }

    /// Build a request from registry metadata.
    pub fn from_formula(f: &Formula, is_dep: bool) -> Self {
        Self {
            name: f.name.clone(),
            version: f.version.clone(),
            revision: f.revision.clone(),
            download_url: f.url.clone(),
            sha256: f.sha256.clone(),
            is_dep,
            is_cask: f.is_cask,
            apps: f.apps.clone(),
        }
    }
}

/// Registry metadata with the platform-specific URL already selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    pub description: String,
    pub homepage: String,
    pub version: String,
    #[serde(default)]
    pub revision: String,
    pub url: String,
    pub sha256: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub is_cask: bool,
    /// App bundle names for casks, empty for formulae.
    #[serde(default)]
    pub apps: Vec<String>,
}

impl Formula {
    pub fn full_version(&self) -> String {
        format_version(&self.version, &self.revision)
    }
}

/// One entry of a resolved install plan.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub formula: Formula,
    /// False only for the requested root.
    pub is_dep: bool,
    /// True iff this is a dependency the state store already has installed.
    pub already_installed: bool,
}

/// Durable record of one installed package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub revision: String,
    pub url: String,
    pub path: PathBuf,
    #[serde(default)]
    pub binaries: Vec<String>,
    #[serde(default)]
    pub libs: Vec<String>,
    #[serde(default)]
    pub apps: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub is_dep: bool,
    #[serde(default)]
    pub is_cask: bool,
    pub installed_at: DateTime<Utc>,
}

impl InstalledPackage {
    pub fn full_version(&self) -> String {
        format_version(&self.version, &self.revision)
    }
}

/// The installed set, keyed by package name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub packages: HashMap<String, InstalledPackage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_version_without_revision() {
        assert_eq!(format_version("1.21.4", ""), "1.21.4");
        assert_eq!(format_version("1.21.4", "0"), "1.21.4");
    }

    #[test]
    fn full_version_with_revision() {
        assert_eq!(format_version("1.21.4", "2"), "1.21.4_2");
        assert_eq!(format_version("8.0", "1"), "8.0_1");
    }

    #[test]
    fn archive_ext_matches_longest_suffix() {
        assert_eq!(archive_ext("pkg.tar.gz"), Some(".tar.gz"));
        assert_eq!(archive_ext("pkg.tgz"), Some(".tgz"));
        assert_eq!(archive_ext("pkg.tar.zst"), Some(".tar.zst"));
        assert_eq!(archive_ext("pkg.tar"), Some(".tar"));
        assert_eq!(archive_ext("Firefox.dmg"), Some(".dmg"));
    }

    #[test]
    fn archive_ext_is_case_insensitive() {
        assert_eq!(archive_ext("App.ZIP"), Some(".zip"));
        assert_eq!(archive_ext("Tool.TAR.GZ"), Some(".tar.gz"));
    }

    #[test]
    fn archive_ext_rejects_unknown() {
        assert_eq!(archive_ext("pkg.rar"), None);
        assert_eq!(archive_ext("pkg"), None);
    }
}
