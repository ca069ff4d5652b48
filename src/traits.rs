//! Capability traits at the seams between subsystems.
//!
//! The manager and resolver only ever see these contracts, which keeps the
//! real implementations swappable for test doubles.

use crate::domain::{Formula, InstalledPackage, Manifest, Package};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Byte-level download progress reporting.
pub trait ProgressSink: Send + Sync {
    fn start(&self, name: &str, total: Option<u64>);
    fn advance(&self, name: &str, bytes: u64);
    fn finish(&self, name: &str);
}

/// Upstream metadata source, either the formula or the cask API.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Look up a single formula by canonical name.
    async fn get(&self, name: &str) -> Result<Formula>;

    /// Search the bulk index by name or description substring.
    async fn search(&self, query: &str) -> Result<Vec<Formula>>;

    /// Latest stable version of a formula.
    async fn get_version(&self, name: &str) -> Result<String> {
        Ok(self.get(name).await?.version)
    }
}

/// Archive downloader with checksum verification.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `pkg` to a staging path and return it.
    async fn fetch(&self, pkg: &Package, progress: Option<&dyn ProgressSink>) -> Result<PathBuf>;
}

/// Content-addressed archive store keyed by (name, version).
pub trait Cache: Send + Sync {
    fn has(&self, name: &str, version: &str) -> bool;
    fn path(&self, name: &str, version: &str) -> PathBuf;
    /// Relocate a downloaded file into the cache, returning the final path.
    fn store(&self, name: &str, version: &str, src: &Path) -> Result<PathBuf>;
    fn size(&self) -> Result<u64>;
    fn clear(&self) -> Result<()>;
}

/// Format-dispatched archive unpacking.
pub trait Extractor: Send + Sync {
    fn extract(&self, src: &Path, dest: &Path) -> Result<()>;
    /// Extract only top-level `.app` bundles and report their names.
    fn extract_apps(&self, src: &Path, dest: &Path) -> Result<Vec<String>>;
}

/// Durable package catalog.
pub trait State: Send + Sync {
    fn load(&self) -> Result<Manifest>;
    fn save(&self, manifest: &Manifest) -> Result<()>;
    fn is_installed(&self, name: &str) -> Result<bool>;
    fn get(&self, name: &str) -> Result<Option<InstalledPackage>>;
    /// Upsert with status `installed`.
    fn add(&self, pkg: &InstalledPackage) -> Result<()>;
    /// Upsert with status `pending`; reclaimed by recovery if never promoted.
    fn begin_install(&self, pkg: &InstalledPackage) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
    fn list_installed(&self) -> Result<HashMap<String, InstalledPackage>>;
    /// Mirror the installed set to the JSON manifest file.
    fn flush(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
}
