//! Chatr library - user-scope package management for Homebrew bottles.
//!
//! This library fetches prebuilt artifacts from the Homebrew JSON API,
//! verifies them, installs them into a versioned per-user prefix, and links
//! runnable entry points onto a user-owned search path. The CLI in
//! `main.rs` is a thin layer over these modules.
//!
//! # Architecture
//!
//! - **registry.rs**: Homebrew JSON API client (formula and cask flavors)
//! - **resolver.rs**: Concurrent dependency resolution into install plans
//! - **fetcher.rs**: Archive download with GHCR auth and SHA-256 checks
//! - **cache.rs**: Content-addressed archive cache
//! - **extract/**: tar/zip/dmg/pkg unpacking
//! - **linker.rs**: bin/lib symlink farms and rpath patching
//! - **state.rs**: SQLite package catalog with crash recovery
//! - **manager.rs**: The install/remove/upgrade transaction engine
//!
//! # Quick Start
//!
//! ```no_run
//! use chatr::{Config, build_manager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = Config::load()?;
//!     let manager = build_manager(&cfg, false)?;
//!
//!     let report = manager.install_roots(&["wget".into()], false, None).await?;
//!     for pkg in &report.installed {
//!         println!("installed {} {}", pkg.name, pkg.full_version());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod linker;
pub mod manager;
pub mod platform;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod state;
pub mod traits;

pub use cache::DiskCache;
pub use config::Config;
pub use domain::{Formula, InstalledPackage, Manifest, Package, ResolvedPackage};
pub use error::{ChatrError, Result};
pub use extract::ArchiveExtractor;
pub use fetcher::HttpFetcher;
pub use manager::{InstallReport, Manager, RemoveOutcome, UpgradeOutcome};
pub use registry::{HttpRegistry, RegistryKind};
pub use resolver::Resolver;
pub use state::SqliteState;
pub use traits::{Cache, Extractor, Fetcher, ProgressSink, Registry, State};

use std::sync::Arc;

/// Wire the real implementations into a [`Manager`] for the given config.
pub fn build_manager(cfg: &Config, with_progress: bool) -> Result<Manager> {
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(cfg.cache_dir.clone())?);
    let cache: Arc<dyn Cache> = Arc::new(DiskCache::new(cfg.cache_dir.clone())?);
    let extractor: Arc<dyn Extractor> = Arc::new(ArchiveExtractor::new());
    let state: Arc<dyn State> = Arc::new(SqliteState::new(&cfg.state_db, &cfg.manifest_file)?);

    let formulae: Arc<dyn Registry> = Arc::new(HttpRegistry::formulae(cfg.cache_dir.clone())?);
    let casks: Arc<dyn Registry> = Arc::new(HttpRegistry::casks(cfg.cache_dir.clone())?);

    let manager = Manager::new(
        fetcher,
        cache,
        extractor,
        state.clone(),
        Resolver::new(formulae, state.clone()),
        Resolver::new(casks, state),
        cfg.packages_dir.clone(),
        cfg.bin_dir.clone(),
        cfg.lib_dir.clone(),
        cfg.apps_dir.clone(),
        cfg.max_parallel,
    );

    Ok(if with_progress {
        manager.with_progress(Arc::new(progress::DownloadProgress::new()))
    } else {
        manager
    })
}

/// Registry handle alone, for commands that never touch the manager.
pub fn build_registry(cfg: &Config, cask: bool) -> Result<Arc<dyn Registry>> {
    Ok(if cask {
        Arc::new(HttpRegistry::casks(cfg.cache_dir.clone())?)
    } else {
        Arc::new(HttpRegistry::formulae(cfg.cache_dir.clone())?)
    })
}
