//! The install/remove/upgrade transaction engine.
//!
//! A single install is fetch → cache → extract → link → record, with a
//! pending state row written before any filesystem side effect so a crash
//! is reclaimed on the next startup. Multi-root requests resolve
//! concurrently, merge into one deduplicated plan, and execute in
//! dependency waves under a bounded task group.

use crate::domain::{InstalledPackage, Manifest, Package, ResolvedPackage};
use crate::error::{ChatrError, Result};
use crate::linker::Linker;
use crate::resolver::Resolver;
use crate::traits::{Cache, Extractor, Fetcher, ProgressSink, State};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Aggregated outcome of a multi-root install.
#[derive(Default)]
pub struct InstallReport {
    pub installed: Vec<InstalledPackage>,
    /// Non-fatal events, e.g. a dependency that was already installed.
    pub notices: Vec<String>,
    pub failures: Vec<(String, ChatrError)>,
}

impl InstallReport {
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of removing one package.
#[derive(Debug)]
pub struct RemoveOutcome {
    pub package: InstalledPackage,
    /// Orphaned dependencies that were removed along with it.
    pub removed_deps: Vec<String>,
}

/// Outcome of upgrading one root.
pub enum UpgradeOutcome {
    Upgraded {
        from: String,
        package: InstalledPackage,
        dep_notes: Vec<String>,
    },
    UpToDate,
}

#[derive(Clone)]
pub struct Manager {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn Cache>,
    extractor: Arc<dyn Extractor>,
    state: Arc<dyn State>,
    linker: Arc<Linker>,
    formula_resolver: Resolver,
    cask_resolver: Resolver,
    packages_dir: PathBuf,
    apps_dir: PathBuf,
    progress: Option<Arc<dyn ProgressSink>>,
    semaphore: Arc<Semaphore>,
}

impl Manager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<dyn Cache>,
        extractor: Arc<dyn Extractor>,
        state: Arc<dyn State>,
        formula_resolver: Resolver,
        cask_resolver: Resolver,
        packages_dir: PathBuf,
        bin_dir: PathBuf,
        lib_dir: PathBuf,
        apps_dir: PathBuf,
        max_parallel: usize,
    ) -> Self {
        Self {
            fetcher,
            cache,
            extractor,
            state,
            linker: Arc::new(Linker::new(bin_dir, lib_dir)),
            formula_resolver,
            cask_resolver,
            packages_dir,
            apps_dir,
            progress: None,
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    fn resolver_for(&self, cask: bool) -> &Resolver {
        if cask {
            &self.cask_resolver
        } else {
            &self.formula_resolver
        }
    }

    /// Install one concrete package: fetch (or reuse the cached archive),
    /// extract, link, record.
    pub async fn install(&self, pkg: &Package) -> Result<InstalledPackage> {
        if self.state.is_installed(&pkg.name)? {
            return Err(ChatrError::AlreadyInstalled(pkg.name.clone()));
        }

        let full_version = pkg.full_version();
        let archive = if self.cache.has(&pkg.name, &full_version) {
            self.cache.path(&pkg.name, &full_version)
        } else {
            let staging = self
                .fetcher
                .fetch(pkg, self.progress.as_deref())
                .await?;
            self.cache.store(&pkg.name, &full_version, &staging)?
        };

        let pkg_path = self.packages_dir.join(&pkg.name).join(&full_version);

        let mut record = InstalledPackage {
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            revision: pkg.revision.clone(),
            url: pkg.download_url.clone(),
            path: pkg_path.clone(),
            binaries: Vec::new(),
            libs: Vec::new(),
            apps: pkg
                .apps
                .iter()
                .map(|a| self.apps_dir.join(a).to_string_lossy().into_owned())
                .collect(),
            dependencies: Vec::new(),
            is_dep: pkg.is_dep,
            is_cask: pkg.is_cask,
            installed_at: Utc::now(),
        };

        // Pending row first: if anything below is interrupted, recovery
        // reclaims the artifacts on the next startup.
        self.state.begin_install(&record)?;

        if pkg.is_cask {
            fs::create_dir_all(&self.apps_dir)?;
            let apps = self.extractor.extract_apps(&archive, &self.apps_dir)?;
            record.apps = apps
                .iter()
                .map(|a| self.apps_dir.join(a).to_string_lossy().into_owned())
                .collect();
        } else {
            // Clean target in case a previous attempt left debris.
            let _ = fs::remove_dir_all(&pkg_path);
            self.extractor.extract(&archive, &self.packages_dir)?;

            record.libs = self.linker.link_libraries(&pkg_path)?;
            record.binaries = self.linker.link_binaries(&pkg_path)?;
        }

        record.installed_at = Utc::now();
        self.state.add(&record)?;
        Ok(record)
    }

    /// Remove a package, its links, and any dependencies nothing else needs.
    pub fn remove(&self, pkg: &Package) -> Result<RemoveOutcome> {
        self.remove_impl(pkg, true)
    }

    fn remove_impl(&self, pkg: &Package, cascade: bool) -> Result<RemoveOutcome> {
        let installed = self
            .state
            .get(&pkg.name)?
            .ok_or_else(|| ChatrError::NotInstalled(pkg.name.clone()))?;

        if installed.is_cask {
            for app in &installed.apps {
                let _ = fs::remove_dir_all(app);
            }
        } else {
            self.linker.unlink_binaries(&installed.binaries)?;
            self.linker.unlink_libraries(&installed.path);
            let package_dir = self.packages_dir.join(&pkg.name);
            if package_dir.exists() {
                fs::remove_dir_all(&package_dir)?;
            }
        }

        self.state.remove(&pkg.name)?;

        let mut removed_deps = Vec::new();
        if cascade {
            for dep in &installed.dependencies {
                if self.required_by_others(dep)? {
                    continue;
                }
                let dep_pkg = Package {
                    name: dep.clone(),
                    ..Default::default()
                };
                if let Ok(outcome) = self.remove_impl(&dep_pkg, true) {
                    removed_deps.push(dep.clone());
                    removed_deps.extend(outcome.removed_deps);
                }
            }
        }

        Ok(RemoveOutcome {
            package: installed,
            removed_deps,
        })
    }

    fn required_by_others(&self, dep: &str) -> Result<bool> {
        let installed = self.state.list_installed()?;
        Ok(installed
            .values()
            .any(|pkg| pkg.dependencies.iter().any(|d| d == dep)))
    }

    /// `remove(old)` then `install(new)`; the install sees the old row gone.
    ///
    /// The removal does not cascade into the old version's dependencies:
    /// the new version still needs them, and `upgrade_root` has already
    /// refreshed any that were out of date.
    pub async fn upgrade(&self, old: &Package, new: &Package) -> Result<InstalledPackage> {
        self.remove_impl(old, false)?;
        self.install(new).await
    }

    /// Re-persist a package's record with its direct dependency names.
    pub fn set_dependencies(&self, name: &str, deps: &[String]) -> Result<()> {
        let Some(mut pkg) = self.state.get(name)? else {
            return Ok(());
        };
        pkg.dependencies = deps.to_vec();
        self.state.add(&pkg)
    }

    /// Drop state rows whose on-disk artifacts were removed externally.
    /// Returns the affected names so the caller can warn.
    pub fn reconcile(&self) -> Result<Vec<String>> {
        let installed = self.state.list_installed()?;
        let mut removed = Vec::new();

        for (name, pkg) in installed {
            let gone = if pkg.is_cask {
                !pkg.apps.is_empty() && pkg.apps.iter().all(|a| !PathBuf::from(a).exists())
            } else {
                !pkg.path.exists()
            };
            if gone {
                self.state.remove(&name)?;
                removed.push(name);
            }
        }

        removed.sort();
        Ok(removed)
    }

    pub fn list_installed(&self) -> Result<HashMap<String, InstalledPackage>> {
        self.state.list_installed()
    }

    pub fn load(&self) -> Result<Manifest> {
        self.state.load()
    }

    /// Non-dependency packages as `name-fullversion` strings.
    pub fn list(&self) -> Result<Vec<String>> {
        let manifest = self.state.load()?;
        let mut packages: Vec<String> = manifest
            .packages
            .values()
            .filter(|pkg| !pkg.is_dep)
            .map(|pkg| format!("{}-{}", pkg.name, pkg.full_version()))
            .collect();
        packages.sort();
        Ok(packages)
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()
    }

    pub fn cache_size(&self) -> Result<u64> {
        self.cache.size()
    }

    pub fn flush(&self) -> Result<()> {
        self.state.flush()
    }

    /// Resolve every requested root concurrently, merge the plans into one
    /// deduplicated topological order, and install it.
    pub async fn install_roots(
        &self,
        names: &[String],
        cask: bool,
        sha256_override: Option<&str>,
    ) -> Result<InstallReport> {
        let mut report = InstallReport::default();

        let mut tasks = JoinSet::new();
        for name in names {
            let mgr = self.clone();
            let name = name.clone();
            tasks.spawn(async move {
                let _permit = mgr.semaphore.clone().acquire_owned().await.unwrap();
                let plan = mgr.resolver_for(cask).resolve(&name).await;
                (name, plan)
            });
        }

        let mut plans: HashMap<String, Vec<ResolvedPackage>> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (name, plan) = joined.map_err(|e| anyhow::anyhow!("resolve task failed: {e}"))?;
            match plan {
                Ok(plan) => {
                    plans.insert(name, plan);
                }
                Err(e) => report.failures.push((name, e)),
            }
        }

        // Merge in request order; first appearance keeps topological
        // validity because each plan already lists a node's deps before it.
        let mut merged: Vec<ResolvedPackage> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for name in names {
            let Some(plan) = plans.remove(name) else {
                continue;
            };
            for node in plan {
                match seen.get(&node.formula.name) {
                    Some(&idx) => {
                        // A dep of one root may itself be a requested root.
                        if !node.is_dep {
                            merged[idx].is_dep = false;
                            merged[idx].already_installed = false;
                        }
                    }
                    None => {
                        seen.insert(node.formula.name.clone(), merged.len());
                        merged.push(node);
                    }
                }
            }
        }

        if let Some(sha) = sha256_override {
            for node in &mut merged {
                if !node.is_dep {
                    node.formula.sha256 = sha.to_string();
                }
            }
        }

        self.execute_plan(merged, &mut report).await;
        self.state.flush()?;
        Ok(report)
    }

    /// Install plan nodes in dependency waves: a node runs only after every
    /// dependency it has inside the plan has completed.
    async fn execute_plan(&self, plan: Vec<ResolvedPackage>, report: &mut InstallReport) {
        let plan_names: HashSet<String> = plan.iter().map(|n| n.formula.name.clone()).collect();
        let mut done: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut remaining = plan;

        while !remaining.is_empty() {
            let mut ready = Vec::new();
            let mut blocked = Vec::new();

            for node in remaining {
                let deps: Vec<&String> = node
                    .formula
                    .dependencies
                    .iter()
                    .filter(|d| plan_names.contains(*d))
                    .collect();

                if deps.iter().any(|d| failed.contains(*d)) {
                    failed.insert(node.formula.name.clone());
                    report.failures.push((
                        node.formula.name.clone(),
                        ChatrError::Other(anyhow::anyhow!("skipped: a dependency failed")),
                    ));
                } else if deps.iter().all(|d| done.contains(*d)) {
                    ready.push(node);
                } else {
                    blocked.push(node);
                }
            }

            if ready.is_empty() {
                // Unreachable on a DAG; the resolver rejects cycles.
                for node in blocked {
                    report
                        .failures
                        .push((node.formula.name.clone(), ChatrError::Cycle(node.formula.name)));
                }
                return;
            }

            let mut tasks = JoinSet::new();
            for node in ready {
                let mgr = self.clone();
                tasks.spawn(async move {
                    let _permit = mgr.semaphore.clone().acquire_owned().await.unwrap();
                    if node.already_installed {
                        return (node, Ok(None));
                    }
                    let pkg = Package::from_formula(&node.formula, node.is_dep);
                    let result = mgr.install(&pkg).await.map(Some);
                    (node, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let Ok((node, result)) = joined else {
                    continue;
                };
                let name = node.formula.name.clone();
                match result {
                    Ok(Some(pkg)) => {
                        if !node.formula.dependencies.is_empty() {
                            if let Err(e) =
                                self.set_dependencies(&name, &node.formula.dependencies)
                            {
                                tracing::warn!("failed to record dependencies for {}: {}", name, e);
                            }
                        }
                        done.insert(name);
                        report.installed.push(pkg);
                    }
                    Ok(None) => {
                        done.insert(name.clone());
                        report
                            .notices
                            .push(format!("{} already installed (dependency)", name));
                    }
                    Err(e) if e.is_already_installed() => {
                        done.insert(name.clone());
                        report.notices.push(format!("{} already installed", name));
                    }
                    Err(e) => {
                        failed.insert(name.clone());
                        report.failures.push((name, e));
                    }
                }
            }

            remaining = blocked;
        }
    }

    /// Upgrade one root: refresh out-of-date dependencies first, then the
    /// root itself.
    pub async fn upgrade_root(&self, name: &str) -> Result<UpgradeOutcome> {
        let installed = self
            .state
            .get(name)?
            .ok_or_else(|| ChatrError::NotInstalled(name.to_string()))?;

        let plan = self
            .resolver_for(installed.is_cask)
            .resolve(name)
            .await?;

        let mut dep_notes = Vec::new();

        for node in plan.iter().filter(|n| n.is_dep) {
            let target = Package::from_formula(&node.formula, true);

            match self.state.get(&node.formula.name)? {
                Some(current) if current.full_version() == node.formula.full_version() => {}
                Some(current) => {
                    let old = Package {
                        name: current.name.clone(),
                        version: current.version.clone(),
                        revision: current.revision.clone(),
                        is_cask: current.is_cask,
                        ..Default::default()
                    };
                    match self.upgrade(&old, &target).await {
                        Ok(pkg) => dep_notes.push(format!(
                            "{} {} → {} (dependency)",
                            pkg.name,
                            current.full_version(),
                            pkg.full_version()
                        )),
                        Err(e) => dep_notes.push(format!(
                            "{}: {} (skipped)",
                            node.formula.name, e
                        )),
                    }
                }
                None => match self.install(&target).await {
                    Ok(pkg) => dep_notes
                        .push(format!("{}-{} (dependency)", pkg.name, pkg.full_version())),
                    Err(e) => {
                        dep_notes.push(format!("{}: {} (skipped)", node.formula.name, e))
                    }
                },
            }
        }

        let root = &plan
            .last()
            .ok_or_else(|| ChatrError::NotFound(name.to_string()))?
            .formula;

        if installed.full_version() == root.full_version() {
            return Ok(UpgradeOutcome::UpToDate);
        }

        let old = Package {
            name: installed.name.clone(),
            version: installed.version.clone(),
            revision: installed.revision.clone(),
            is_cask: installed.is_cask,
            ..Default::default()
        };
        let new = Package::from_formula(root, false);
        let from = installed.full_version();

        let package = self.upgrade(&old, &new).await?;
        if !root.dependencies.is_empty() {
            self.set_dependencies(&package.name, &root.dependencies)?;
        }
        self.state.flush()?;

        Ok(UpgradeOutcome::Upgraded {
            from,
            package,
            dep_notes,
        })
    }
}
