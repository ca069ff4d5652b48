use chatr::{build_manager, build_registry, Config};
use owo_colors::OwoColorize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub async fn run(cask: bool) -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let mgr = build_manager(&cfg, false)?;
    let registry = build_registry(&cfg, cask)?;

    let removed = mgr.reconcile()?;
    if !removed.is_empty() {
        for name in removed {
            println!("{} {} removed externally", "○".dimmed(), name);
        }
        println!();
    }

    let installed = mgr.list_installed()?;
    let mut packages: Vec<_> = installed
        .values()
        .filter(|pkg| !pkg.is_dep && pkg.is_cask == cask)
        .cloned()
        .collect();
    packages.sort_by(|a, b| a.name.cmp(&b.name));

    if packages.is_empty() {
        let label = if cask { "casks" } else { "packages" };
        println!("\n{} No {} installed", "○".dimmed(), label);
        return Ok(());
    }

    // Annotate outdated entries without hammering the registry.
    let semaphore = Arc::new(Semaphore::new(cfg.max_parallel));
    let mut tasks = JoinSet::new();
    for pkg in &packages {
        let registry = registry.clone();
        let semaphore = semaphore.clone();
        let name = pkg.name.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.unwrap();
            let version = registry.get_version(&name).await.ok();
            (name, version)
        });
    }

    let mut latest: HashMap<String, String> = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok((name, Some(version))) = joined {
            latest.insert(name, version);
        }
    }

    let label = if cask {
        "Installed casks:"
    } else {
        "Installed packages:"
    };
    println!("{}\n", label);

    for pkg in &packages {
        let mut line = format!(
            " {}",
            format!("{}-{}", pkg.name, pkg.full_version()).bold()
        );
        if let Some(version) = latest.get(&pkg.name) {
            if *version != pkg.version {
                line.push_str(&format!("  {}", format!("↑ {}", version).yellow()));
            }
        }
        println!("{}", line);
    }

    Ok(())
}
