use anyhow::bail;
use chatr::{build_manager, Config, UpgradeOutcome};
use owo_colors::OwoColorize;
use tokio::task::JoinSet;

pub async fn run(names: &[String], all: bool) -> anyhow::Result<()> {
    if names.is_empty() && !all {
        bail!("upgrade requires at least one package name (or --all)");
    }

    let cfg = Config::load()?;
    let mgr = build_manager(&cfg, true)?;

    for name in mgr.reconcile()? {
        println!("{} {} removed externally", "○".dimmed(), name);
    }

    let installed = mgr.list_installed()?;
    if installed.is_empty() {
        println!("{} No packages installed", "○".dimmed());
        return Ok(());
    }

    let targets: Vec<String> = if all {
        let mut roots: Vec<String> = installed
            .values()
            .filter(|pkg| !pkg.is_dep)
            .map(|pkg| pkg.name.clone())
            .collect();
        roots.sort();
        roots
    } else {
        names.to_vec()
    };

    let spinner = chatr::progress::spinner(format!("Upgrading {} package(s)...", targets.len()));

    let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(cfg.max_parallel));
    let mut tasks = JoinSet::new();
    for name in targets {
        let mgr = mgr.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.unwrap();
            let outcome = mgr.upgrade_root(&name).await;
            (name, outcome)
        });
    }

    let mut upgraded = Vec::new();
    let mut up_to_date = Vec::new();
    let mut failures = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        let Ok((name, outcome)) = joined else {
            continue;
        };
        match outcome {
            Ok(UpgradeOutcome::Upgraded { from, package, dep_notes }) => {
                upgraded.push((name, from, package, dep_notes));
            }
            Ok(UpgradeOutcome::UpToDate) => up_to_date.push(name),
            Err(e) => failures.push((name, e)),
        }
    }
    spinner.finish_and_clear();

    println!();
    for (_, from, pkg, dep_notes) in &upgraded {
        for note in dep_notes {
            println!("  {} {}", "↳".dimmed(), note);
        }
        println!(
            "{} {}{}{} → {}",
            "✓".green(),
            pkg.name.bold(),
            "-".bold(),
            from.bold(),
            pkg.full_version().bold()
        );
        println!("  {} {}", "path:".cyan(), pkg.path.display());
    }

    up_to_date.sort();
    for name in &up_to_date {
        println!("{} {} already up-to-date", "○".dimmed(), name);
    }

    if !failures.is_empty() {
        for (name, e) in &failures {
            println!("{} {}: {}", "✗".red(), name, e);
        }
        bail!("failed to upgrade {} package(s)", failures.len());
    }

    Ok(())
}
