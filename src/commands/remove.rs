use anyhow::bail;
use chatr::{build_manager, Config, Package};
use owo_colors::OwoColorize;

pub async fn run(names: &[String], all: bool, version: &str) -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let mgr = build_manager(&cfg, false)?;

    let targets: Vec<String> = if all {
        let installed = mgr.list()?;
        if installed.is_empty() {
            println!("{} No packages installed", "○".dimmed());
            return Ok(());
        }
        installed
            .iter()
            .filter_map(|entry| entry.rsplit_once('-').map(|(name, _)| name.to_string()))
            .collect()
    } else if names.is_empty() {
        bail!("remove requires at least one package name (or --all)");
    } else {
        names.to_vec()
    };

    println!();
    let mut failed = 0;
    for name in &targets {
        let pkg = Package {
            name: name.clone(),
            version: version.to_string(),
            ..Default::default()
        };
        match mgr.remove(&pkg) {
            Ok(outcome) => {
                println!(
                    "{} {}{}{} removed (with {} dependencies)",
                    "✓".green(),
                    outcome.package.name.bold(),
                    "-".bold(),
                    outcome.package.full_version().bold(),
                    outcome.removed_deps.len().green()
                );
            }
            Err(e) => {
                println!("{} {}: {}", "✗".red(), name, e);
                failed += 1;
            }
        }
    }

    mgr.flush()?;

    if failed > 0 {
        bail!("failed to remove {} package(s)", failed);
    }
    Ok(())
}
