use anyhow::bail;
use chatr::{build_manager, Config};
use owo_colors::OwoColorize;

pub async fn run(names: &[String], sha256: Option<&str>, cask: bool) -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let mgr = build_manager(&cfg, true)?;

    let spinner = chatr::progress::spinner(format!("Resolving {}...", names.join(", ")));
    let report = mgr.install_roots(names, cask, sha256).await?;
    spinner.finish_and_clear();

    println!();
    for pkg in &report.installed {
        println!(
            "{} {}{}{}",
            "✓".green(),
            pkg.name.bold(),
            "-".bold(),
            pkg.full_version().bold()
        );
        println!(
            "  {} {}",
            "cache:".cyan(),
            cfg.cache_dir.join(&pkg.name).display()
        );
        println!("  {} {}", "path:".cyan(), pkg.path.display());
    }

    for notice in &report.notices {
        println!("{} {}", "○".dimmed(), notice);
    }

    if !report.failures.is_empty() {
        println!();
        for (name, err) in &report.failures {
            println!("{} {}: {}", "✗".red(), name, err);
        }
        bail!("failed to install {} package(s)", report.failures.len());
    }

    Ok(())
}
