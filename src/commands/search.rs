use chatr::{build_registry, Config};
use owo_colors::OwoColorize;

pub async fn run(query: &str, show: usize, cask: bool) -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let registry = build_registry(&cfg, cask)?;

    let spinner = chatr::progress::spinner(format!("Searching {}...", query));
    let results = registry.search(query).await;
    spinner.finish_and_clear();
    let results = results?;

    if results.is_empty() {
        println!("{} No results found for {:?}", "○".dimmed(), query);
        return Ok(());
    }

    let size = results.len().min(show);
    println!(
        "\nShowing {} of {} results for {:?}\n",
        size.green(),
        results.len().green(),
        query
    );

    for formula in results.iter().take(size) {
        println!("{} {}", "●".green(), formula.name.bold());
        println!("  {} {}", "version:".cyan(), formula.version);
        if !formula.description.is_empty() {
            println!("  {} {}", "desc:".cyan(), formula.description);
        }
        if !formula.homepage.is_empty() {
            println!("  {} {}", "url:".cyan(), formula.homepage.dimmed());
        }
        println!();
    }

    if results.len() > size {
        println!(
            "{} {} more available, use {} to see all",
            "...".dimmed(),
            results.len() - size,
            format!("--show {}", results.len()).cyan()
        );
    }

    Ok(())
}
