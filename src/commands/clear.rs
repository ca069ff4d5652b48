use chatr::{Config, DiskCache};
use chatr::traits::Cache;
use owo_colors::OwoColorize;

pub fn run() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let cache = DiskCache::new(cfg.cache_dir)?;

    let size = cache.size().unwrap_or(0);
    cache.clear()?;

    println!(
        "{} Cache cleared ({} freed)",
        "✓".green(),
        super::format_size(size)
    );
    Ok(())
}
