//! On-disk layout and parallelism settings, read once at startup.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const DEFAULT_MAX_PARALLEL: usize = 8;

/// Read-only configuration describing the `~/.chatr` tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chatr_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub apps_dir: PathBuf,
    pub state_db: PathBuf,
    pub manifest_file: PathBuf,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

impl Config {
    /// Defaults rooted at `base` (normally `~/.chatr`).
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            cache_dir: base.join("cache"),
            packages_dir: base.join("packages"),
            bin_dir: base.join("bin"),
            lib_dir: base.join("lib"),
            apps_dir: default_apps_dir(&base),
            state_db: base.join("state.db"),
            manifest_file: base.join("installed.json"),
            chatr_dir: base,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    fn default_base() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatr")
    }

    /// Load `config.toml` from the default base, falling back to (and
    /// persisting) defaults when it does not exist.
    pub fn load() -> Result<Self> {
        let base = Self::default_base();
        let path = base.join("config.toml");

        if !path.exists() {
            let cfg = Self::with_base(base);
            cfg.save()?;
            return Ok(cfg);
        }

        let raw = fs::read_to_string(&path)?;
        let cfg: Config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))?;
        Ok(cfg)
    }

    pub fn save(&self) -> Result<()> {
        let path = self.chatr_dir.join("config.toml");
        fs::create_dir_all(&self.chatr_dir)?;
        let raw = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("failed to serialize config: {}", e))?;
        fs::write(path, raw)?;
        Ok(())
    }
}

/// Casks land in the user's Applications folder on macOS; everywhere else
/// they stay under the chatr base.
fn default_apps_dir(base: &std::path::Path) -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        let _ = base;
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Applications")
    }
    #[cfg(not(target_os = "macos"))]
    {
        base.join("apps")
    }
}
