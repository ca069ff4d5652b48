//! Content-addressed archive cache.
//!
//! Downloaded archives are kept at `<cacheDir>/<name>/<version>/package<ext>`
//! so a reinstall of the same (name, version) never re-downloads.

use crate::domain::archive_ext;
use crate::error::Result;
use crate::traits::Cache;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub struct DiskCache {
    dir: PathBuf,
    // Entries never collide (keyed by name and version), so stores run in
    // parallel under the read side; only clear takes the tree exclusively.
    lock: RwLock<()>,
}

impl DiskCache {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: RwLock::new(()),
        })
    }

    fn entry_path(&self, name: &str, version: &str) -> PathBuf {
        let actual = if version == "latest" {
            self.latest_version(name).unwrap_or_else(|| version.to_string())
        } else {
            version.to_string()
        };

        let dir = self.dir.join(name).join(&actual);
        for ext in crate::domain::SUPPORTED_EXTENSIONS {
            let path = dir.join(format!("package{}", ext));
            if path.exists() {
                return path;
            }
        }

        dir.join("package.tar.gz")
    }

    /// Lexicographically greatest version subdirectory. Only correct when
    /// versions are same-length zero-padded; kept as the compatibility rule.
    fn latest_version(&self, name: &str) -> Option<String> {
        let mut versions: Vec<String> = fs::read_dir(self.dir.join(name))
            .ok()?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        versions.sort();
        versions.pop()
    }
}

impl Cache for DiskCache {
    fn has(&self, name: &str, version: &str) -> bool {
        let _guard = self.lock.read().unwrap();
        self.entry_path(name, version).exists()
    }

    fn path(&self, name: &str, version: &str) -> PathBuf {
        let _guard = self.lock.read().unwrap();
        self.entry_path(name, version)
    }

    fn store(&self, name: &str, version: &str, src: &Path) -> Result<PathBuf> {
        let _guard = self.lock.read().unwrap();

        let ext = src
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(archive_ext)
            .unwrap_or(".tar.gz");

        let dest_dir = self.dir.join(name).join(version);
        fs::create_dir_all(&dest_dir)?;
        let dest = dest_dir.join(format!("package{}", ext));

        // rename does not cross filesystems; fall back to copy + delete.
        if fs::rename(src, &dest).is_err() {
            fs::copy(src, &dest)?;
            fs::remove_file(src)?;
        }

        Ok(dest)
    }

    fn size(&self) -> Result<u64> {
        let _guard = self.lock.read().unwrap();

        let mut total = 0u64;
        for entry in walkdir::WalkDir::new(&self.dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                total += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(total)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().unwrap();
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}
