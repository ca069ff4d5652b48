//! Dmg pipeline: mount read-only via `hdiutil`, copy with `ditto` so
//! extended attributes and code signatures survive, detach on every exit
//! path.

#[cfg(target_os = "macos")]
pub use imp::{extract, extract_apps};

#[cfg(not(target_os = "macos"))]
pub use stub::{extract, extract_apps};

#[cfg(target_os = "macos")]
mod imp {
    use crate::error::Result;
    use anyhow::{bail, Context};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::process::Command;

    /// Mounted image; dropping detaches the volume.
    struct MountPoint {
        path: PathBuf,
    }

    impl Drop for MountPoint {
        fn drop(&mut self) {
            let _ = Command::new("hdiutil")
                .args(["detach", "-quiet"])
                .arg(&self.path)
                .status();
        }
    }

    fn attach(src: &Path) -> Result<MountPoint> {
        let dir = tempfile_dir()?;
        let status = Command::new("hdiutil")
            .args(["attach", "-nobrowse", "-readonly", "-mountpoint"])
            .arg(&dir)
            .arg(src)
            .status()
            .context("failed to run hdiutil")?;
        if !status.success() {
            bail!("hdiutil attach failed for {}", src.display());
        }
        Ok(MountPoint { path: dir })
    }

    fn tempfile_dir() -> Result<PathBuf> {
        let dir = std::env::temp_dir().join(format!("chatr-dmg-{}", std::process::id()));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn ditto(from: &Path, to: &Path) -> Result<()> {
        let status = Command::new("ditto")
            .arg(from)
            .arg(to)
            .status()
            .context("failed to run ditto")?;
        if !status.success() {
            bail!("ditto failed copying {}", from.display());
        }
        Ok(())
    }

    pub fn extract(src: &Path, dest: &Path) -> Result<()> {
        let mount = attach(src)?;
        fs::create_dir_all(dest)?;
        ditto(&mount.path, dest)
    }

    /// Copy only the top-level `.app` bundles, reporting their names.
    pub fn extract_apps(src: &Path, dest: &Path) -> Result<Vec<String>> {
        let mount = attach(src)?;
        fs::create_dir_all(dest)?;

        let mut apps = Vec::new();
        for entry in fs::read_dir(&mount.path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".app") {
                ditto(&entry.path(), &dest.join(&name))?;
                apps.push(name);
            }
        }
        Ok(apps)
    }
}

#[cfg(not(target_os = "macos"))]
mod stub {
    use crate::error::{ChatrError, Result};
    use std::path::Path;

    pub fn extract(_src: &Path, _dest: &Path) -> Result<()> {
        Err(ChatrError::PlatformUnsupported("dmg"))
    }

    pub fn extract_apps(_src: &Path, _dest: &Path) -> Result<Vec<String>> {
        Err(ChatrError::PlatformUnsupported("dmg"))
    }
}
