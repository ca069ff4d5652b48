//! Zip pipeline. Symlink entries are detected by the Unix mode bits and the
//! entry body holds the link target.

use crate::error::Result;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

pub fn extract(src: &Path, dest: &Path) -> Result<()> {
    let file = File::open(src)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| anyhow::anyhow!("zip: {}", e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| anyhow::anyhow!("zip: {}", e))?;
        let name = entry.name().to_string();
        super::reject_traversal(&name)?;

        let target = dest.join(&name);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mode = entry.unix_mode().unwrap_or(0o644);

        if mode & S_IFMT == S_IFLNK {
            let mut link = String::new();
            entry.read_to_string(&mut link)?;
            let _ = fs::remove_file(&target);
            make_symlink(Path::new(&link), &target)?;
            continue;
        }

        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        set_mode(&target, mode)?;
    }

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_symlink(_link: &Path, _target: &Path) -> Result<()> {
    Ok(())
}
