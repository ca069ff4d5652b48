//! Tar pipeline with magic-number compression sniffing.

use crate::error::Result;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const XZ_MAGIC: [u8; 6] = [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
const BZIP2_MAGIC: [u8; 2] = [0x42, 0x5a];

pub fn extract(src: &Path, dest: &Path) -> Result<()> {
    let mut file = File::open(src)?;
    let reader = decompressor(&mut file)?;
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        super::reject_traversal(&name)?;

        let target = dest.join(&name);

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs::create_dir_all(&target)?;
            }
            tar::EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                set_mode(&target, entry.header().mode().unwrap_or(0o644))?;
            }
            tar::EntryType::Symlink => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let link = entry
                    .link_name()?
                    .map(|l| l.into_owned())
                    .unwrap_or_default();
                let _ = fs::remove_file(&target);
                make_symlink(&link, &target)?;
            }
            // Hard links, fifos, and the rest are not part of bottles.
            _ => {}
        }
    }

    Ok(())
}

/// Pick a decompression wrapper by the file's first bytes, not its name.
fn decompressor(file: &mut File) -> Result<Box<dyn Read + '_>> {
    let mut magic = [0u8; 6];
    let n = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    let reader: Box<dyn Read + '_> = if n >= 4 && magic[..4] == ZSTD_MAGIC {
        Box::new(zstd::stream::read::Decoder::new(&mut *file)?)
    } else if n >= 2 && magic[..2] == GZIP_MAGIC {
        Box::new(flate2::read::GzDecoder::new(&mut *file))
    } else if n >= 6 && magic[..6] == XZ_MAGIC {
        Box::new(xz2::read::XzDecoder::new(&mut *file))
    } else if n >= 2 && magic[..2] == BZIP2_MAGIC {
        Box::new(bzip2::read::BzDecoder::new(&mut *file))
    } else {
        Box::new(&mut *file)
    };

    Ok(reader)
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
