//! Format-dispatched archive unpacking.
//!
//! Dispatch is by file suffix; the tar pipeline additionally sniffs the
//! compression wrapper by magic number so a mislabeled tarball still
//! extracts. Every pipeline rejects entries whose path contains a `..`
//! segment so no archive can write outside its destination.

mod dmg;
mod pkg;
mod tar;
mod zip;

use crate::error::{ChatrError, Result};
use crate::traits::Extractor;
use std::fs;
use std::path::{Component, Path};

const TAR_EXTENSIONS: &[&str] = &[
    ".tar.gz", ".tar.zst", ".tar.xz", ".tar.bz2", ".tgz", ".txz", ".tzst", ".tbz2", ".tar",
];

pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for ArchiveExtractor {
    fn extract(&self, src: &Path, dest: &Path) -> Result<()> {
        let lower = src.to_string_lossy().to_lowercase();

        if lower.ends_with(".zip") {
            zip::extract(src, dest)
        } else if lower.ends_with(".dmg") {
            dmg::extract(src, dest)
        } else if lower.ends_with(".pkg") {
            pkg::extract(src, dest)
        } else if is_tar_archive(&lower) {
            tar::extract(src, dest)
        } else {
            Err(ChatrError::UnsupportedFormat(src.display().to_string()))
        }
    }

    fn extract_apps(&self, src: &Path, dest: &Path) -> Result<Vec<String>> {
        let lower = src.to_string_lossy().to_lowercase();

        if lower.ends_with(".dmg") {
            return dmg::extract_apps(src, dest);
        }

        // Other cask containers unpack into a staging directory first so
        // only this archive's bundles are reported, never neighbors already
        // living in `dest`. Staging under `dest` keeps the rename on one
        // filesystem.
        let staging = dest.join(".chatr-staging");
        let _ = fs::remove_dir_all(&staging);
        fs::create_dir_all(&staging)?;

        let result = (|| -> Result<Vec<String>> {
            self.extract(src, &staging)?;
            let mut apps = Vec::new();
            for entry in fs::read_dir(&staging)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(".app") {
                    let target = dest.join(&name);
                    let _ = fs::remove_dir_all(&target);
                    fs::rename(entry.path(), &target)?;
                    apps.push(name);
                }
            }
            Ok(apps)
        })();

        let _ = fs::remove_dir_all(&staging);
        result
    }
}

fn is_tar_archive(lower: &str) -> bool {
    TAR_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Zip-Slip defense shared by every pipeline.
fn reject_traversal(name: &str) -> Result<()> {
    if Path::new(name)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ChatrError::InvalidArchivePath(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_segments_are_rejected() {
        assert!(reject_traversal("../etc/passwd").is_err());
        assert!(reject_traversal("foo/../../bar").is_err());
        assert!(reject_traversal("foo/bar").is_ok());
        // A literal ".." inside a file name is harmless.
        assert!(reject_traversal("foo/weird..name").is_ok());
    }

    #[test]
    fn unknown_format_errors() {
        let ex = ArchiveExtractor::new();
        let err = ex
            .extract(Path::new("/tmp/archive.rar"), Path::new("/tmp/out"))
            .unwrap_err();
        assert!(matches!(err, ChatrError::UnsupportedFormat(_)));
    }

    #[test]
    fn tar_suffixes_dispatch_to_tar() {
        for name in ["a.tar.gz", "a.tgz", "a.tar.xz", "a.txz", "a.tbz2", "a.tzst", "a.tar"] {
            assert!(is_tar_archive(name));
        }
        assert!(!is_tar_archive("a.zip"));
    }
}
