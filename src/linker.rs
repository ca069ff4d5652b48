//! Symlink farm management and runtime-library path patching.
//!
//! Executables and shared libraries found in a package prefix are exposed
//! through the shared `bin/` and `lib/` directories, and each patched
//! binary's rpath is pointed at the shared `lib/` so dynamic linking finds
//! sibling packages at runtime. Patching is best effort: a failure is
//! logged, never fatal.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct Linker {
    bin_dir: PathBuf,
    lib_dir: PathBuf,
}

impl Linker {
    pub fn new(bin_dir: PathBuf, lib_dir: PathBuf) -> Self {
        Self { bin_dir, lib_dir }
    }

    /// Symlink and patch every shared library under `<prefix>/lib/`,
    /// returning the exported names.
    pub fn link_libraries(&self, prefix: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for lib in find_libraries(prefix) {
            let name = file_name(&lib);
            self.symlink_into(&self.lib_dir, &lib, &name)?;
            self.patch_rpath(&lib);
            names.push(name);
        }
        Ok(names)
    }

    /// Symlink and patch the package's executables, returning the exported
    /// names.
    pub fn link_binaries(&self, prefix: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for bin in find_binaries(prefix) {
            let name = file_name(&bin);
            self.symlink_into(&self.bin_dir, &bin, &name)?;
            self.patch_rpath(&bin);
            names.push(name);
        }
        Ok(names)
    }

    /// Delete `<binDir>/<name>` for every recorded binary; missing is fine.
    pub fn unlink_binaries(&self, names: &[String]) -> Result<()> {
        for name in names {
            let link = self.bin_dir.join(name);
            match fs::remove_file(&link) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Delete the lib links derived from the prefix's current `lib/`
    /// contents, best effort.
    pub fn unlink_libraries(&self, prefix: &Path) {
        for lib in find_libraries(prefix) {
            let _ = fs::remove_file(self.lib_dir.join(file_name(&lib)));
        }
    }

    fn symlink_into(&self, dir: &Path, target: &Path, name: &str) -> Result<()> {
        fs::create_dir_all(dir)?;
        let link = dir.join(name);
        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)?;
        }
        make_symlink(target, &link)?;
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn patch_rpath(&self, path: &Path) {
        let output = match Command::new("otool").arg("-L").arg(path).output() {
            Ok(out) => out,
            Err(_) => return,
        };

        let listing = String::from_utf8_lossy(&output.stdout);
        for line in listing.lines().skip(1) {
            let line = line.trim();
            if !line.contains(" (compatibility") {
                continue;
            }
            let lib_ref = line.split(" (compatibility").next().unwrap_or("").trim();

            if lib_ref.starts_with("/usr/lib/")
                || lib_ref.starts_with("/System/")
                || lib_ref.starts_with("@rpath/")
                || lib_ref.starts_with("@loader_path/")
                || lib_ref.starts_with("@executable_path/")
            {
                continue;
            }

            let base = lib_ref.rsplit('/').next().unwrap_or(lib_ref);
            let new_ref = format!("@rpath/{}", base);
            run_quiet(
                Command::new("install_name_tool")
                    .args(["-change", lib_ref, &new_ref])
                    .arg(path),
            );
        }

        run_quiet(
            Command::new("install_name_tool")
                .arg("-add_rpath")
                .arg(&self.lib_dir)
                .arg(path),
        );
        // Modifying load commands invalidates the signature; re-sign ad hoc.
        run_quiet(
            Command::new("codesign")
                .args(["--force", "--sign", "-"])
                .arg(path),
        );
    }

    #[cfg(target_os = "linux")]
    fn patch_rpath(&self, path: &Path) {
        run_quiet(
            Command::new("patchelf")
                .arg("--set-rpath")
                .arg(&self.lib_dir)
                .arg(path),
        );
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    fn patch_rpath(&self, _path: &Path) {}
}

fn run_quiet(cmd: &mut Command) {
    match cmd.output() {
        Ok(out) if !out.status.success() => {
            tracing::warn!(
                "{:?} failed: {}",
                cmd.get_program(),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Err(e) => tracing::warn!("{:?} failed to start: {}", cmd.get_program(), e),
        _ => {}
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Shared libraries directly under `<prefix>/lib/`.
pub fn find_libraries(prefix: &Path) -> Vec<PathBuf> {
    let lib_dir = prefix.join("lib");
    let Ok(entries) = fs::read_dir(&lib_dir) else {
        return Vec::new();
    };

    let mut libs = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let name = file_name(&path);
        if name.ends_with(".dylib") || name.ends_with(".so") || name.contains(".so.") {
            libs.push(path);
        }
    }
    libs.sort();
    libs
}

/// Executables in the first candidate directory that has any: `bin/`, then
/// `libexec/bin/`, then `libexec/`.
pub fn find_binaries(prefix: &Path) -> Vec<PathBuf> {
    let candidates = [
        prefix.join("bin"),
        prefix.join("libexec").join("bin"),
        prefix.join("libexec"),
    ];

    for dir in candidates {
        let found = executables_in(&dir);
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

fn executables_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut executables = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        if is_executable(&path) {
            executables.push(path);
        }
    }
    executables.sort();
    executables
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("exe"))
        .unwrap_or(false)
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::fs::hard_link(target, link)?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn touch_exec(path: &Path) {
        fs::write(path, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn binaries_prefer_bin_over_libexec() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path();
        fs::create_dir_all(prefix.join("bin")).unwrap();
        fs::create_dir_all(prefix.join("libexec")).unwrap();
        touch_exec(&prefix.join("bin/tool"));
        touch_exec(&prefix.join("libexec/helper"));

        let bins = find_binaries(prefix);
        assert_eq!(bins.len(), 1);
        assert!(bins[0].ends_with("bin/tool"));
    }

    #[test]
    fn libexec_is_a_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path();
        fs::create_dir_all(prefix.join("libexec")).unwrap();
        touch_exec(&prefix.join("libexec/helper"));

        let bins = find_binaries(prefix);
        assert_eq!(bins.len(), 1);
        assert!(bins[0].ends_with("libexec/helper"));
    }

    #[test]
    fn non_executables_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path();
        fs::create_dir_all(prefix.join("bin")).unwrap();
        fs::write(prefix.join("bin/README"), b"docs").unwrap();

        assert!(find_binaries(prefix).is_empty());
    }

    #[test]
    fn library_discovery_matches_versioned_sonames() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path();
        fs::create_dir_all(prefix.join("lib")).unwrap();
        for name in ["libfoo.so", "libfoo.so.1.2", "libbar.dylib", "notalib.txt"] {
            fs::write(prefix.join("lib").join(name), b"x").unwrap();
        }

        let libs: Vec<String> = find_libraries(prefix)
            .iter()
            .map(|p| file_name(p))
            .collect();
        assert_eq!(libs, vec!["libbar.dylib", "libfoo.so", "libfoo.so.1.2"]);
    }

    #[test]
    fn link_and_unlink_binaries() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("pkg");
        fs::create_dir_all(prefix.join("bin")).unwrap();
        touch_exec(&prefix.join("bin/tool"));

        let linker = Linker::new(dir.path().join("bin"), dir.path().join("lib"));
        let names = linker.link_binaries(&prefix).unwrap();
        assert_eq!(names, vec!["tool"]);

        let link = dir.path().join("bin/tool");
        assert!(link.symlink_metadata().unwrap().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), prefix.join("bin/tool"));

        linker.unlink_binaries(&names).unwrap();
        assert!(!link.exists());
        // Unlinking again is not an error.
        linker.unlink_binaries(&names).unwrap();
    }

    #[test]
    fn relinking_replaces_existing_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let old_prefix = dir.path().join("old");
        let new_prefix = dir.path().join("new");
        for p in [&old_prefix, &new_prefix] {
            fs::create_dir_all(p.join("bin")).unwrap();
            touch_exec(&p.join("bin/tool"));
        }

        let linker = Linker::new(dir.path().join("bin"), dir.path().join("lib"));
        linker.link_binaries(&old_prefix).unwrap();
        linker.link_binaries(&new_prefix).unwrap();

        let link = dir.path().join("bin/tool");
        assert_eq!(fs::read_link(&link).unwrap(), new_prefix.join("bin/tool"));
    }
}
