//! Pkg pipeline: expand the flat package with `pkgutil`, then feed each
//! component's `Payload` cpio stream (gunzipped when needed) to `cpio`.

#[cfg(target_os = "macos")]
pub use imp::extract;

#[cfg(not(target_os = "macos"))]
pub use stub::extract;

#[cfg(target_os = "macos")]
mod imp {
    use crate::error::Result;
    use anyhow::{bail, Context};
    use std::fs::{self, File};
    use std::io::{self, Read, Seek, SeekFrom};
    use std::path::Path;
    use std::process::{Command, Stdio};

    const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

    pub fn extract(src: &Path, dest: &Path) -> Result<()> {
        let expand_dir = std::env::temp_dir().join(format!("chatr-pkg-{}", std::process::id()));
        // pkgutil refuses to expand into an existing directory.
        let _ = fs::remove_dir_all(&expand_dir);

        let status = Command::new("pkgutil")
            .arg("--expand")
            .arg(src)
            .arg(&expand_dir)
            .status()
            .context("failed to run pkgutil")?;
        if !status.success() {
            bail!("pkgutil --expand failed for {}", src.display());
        }

        let result = extract_payloads(&expand_dir, dest);
        let _ = fs::remove_dir_all(&expand_dir);
        result
    }

    fn extract_payloads(expand_dir: &Path, dest: &Path) -> Result<()> {
        for entry in fs::read_dir(expand_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                let payload = path.join("Payload");
                if payload.exists() {
                    extract_cpio(&payload, dest)?;
                }
            } else if entry.file_name() == "Payload" {
                extract_cpio(&path, dest)?;
            }
        }
        Ok(())
    }

    fn extract_cpio(payload: &Path, dest: &Path) -> Result<()> {
        let mut file = File::open(payload)?;

        let mut magic = [0u8; 2];
        let n = file.read(&mut magic)?;
        file.seek(SeekFrom::Start(0))?;

        let mut reader: Box<dyn Read> = if n >= 2 && magic == GZIP_MAGIC {
            Box::new(flate2::read::GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        fs::create_dir_all(dest)?;

        let mut child = Command::new("cpio")
            .args(["-idm", "--quiet"])
            .current_dir(dest)
            .stdin(Stdio::piped())
            .spawn()
            .context("failed to run cpio")?;

        {
            let stdin = child.stdin.as_mut().expect("piped stdin");
            io::copy(&mut reader, stdin)?;
        }

        let status = child.wait()?;
        if !status.success() {
            bail!("cpio failed extracting {}", payload.display());
        }
        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
mod stub {
    use crate::error::{ChatrError, Result};
    use std::path::Path;

    pub fn extract(_src: &Path, _dest: &Path) -> Result<()> {
        Err(ChatrError::PlatformUnsupported("pkg"))
    }
}
