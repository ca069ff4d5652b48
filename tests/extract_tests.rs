// Extraction pipelines: magic-number dispatch, mode preservation, symlinks,
// and traversal defense.


use chatr::error::ChatrError;
use chatr::traits::Extractor;
use chatr::ArchiveExtractor;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;
use test_helpers::tar_gz;

fn extract_to(archive: &Path, dest: &Path) -> chatr::Result<()> {
    fs::create_dir_all(dest).unwrap();
    ArchiveExtractor::new().extract(archive, dest)
}

fn plain_tar(entries: &[(String, Vec<u8>, u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(contents.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append(&header, contents.as_slice()).unwrap();
    }
    builder.into_inner().unwrap()
}

fn sample_entries() -> Vec<(String, Vec<u8>, u32)> {
    vec![
        ("pkg/1.0/bin/tool".to_string(), b"#!/bin/sh\n".to_vec(), 0o755),
        ("pkg/1.0/share/readme".to_string(), b"docs\n".to_vec(), 0o644),
    ]
}

#[test]
fn extracts_tar_gz_with_modes() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("pkg.tar.gz");
    fs::write(&archive, tar_gz(&sample_entries())).unwrap();

    let dest = dir.path().join("out");
    extract_to(&archive, &dest).unwrap();

    let tool = dest.join("pkg/1.0/bin/tool");
    assert_eq!(fs::read(&tool).unwrap(), b"#!/bin/sh\n");
    assert_eq!(fs::read(dest.join("pkg/1.0/share/readme")).unwrap(), b"docs\n");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&tool).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
    }
}

#[test]
fn tar_dispatch_sniffs_compression_by_magic() {
    let dir = tempdir().unwrap();
    let raw = plain_tar(&sample_entries());

    // Every body claims the same bare ".tar" suffix; only the leading
    // bytes differ.
    let gzipped = tar_gz(&sample_entries());

    let zstded = zstd::stream::encode_all(raw.as_slice(), 3).unwrap();

    let mut xz = xz2::write::XzEncoder::new(Vec::new(), 6);
    xz.write_all(&raw).unwrap();
    let xzed = xz.finish().unwrap();

    let mut bz = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    bz.write_all(&raw).unwrap();
    let bzed = bz.finish().unwrap();

    for (label, bytes) in [
        ("plain", raw.clone()),
        ("gzip", gzipped),
        ("zstd", zstded),
        ("xz", xzed),
        ("bzip2", bzed),
    ] {
        let archive = dir.path().join(format!("{}.tar", label));
        fs::write(&archive, &bytes).unwrap();

        let dest = dir.path().join(format!("out-{}", label));
        extract_to(&archive, &dest).unwrap();
        assert_eq!(
            fs::read(dest.join("pkg/1.0/bin/tool")).unwrap(),
            b"#!/bin/sh\n",
            "{} variant mismatch",
            label
        );
    }
}

#[test]
fn tar_rejects_parent_traversal() {
    let dir = tempdir().unwrap();

    // tar::Builder refuses to write `..` itself, so forge the header bytes.
    let mut header = tar::Header::new_gnu();
    let name = b"../evil.txt";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(5);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&header, b"pwned".as_slice()).unwrap();

    let archive = dir.path().join("evil.tar");
    fs::write(&archive, builder.into_inner().unwrap()).unwrap();

    let dest = dir.path().join("out");
    let err = extract_to(&archive, &dest).unwrap_err();
    assert!(matches!(err, ChatrError::InvalidArchivePath(_)));
    assert!(!dir.path().join("evil.txt").exists());
}

#[cfg(unix)]
#[test]
fn tar_recreates_symlinks() {
    let dir = tempdir().unwrap();

    let mut builder = tar::Builder::new(Vec::new());

    let mut file = tar::Header::new_gnu();
    file.set_path("pkg/bin/tool-1.0").unwrap();
    file.set_size(4);
    file.set_mode(0o755);
    file.set_cksum();
    builder.append(&file, b"bin!".as_slice()).unwrap();

    let mut link = tar::Header::new_gnu();
    link.set_entry_type(tar::EntryType::Symlink);
    link.set_path("pkg/bin/tool").unwrap();
    link.set_link_name("tool-1.0").unwrap();
    link.set_size(0);
    link.set_cksum();
    builder.append(&link, std::io::empty()).unwrap();

    let archive = dir.path().join("links.tar");
    fs::write(&archive, builder.into_inner().unwrap()).unwrap();

    let dest = dir.path().join("out");
    extract_to(&archive, &dest).unwrap();

    let link_path = dest.join("pkg/bin/tool");
    assert!(link_path.symlink_metadata().unwrap().is_symlink());
    assert_eq!(
        fs::read_link(&link_path).unwrap(),
        std::path::PathBuf::from("tool-1.0")
    );
}

fn sample_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);

    writer
        .add_directory("app/bin/", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.start_file("app/bin/run", options).unwrap();
    writer.write_all(b"#!/bin/sh\n").unwrap();

    writer.finish().unwrap().into_inner()
}

#[test]
fn extracts_zip_with_modes() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("app.zip");
    fs::write(&archive, sample_zip()).unwrap();

    let dest = dir.path().join("out");
    extract_to(&archive, &dest).unwrap();

    let run = dest.join("app/bin/run");
    assert_eq!(fs::read(&run).unwrap(), b"#!/bin/sh\n");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&run).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0, "execute bit should survive");
    }
}

#[test]
fn zip_rejects_parent_traversal() {
    let dir = tempdir().unwrap();

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("../evil.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"pwned").unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let archive = dir.path().join("evil.zip");
    fs::write(&archive, bytes).unwrap();

    let dest = dir.path().join("out");
    let err = extract_to(&archive, &dest).unwrap_err();
    assert!(matches!(err, ChatrError::InvalidArchivePath(_)));
    assert!(!dir.path().join("evil.txt").exists());
}

#[cfg(not(target_os = "macos"))]
#[test]
fn dmg_and_pkg_are_macos_only() {
    let dir = tempdir().unwrap();
    let ex = ArchiveExtractor::new();

    for name in ["image.dmg", "installer.pkg"] {
        let archive = dir.path().join(name);
        fs::write(&archive, b"not really").unwrap();
        let err = ex.extract(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, ChatrError::PlatformUnsupported(_)));
    }
}

#[test]
fn extract_apps_reports_top_level_bundles() {
    let dir = tempdir().unwrap();
    let entries = vec![
        (
            "Foo.app/Contents/Info.plist".to_string(),
            b"<plist/>".to_vec(),
            0o644,
        ),
        (
            "Foo.app/Contents/MacOS/Foo".to_string(),
            b"binary".to_vec(),
            0o755,
        ),
    ];
    let archive = dir.path().join("foo.tar.gz");
    fs::write(&archive, tar_gz(&entries)).unwrap();

    let dest = dir.path().join("apps");
    fs::create_dir_all(&dest).unwrap();
    let apps = ArchiveExtractor::new().extract_apps(&archive, &dest).unwrap();

    assert_eq!(apps, vec!["Foo.app"]);
    assert!(dest.join("Foo.app/Contents/Info.plist").exists());
}
