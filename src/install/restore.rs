//! Bundle unpacking.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::Archive;

/// Unpack `bundle` so that its contents become `install_dir`.
///
/// The archive is extracted next to the target and renamed into place, so a
/// failed restore never leaves a half-populated install location.
pub fn restore(bundle: &Path, install_dir: &Path) -> io::Result<()> {
    let staging = staging_dir(install_dir);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    if let Err(e) = unpack(bundle, &staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    // Leftovers from an earlier failed install; the marker was checked already.
    if install_dir.exists() {
        fs::remove_dir_all(install_dir)?;
    }
    fs::rename(&staging, install_dir)
}

fn unpack(bundle: &Path, into: &Path) -> io::Result<()> {
    let mut archive = Archive::new(GzDecoder::new(File::open(bundle)?));
    archive.set_preserve_permissions(true);
    archive.unpack(into)
}

fn staging_dir(install_dir: &Path) -> PathBuf {
    let name = install_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "install".to_string());
    install_dir.with_file_name(format!("{}.partial", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_bundle;
    use tempfile::TempDir;

    #[test]
    fn restores_tree_into_install_dir() {
        let temp_dir = TempDir::new().unwrap();
        let bundle = temp_dir.path().join("a-bundle.tgz");
        build_bundle(&bundle, &[("bin/agent", "#!/bin/sh\necho hi\n"), ("VERSION", "1.2.3\n")]);

        let install_dir = temp_dir.path().join(".agent").join("a");
        fs::create_dir_all(&install_dir).unwrap();
        fs::write(install_dir.join("stale"), "x").unwrap();

        restore(&bundle, &install_dir).unwrap();

        assert_eq!(
            fs::read_to_string(install_dir.join("VERSION")).unwrap(),
            "1.2.3\n"
        );
        assert!(install_dir.join("bin/agent").is_file());
        assert!(!install_dir.join("stale").exists());
        assert!(!staging_dir(&install_dir).exists());
    }

    #[test]
    fn corrupt_bundle_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let bundle = temp_dir.path().join("bad-bundle.tgz");
        // gzip magic followed by garbage
        fs::write(&bundle, [0x1f, 0x8b, 0x00, 0x01, 0x02]).unwrap();

        let install_dir = temp_dir.path().join(".agent").join("bad");
        assert!(restore(&bundle, &install_dir).is_err());
        assert!(!install_dir.exists());
        assert!(!staging_dir(&install_dir).exists());
    }
}
