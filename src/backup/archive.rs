//! Archive codec
//!
//! A sealed set directory is packed into `<id>.tar.gz` with `manifest.json`
//! as the first entry, followed by the section directories. The archive is
//! written under a `.partial` name and renamed once complete, so a reader
//! never sees a half-written archive.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{HostkeepError, HostkeepResult};

use super::manifest::{BackupManifest, MANIFEST_FILE};
use super::section::SectionKind;

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
pub const PARTIAL_SUFFIX: &str = ".partial";

fn archive_err(action: &str, path: &Path, e: impl std::fmt::Display) -> HostkeepError {
    HostkeepError::Archive(format!("Failed to {} {}: {}", action, path.display(), e))
}

/// Compress a sealed set directory into `dest`
pub fn pack_set(set_dir: &Path, dest: &Path) -> HostkeepResult<u64> {
    let manifest = set_dir.join(MANIFEST_FILE);
    if !manifest.is_file() {
        return Err(HostkeepError::Archive(format!(
            "{} has no manifest, refusing to compress an unsealed set",
            set_dir.display()
        )));
    }

    let partial = partial_path(dest);
    let write = || -> HostkeepResult<()> {
        let file = File::create(&partial).map_err(|e| archive_err("create", &partial, e))?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        builder
            .append_path_with_name(&manifest, MANIFEST_FILE)
            .map_err(|e| archive_err("add manifest to", &partial, e))?;
        for kind in SectionKind::ALL {
            let dir = set_dir.join(kind.dir_name());
            if dir.is_dir() {
                builder
                    .append_dir_all(kind.dir_name(), &dir)
                    .map_err(|e| archive_err("add section to", &partial, e))?;
            }
        }

        let mut writer = builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| archive_err("finish", &partial, e))?;
        writer.flush()?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| archive_err("sync", &partial, e))?;
        Ok(())
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    fs::rename(&partial, dest).map_err(|e| archive_err("finalize", dest, e))?;
    Ok(fs::metadata(dest)?.len())
}

/// `<dest>.partial`
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Extract a whole archive into `dest`
pub fn unpack(archive: &Path, dest: &Path) -> HostkeepResult<()> {
    let file = File::open(archive).map_err(|e| archive_err("open", archive, e))?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.unpack(dest).map_err(|e| archive_err("extract", archive, e))
}

/// Read the manifest without extracting the rest of the archive
pub fn read_manifest(archive: &Path) -> HostkeepResult<BackupManifest> {
    let file = File::open(archive).map_err(|e| archive_err("open", archive, e))?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut entries = tar.entries().map_err(|e| archive_err("read", archive, e))?;

    let mut first = entries
        .next()
        .ok_or_else(|| HostkeepError::Archive(format!("{} is empty", archive.display())))?
        .map_err(|e| archive_err("read", archive, e))?;

    let is_manifest = first
        .path()
        .map(|p| &*p == Path::new(MANIFEST_FILE))
        .unwrap_or(false);
    if !is_manifest {
        return Err(HostkeepError::Archive(format!(
            "{} does not start with {}",
            archive.display(),
            MANIFEST_FILE
        )));
    }

    let mut json = String::new();
    first
        .read_to_string(&mut json)
        .map_err(|e| archive_err("read manifest of", archive, e))?;
    serde_json::from_str(&json)
        .map_err(|e| HostkeepError::Archive(format!("Invalid manifest in {}: {}", archive.display(), e)))
}

/// Pack a host file or directory into an uncompressed tar at `dest`
///
/// The entry is named after the source's basename so it can be unpacked
/// back into the source's parent directory.
pub fn pack_path(source: &Path, dest: &Path) -> HostkeepResult<()> {
    let name = source
        .file_name()
        .ok_or_else(|| HostkeepError::Validation(format!("{} has no file name", source.display())))?;

    let file = File::create(dest).map_err(|e| archive_err("create", dest, e))?;
    let mut builder = tar::Builder::new(BufWriter::new(file));
    builder.follow_symlinks(false);

    let result = if source.is_dir() {
        builder.append_dir_all(name, source)
    } else {
        builder.append_path_with_name(source, name)
    };
    result.map_err(|e| archive_err("pack", source, e))?;

    builder
        .into_inner()
        .and_then(|mut w| w.flush())
        .map_err(|e| archive_err("finish", dest, e))
}

/// Unpack a tar produced by [`pack_path`] into `parent`, overlaying files
pub fn unpack_path(tar_path: &Path, parent: &Path) -> HostkeepResult<()> {
    fs::create_dir_all(parent)?;
    let file = File::open(tar_path).map_err(|e| archive_err("open", tar_path, e))?;
    let mut tar = tar::Archive::new(BufReader::new(file));
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);
    tar.unpack(parent).map_err(|e| archive_err("extract", tar_path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::section::Section;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sealed_set(root: &Path) -> PathBuf {
        let set = root.join("backup-set");
        fs::create_dir_all(set.join("volumes")).unwrap();
        fs::write(set.join("volumes/db.tar.gz"), b"volume bytes").unwrap();
        let manifest = BackupManifest::new(
            "backup-set".into(),
            Utc::now(),
            vec![Section::ok(
                SectionKind::VolumeSnapshot,
                "db",
                "volumes/db.tar.gz".into(),
                12,
            )],
        );
        fs::write(set.join(MANIFEST_FILE), serde_json::to_vec(&manifest).unwrap()).unwrap();
        set
    }

    #[test]
    fn test_pack_and_read_manifest() {
        let temp = TempDir::new().unwrap();
        let set = sealed_set(temp.path());
        let dest = temp.path().join("backup-set.tar.gz");

        let size = pack_set(&set, &dest).unwrap();
        assert!(size > 0);
        assert!(!partial_path(&dest).exists());

        let manifest = read_manifest(&dest).unwrap();
        assert_eq!(manifest.id, "backup-set");

        let out = temp.path().join("out");
        unpack(&dest, &out).unwrap();
        assert_eq!(fs::read(out.join("volumes/db.tar.gz")).unwrap(), b"volume bytes");
    }

    #[test]
    fn test_unsealed_set_is_refused() {
        let temp = TempDir::new().unwrap();
        let set = sealed_set(temp.path());
        fs::remove_file(set.join(MANIFEST_FILE)).unwrap();

        let err = pack_set(&set, &temp.path().join("x.tar.gz")).unwrap_err();
        assert!(matches!(err, HostkeepError::Archive(_)));
    }

    #[test]
    fn test_read_manifest_rejects_foreign_archive() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("foreign.tar.gz");
        let file = File::create(&dest).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let payload = temp.path().join("readme.txt");
        fs::write(&payload, "hello").unwrap();
        builder.append_path_with_name(&payload, "readme.txt").unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        assert!(read_manifest(&dest).is_err());
    }

    #[test]
    fn test_path_overlay() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("etc/app");
        fs::create_dir_all(source.join("conf.d")).unwrap();
        fs::write(source.join("conf.d/main.conf"), "port=80").unwrap();
        let tar_path = temp.path().join("app.tar");

        pack_path(&source, &tar_path).unwrap();
        fs::write(source.join("conf.d/main.conf"), "port=8080").unwrap();
        unpack_path(&tar_path, &temp.path().join("etc")).unwrap();

        assert_eq!(
            fs::read_to_string(source.join("conf.d/main.conf")).unwrap(),
            "port=80"
        );
    }
}
