//! File I/O utilities with atomic writes
//!
//! State files (configuration, upload ledger) are owned by the active run
//! and replaced atomically so an interrupt never leaves a torn file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::HostkeepError;

/// Read JSON from a file, returning a default value if file doesn't exist
pub fn read_json<T, P>(path: P) -> Result<T, HostkeepError>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Ok(T::default());
    }

    let file = File::open(path)
        .map_err(|e| HostkeepError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| HostkeepError::Json(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically (write to temp, then rename)
pub fn write_json_atomic<T, P>(path: P, data: &T) -> Result<(), HostkeepError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut buf = Vec::new();
    serde_json::to_writer_pretty(&mut buf, data)
        .map_err(|e| HostkeepError::Json(format!("Failed to serialize data: {}", e)))?;
    write_bytes_atomic(path, &buf)
}

/// Write raw bytes atomically, syncing before the rename
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), HostkeepError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            HostkeepError::Io(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let file = File::create(&temp_path)
        .map_err(|e| HostkeepError::Io(format!("Failed to create temp file: {}", e)))?;

    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .and_then(|_| writer.flush())
        .map_err(|e| HostkeepError::Io(format!("Failed to write {}: {}", path.display(), e)))?;

    writer
        .get_ref()
        .sync_all()
        .map_err(|e| HostkeepError::Io(format!("Failed to sync data: {}", e)))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        HostkeepError::Io(format!("Failed to rename temp file: {}", e))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct Ledger {
        entries: Vec<String>,
    }

    #[test]
    fn test_read_nonexistent_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let data: Ledger = read_json(temp_dir.path().join("missing.json")).unwrap();
        assert_eq!(data, Ledger::default());
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("ledger.json");

        let data = Ledger {
            entries: vec!["backup-20250101-000000-000.tar.gz".into()],
        };
        write_json_atomic(&path, &data).unwrap();

        let loaded: Ledger = read_json(&path).unwrap();
        assert_eq!(data, loaded);
        assert!(!temp_dir.path().join("nested").join("ledger.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");
        fs::write(&path, "not json at all").unwrap();

        assert!(read_json::<Ledger, _>(&path).is_err());
    }
}
