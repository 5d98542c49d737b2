//! SHA-256 helpers

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{HostkeepError, HostkeepResult};

/// Hex-encoded SHA-256 of a file, streamed in 1 MiB chunks
pub fn sha256_file(path: &Path) -> HostkeepResult<String> {
    let file = File::open(path)
        .map_err(|e| HostkeepError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| HostkeepError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare a computed digest against a declared one, ignoring case and an
/// optional `sha256:` prefix
pub fn digest_matches(actual: &str, expected: &str) -> bool {
    let expected = expected.trim();
    let expected = expected.strip_prefix("sha256:").unwrap_or(expected);
    actual.eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_sha256_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn test_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        std::fs::write(&path, "").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_matches_is_case_insensitive() {
        assert!(digest_matches(HELLO_SHA256, &HELLO_SHA256.to_uppercase()));
        assert!(digest_matches(HELLO_SHA256, &format!("sha256:{}", HELLO_SHA256)));
        assert!(!digest_matches(HELLO_SHA256, "deadbeef"));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(sha256_file(&temp.path().join("nope")).is_err());
    }
}
