//! Checksum-gated artifact retrieval
//!
//! Every artifact is fetched into a staging directory and hashed before
//! anything runs. A single mismatch discards the whole staging directory
//! and fails the run with [`HostkeepError::Integrity`]; the orchestrator is
//! never constructed. Detached signatures, when listed, are checked too, but
//! only advisorily: the outcome is logged and never blocks.
//!
//! Staged files are named `<position>-<name>` so two names that sanitize
//! alike never share a path. Signatures live in their own subdirectory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HostkeepError, HostkeepResult};
use crate::host::{command, Cmd};
use crate::journal::{Journal, Outcome, Scope};

use super::digest::{digest_matches, sha256_file};
use super::source::ArtifactSource;

/// An artifact the plan declares, with its expected hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedArtifact {
    pub name: String,
    pub location: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A fetched artifact whose hash matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    pub name: String,
    pub path: PathBuf,
    pub sha256: String,
    /// `Some(true)` good signature, `Some(false)` bad or uncheckable,
    /// `None` when no signature was declared
    pub signature_ok: Option<bool>,
}

/// Artifacts that passed verification, keyed by name
#[derive(Debug, Clone, Default)]
pub struct VerifiedSet {
    artifacts: BTreeMap<String, VerifiedArtifact>,
}

impl VerifiedSet {
    pub fn get(&self, name: &str) -> Option<&VerifiedArtifact> {
        self.artifacts.get(name)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VerifiedArtifact> {
        self.artifacts.values()
    }
}

/// Checks a detached signature
pub trait SignatureCheck {
    fn verify(&self, artifact: &Path, signature: &Path) -> HostkeepResult<bool>;
}

/// `gpg --verify` against the operator's keyring
#[derive(Debug, Clone, Default)]
pub struct GpgSignatureCheck;

impl SignatureCheck for GpgSignatureCheck {
    fn verify(&self, artifact: &Path, signature: &Path) -> HostkeepResult<bool> {
        if !command::exists("gpg") {
            return Err(HostkeepError::Validation("gpg is not installed".into()));
        }
        let result = Cmd::new("gpg")
            .args(["--batch", "--verify"])
            .arg_path(signature)
            .arg_path(artifact)
            .allow_fail()
            .run()?;
        Ok(result.success())
    }
}

/// Fetches and verifies a manifest of artifacts
pub struct Fetcher<'a> {
    source: &'a dyn ArtifactSource,
    signatures: &'a dyn SignatureCheck,
    staging_dir: PathBuf,
    journal: Option<&'a Journal>,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        source: &'a dyn ArtifactSource,
        signatures: &'a dyn SignatureCheck,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            source,
            signatures,
            staging_dir,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: &'a Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    fn record(&self, subject: &str, outcome: Outcome, message: Option<&str>) {
        if let Some(journal) = self.journal {
            journal.record(Scope::Fetch, subject, outcome, message);
        }
    }

    /// Fetch every artifact and verify its hash
    ///
    /// On any failure the staging directory is removed, so no unverified
    /// or partially verified artifact is left behind.
    pub fn fetch_all(&self, manifest: &[ExpectedArtifact]) -> HostkeepResult<VerifiedSet> {
        if self.staging_dir.exists() {
            fs::remove_dir_all(&self.staging_dir)?;
        }
        fs::create_dir_all(self.staging_dir.join(ARTIFACT_DIR))?;
        fs::create_dir_all(self.staging_dir.join(SIGNATURE_DIR))?;

        match self.fetch_into_staging(manifest) {
            Ok(set) => Ok(set),
            Err(e) => {
                let _ = fs::remove_dir_all(&self.staging_dir);
                Err(e)
            }
        }
    }

    fn fetch_into_staging(&self, manifest: &[ExpectedArtifact]) -> HostkeepResult<VerifiedSet> {
        let mut set = VerifiedSet::default();

        for (position, expected) in manifest.iter().enumerate() {
            if set.artifacts.contains_key(&expected.name) {
                return Err(HostkeepError::Validation(format!(
                    "Artifact '{}' is declared twice",
                    expected.name
                )));
            }

            let staged_name = staged_name(position, &expected.name);
            let dest = self.staging_dir.join(ARTIFACT_DIR).join(&staged_name);
            if let Err(e) = self.source.fetch(&expected.location, &dest) {
                self.record(&expected.name, Outcome::Failed, Some(&e.to_string()));
                return Err(e);
            }

            let actual = sha256_file(&dest)?;
            if !digest_matches(&actual, &expected.sha256) {
                let err = HostkeepError::Integrity {
                    artifact: expected.name.clone(),
                    expected: expected.sha256.clone(),
                    actual,
                };
                self.record(&expected.name, Outcome::Failed, Some(&err.to_string()));
                return Err(err);
            }

            let signature_ok = expected
                .signature
                .as_deref()
                .map(|sig| self.check_signature(&expected.name, &staged_name, sig, &dest));

            self.record(&expected.name, Outcome::Ok, None);
            info!(artifact = %expected.name, sha256 = %actual, "artifact verified");

            set.artifacts.insert(
                expected.name.clone(),
                VerifiedArtifact {
                    name: expected.name.clone(),
                    path: dest,
                    sha256: actual,
                    signature_ok,
                },
            );
        }

        Ok(set)
    }

    /// Advisory only: never returns an error
    fn check_signature(
        &self,
        name: &str,
        staged_name: &str,
        location: &str,
        artifact: &Path,
    ) -> bool {
        let sig_path = self
            .staging_dir
            .join(SIGNATURE_DIR)
            .join(format!("{}.sig", staged_name));
        let outcome = self
            .source
            .fetch(location, &sig_path)
            .and_then(|_| self.signatures.verify(artifact, &sig_path));

        match outcome {
            Ok(true) => true,
            Ok(false) => {
                warn!(artifact = name, "signature did not verify (advisory, continuing)");
                self.record(name, Outcome::Warn, Some("signature did not verify"));
                false
            }
            Err(e) => {
                warn!(artifact = name, error = %e, "signature could not be checked (advisory, continuing)");
                self.record(name, Outcome::Warn, Some(&format!("signature unchecked: {}", e)));
                false
            }
        }
    }
}

const ARTIFACT_DIR: &str = "artifacts";
const SIGNATURE_DIR: &str = "signatures";

/// Unique per manifest position, readable for operators
fn staged_name(position: usize, name: &str) -> String {
    format!("{:03}-{}", position, sanitize(name))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::source::LocalSource;
    use tempfile::TempDir;

    struct Always(bool);

    impl SignatureCheck for Always {
        fn verify(&self, _artifact: &Path, _signature: &Path) -> HostkeepResult<bool> {
            Ok(self.0)
        }
    }

    fn write_artifact(dir: &Path, name: &str, body: &str) -> ExpectedArtifact {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        ExpectedArtifact {
            name: name.to_string(),
            location: path.to_string_lossy().into_owned(),
            sha256: sha256_file(&path).unwrap(),
            signature: None,
        }
    }

    #[test]
    fn test_all_artifacts_verified() {
        let temp = TempDir::new().unwrap();
        let a = write_artifact(temp.path(), "a.sh", "echo a");
        let b = write_artifact(temp.path(), "b.sh", "echo b");

        let fetcher = Fetcher::new(&LocalSource, &Always(true), temp.path().join("staging"));
        let set = fetcher.fetch_all(&[a, b]).unwrap();

        assert_eq!(set.len(), 2);
        let a = set.get("a.sh").unwrap();
        assert_eq!(fs::read_to_string(&a.path).unwrap(), "echo a");
        assert_eq!(a.signature_ok, None);
    }

    #[test]
    fn test_mismatch_fails_closed() {
        let temp = TempDir::new().unwrap();
        let a = write_artifact(temp.path(), "a.sh", "echo a");
        let mut b = write_artifact(temp.path(), "b.sh", "echo b");
        b.sha256 = "0".repeat(64);

        let journal = Journal::new(temp.path().join("journal.log"));
        let staging = temp.path().join("staging");
        let fetcher =
            Fetcher::new(&LocalSource, &Always(true), staging.clone()).with_journal(&journal);
        let err = fetcher.fetch_all(&[a, b]).unwrap_err();

        match err {
            HostkeepError::Integrity { artifact, .. } => assert_eq!(artifact, "b.sh"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!staging.exists());
        let entries = journal.read_all().unwrap();
        assert_eq!(entries.last().unwrap().outcome, Outcome::Failed);
    }

    #[test]
    fn test_bad_signature_is_advisory() {
        let temp = TempDir::new().unwrap();
        let sig = temp.path().join("a.sh.asc");
        fs::write(&sig, "not a real signature").unwrap();
        let mut a = write_artifact(temp.path(), "a.sh", "echo a");
        a.signature = Some(sig.to_string_lossy().into_owned());

        let fetcher = Fetcher::new(&LocalSource, &Always(false), temp.path().join("staging"));
        let set = fetcher.fetch_all(&[a]).unwrap();

        assert_eq!(set.get("a.sh").unwrap().signature_ok, Some(false));
    }

    #[test]
    fn test_unfetchable_signature_is_advisory() {
        let temp = TempDir::new().unwrap();
        let mut a = write_artifact(temp.path(), "a.sh", "echo a");
        a.signature = Some("/no/such/signature.asc".into());

        let fetcher = Fetcher::new(&LocalSource, &Always(true), temp.path().join("staging"));
        let set = fetcher.fetch_all(&[a]).unwrap();
        assert_eq!(set.get("a.sh").unwrap().signature_ok, Some(false));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let temp = TempDir::new().unwrap();
        let a = write_artifact(temp.path(), "a.sh", "echo a");

        let fetcher = Fetcher::new(&LocalSource, &Always(true), temp.path().join("staging"));
        let err = fetcher.fetch_all(&[a.clone(), a]).unwrap_err();
        assert!(matches!(err, HostkeepError::Validation(_)));
    }

    #[test]
    fn test_names_that_sanitize_alike_keep_their_content() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("b"), "echo NESTED").unwrap();
        fs::write(temp.path().join("a_b"), "echo OTHER").unwrap();
        fs::write(temp.path().join("x.sig"), "echo SIG-STEP").unwrap();
        fs::write(temp.path().join("x"), "echo X").unwrap();
        let sig = temp.path().join("x.asc");
        fs::write(&sig, "signature").unwrap();

        let declare = |name: &str, file: &Path| ExpectedArtifact {
            name: name.to_string(),
            location: file.to_string_lossy().into_owned(),
            sha256: sha256_file(file).unwrap(),
            signature: None,
        };
        let mut x = declare("x", &temp.path().join("x"));
        x.signature = Some(sig.to_string_lossy().into_owned());
        let manifest = vec![
            declare("a/b", &nested.join("b")),
            declare("a_b", &temp.path().join("a_b")),
            x,
            declare("x.sig", &temp.path().join("x.sig")),
        ];

        let fetcher = Fetcher::new(&LocalSource, &Always(true), temp.path().join("staging"));
        let set = fetcher.fetch_all(&manifest).unwrap();

        for expected in &manifest {
            let staged = set.get(&expected.name).unwrap();
            assert_eq!(sha256_file(&staged.path).unwrap(), expected.sha256, "{}", expected.name);
        }
        assert_eq!(
            fs::read_to_string(&set.get("a/b").unwrap().path).unwrap(),
            "echo NESTED"
        );
        assert_eq!(set.get("x").unwrap().signature_ok, Some(true));
    }

    #[test]
    fn test_staged_name() {
        assert_eq!(staged_name(0, "steps/ssh hardening.sh"), "000-steps_ssh_hardening.sh");
        assert_ne!(staged_name(0, "a/b"), staged_name(1, "a_b"));
    }
}
