//! Fetcher/Verifier
//!
//! Retrieves remote step artifacts and gates all execution on a SHA-256
//! match. See [`Fetcher::fetch_all`].

pub mod digest;
pub mod source;
pub mod verifier;

pub use digest::sha256_file;
pub use source::{AnySource, ArtifactSource, HttpSource, LocalSource};
pub use verifier::{
    ExpectedArtifact, Fetcher, GpgSignatureCheck, SignatureCheck, VerifiedArtifact, VerifiedSet,
};
