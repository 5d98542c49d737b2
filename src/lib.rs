//! hostkeep - single-host backup/restore and idempotent installation phases
//!
//! This library provides the core functionality for the hostkeep tool. It
//! captures a host's container volumes, configuration, databases and user
//! data into self-describing archives, ships them off-site, prunes them,
//! and restores them. It also runs a checksum-gated installation plan whose
//! steps converge the host to a known state without repeating work.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Paths, key catalogue and the configuration resolver
//! - `error`: Custom error types
//! - `host`: Capability interfaces over commands, containers, remotes and prompts
//! - `journal`: Append-only run journal
//! - `fetch`: Artifact retrieval and SHA-256 verification
//! - `orchestrator`: Phase plans, ordering and idempotent execution
//! - `backup`: Backup, replication, restore and retention
//! - `storage`: Atomic JSON file helpers
//! - `cli`: Command handlers
//! - `display`: Terminal formatting
//!
//! # Example
//!
//! ```rust,ignore
//! use hostkeep::config::{ConfigResolver, HostkeepPaths, Settings};
//! use hostkeep::host::NonInteractive;
//!
//! let paths = HostkeepPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let mut resolver = ConfigResolver::new(&settings, &NonInteractive);
//! resolver.resolve_known(false)?;
//! let snapshot = resolver.finish(&paths)?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod fetch;
pub mod host;
pub mod journal;
pub mod orchestrator;
pub mod storage;

pub use error::{HostkeepError, HostkeepResult};
