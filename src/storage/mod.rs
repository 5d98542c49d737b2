//! Storage helpers for run-owned state files

pub mod file_io;

pub use file_io::{read_json, write_bytes_atomic, write_json_atomic};
