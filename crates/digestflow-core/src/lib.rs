//! Core types and traits for digestflow.
//!
//! This crate provides the data model shared by the pipeline and the
//! command-line front end: content hashes and the pluggable digest
//! algorithm, per-file results, the aggregated digest table, the error
//! taxonomy, and run configuration.

mod config;
mod error;
mod hash;
mod table;

pub use config::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_READ_BUFFER_SIZE, DigestConfig, DigestConfigBuilder,
    ErrorPolicy,
};
pub use error::{AbortCause, DigestError, FileFailure};
pub use hash::{Blake3Digester, ContentHash, DigestSink, Digester};
pub use table::{DigestReport, DigestTable, DuplicateGroup, FileResult};
