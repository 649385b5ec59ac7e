//! Cairn Core - Collaborators behind the backup flows
//!
//! This crate provides:
//! - tar.gz archiving, integrity testing and extraction
//! - Checksum algorithms and sidecar files
//! - Validated exclude patterns

pub mod archive;
pub mod checksum;
pub mod exclude;

// Re-export main types for convenience
pub use archive::{is_staging_name, ArchiveCodec, ArchiveStats, TarGz};
pub use checksum::{ChecksumAlgorithm, ChecksumRecord, Checksummer, UnknownAlgorithm};
pub use exclude::{ExcludeMatcher, ExcludeRules, InvalidPattern};

/// Common result type used throughout cairn-core
pub type Result<T> = anyhow::Result<T>;
