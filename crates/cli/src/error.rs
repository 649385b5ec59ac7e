//! Failure taxonomy for backup, restore and list runs
//!
//! Library code reports `anyhow` errors with context; the orchestrators fold
//! them into one of these variants so the binary can log a single line and
//! exit 1.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Archive creation failed: {0}")]
    ArchiveCreation(String),

    /// Logged by the backup flow, which then carries on to verification
    #[error("Checksum creation failed: {0}")]
    ChecksumCreation(String),

    #[error("Checksum verification failed for {}: {reason}", path.display())]
    ChecksumVerification { path: PathBuf, reason: String },

    #[error("Extraction test failed for {}: {reason}", path.display())]
    ExtractionTest { path: PathBuf, reason: String },

    #[error("Archive to restore not found: {}", .0.display())]
    RestoreSourceMissing(PathBuf),

    #[error("Cannot restore into {}: {reason}", path.display())]
    RestoreTarget { path: PathBuf, reason: String },

    #[error("Extraction of {} failed: {reason}", path.display())]
    RestoreExtraction { path: PathBuf, reason: String },

    #[error(
        "Another run holds the lock {} ({holder}); if no backup is running, remove the file and retry",
        path.display()
    )]
    LockHeld { path: PathBuf, holder: String },

    #[error("Failed to create lock file {}: {reason}", path.display())]
    Lock { path: PathBuf, reason: String },

    #[error("Rotation incomplete: {0}")]
    Rotation(String),
}

/// Render an anyhow error with its full context chain on one line
pub(crate) fn chain(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
