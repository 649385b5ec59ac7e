//! cairn: integrity-verified directory backups with tiered rotation
//!
//! This crate wires the pieces together:
//! - Configuration loading (`backup.conf` plus `CAIRN_*` overrides)
//! - Console and file logging
//! - The lock that keeps runs from overlapping
//! - Backup (archive, checksum, verify, test, rotate), restore and listing

pub mod backup;
pub mod error;
pub mod list;
pub mod lock;
pub mod logging;
pub mod restore;
pub mod settings;
pub mod util;

// Re-exports
pub use backup::{BackupOrchestrator, BackupReport, RotationSummary, RunMode};
pub use error::BackupError;
pub use list::{list_backups, ArchiveEntry};
pub use lock::ProcessLock;
pub use restore::{RestoreOrchestrator, RestoreReport};
pub use settings::Config;
