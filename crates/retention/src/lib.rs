//! Retention rules for cairn backups
//!
//! This crate provides:
//! - Archive naming and timestamp extraction
//! - Calendar bucket keys (day, ISO week, month)
//! - The tiered daily/weekly/monthly retention classifier
//!
//! Nothing here touches the filesystem; applying a decision is up to the caller.

pub mod bucket;
pub mod classifier;
pub mod naming;
pub mod record;

// Re-exports
pub use bucket::{bucket_key_for, BucketKey, Granularity};
pub use classifier::{Classifier, Kept, RetentionDecision, RetentionPolicy, Tier};
pub use naming::{archive_name_for, derive_timestamp, is_archive_name, sidecar_path_for};
pub use record::{BackupRecord, Timestamped};
