//! Backup records as seen by rotation

use crate::naming::{derive_timestamp, sidecar_path_for};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// Anything rotation can place on the calendar
pub trait Timestamped {
    /// Capture instant, or `None` when it cannot be determined
    fn captured_at(&self) -> Option<NaiveDateTime>;
}

impl Timestamped for str {
    fn captured_at(&self) -> Option<NaiveDateTime> {
        derive_timestamp(self)
    }
}

impl Timestamped for String {
    fn captured_at(&self) -> Option<NaiveDateTime> {
        derive_timestamp(self)
    }
}

impl<T: Timestamped + ?Sized> Timestamped for &T {
    fn captured_at(&self) -> Option<NaiveDateTime> {
        (**self).captured_at()
    }
}

/// One archive in the backup destination, together with its checksum sidecar
///
/// Records are deleted as a unit: archive and sidecar go together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Archive file name; carries the capture timestamp
    pub archive_id: String,
    /// Full path of the archive
    pub path: PathBuf,
    /// Full path of the checksum sidecar (may not exist)
    pub checksum_path: PathBuf,
}

impl BackupRecord {
    /// Build a record from an archive path
    ///
    /// Returns `None` if the path has no UTF-8 file name.
    pub fn from_archive_path(path: &Path) -> Option<Self> {
        let archive_id = path.file_name()?.to_str()?.to_string();
        Some(Self {
            archive_id,
            path: path.to_path_buf(),
            checksum_path: sidecar_path_for(path),
        })
    }
}

impl Timestamped for BackupRecord {
    fn captured_at(&self) -> Option<NaiveDateTime> {
        derive_timestamp(&self.archive_id)
    }
}
