//! Listing the archives in a backup destination

use anyhow::{Context, Result};
use cairn_retention::naming::archive_sequence;
use cairn_retention::{is_archive_name, BackupRecord, Timestamped};
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One archive found in the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<SystemTime>,
    /// Timestamp carried by the name, if any
    pub captured_at: Option<NaiveDateTime>,
}

impl ArchiveEntry {
    pub fn record(&self) -> BackupRecord {
        BackupRecord {
            archive_id: self.name.clone(),
            path: self.path.clone(),
            checksum_path: cairn_retention::sidecar_path_for(&self.path),
        }
    }
}

/// Archives in `destination`, newest first
///
/// Ordering: embedded timestamp descending (undated names last), then the
/// same-second sequence number, then modification time, then name. Each call
/// rereads the directory.
/// A destination that does not exist yet holds no archives.
pub fn list_backups(destination: &Path) -> Result<impl Iterator<Item = ArchiveEntry>> {
    Ok(scan_archives(destination)?.into_iter())
}

pub(crate) fn scan_archives(destination: &Path) -> Result<Vec<ArchiveEntry>> {
    let dir = match std::fs::read_dir(destination) {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to read backup directory {}", destination.display())
            })
        }
    };

    let mut entries = Vec::new();
    for dir_entry in dir {
        let dir_entry = dir_entry
            .with_context(|| format!("Failed to read backup directory {}", destination.display()))?;

        let Some(name) = dir_entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !is_archive_name(&name) {
            continue;
        }

        let path = dir_entry.path();
        // Vanished between readdir and stat: skip it
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        entries.push(ArchiveEntry {
            captured_at: name.captured_at(),
            name,
            path,
            size_bytes: metadata.len(),
            modified: metadata.modified().ok(),
        });
    }

    entries.sort_by(newest_first);
    Ok(entries)
}

pub(crate) fn newest_first(a: &ArchiveEntry, b: &ArchiveEntry) -> Ordering {
    b.captured_at
        .cmp(&a.captured_at)
        .then_with(|| archive_sequence(&b.name).cmp(&archive_sequence(&a.name)))
        .then_with(|| b.modified.cmp(&a.modified))
        .then_with(|| b.name.cmp(&a.name))
}
