//! Backup runs: archive, checksum, verify, test, rotate
//!
//! A run moves through fixed stages and stops at the first fatal failure:
//!
//! ```text
//! validate -> archive -> checksum -> verify checksum -> test extraction -> rotate
//! ```
//!
//! Writing the checksum is the one non-fatal stage: a failure is logged and
//! the verification that follows fails instead. Rotation only ever runs after
//! every earlier stage succeeded, so a backup that cannot be trusted never
//! causes older ones to be deleted.

use crate::error::{chain, BackupError};
use crate::list::{newest_first, scan_archives, ArchiveEntry};
use crate::settings::Config;
use crate::util::{display_name, format_size};
use anyhow::{Context, Result};
use cairn_core::{is_staging_name, ArchiveCodec, ArchiveStats, ChecksumRecord, Checksummer};
use cairn_retention::naming::numbered_archive_name;
use cairn_retention::{
    sidecar_path_for, BackupRecord, Classifier, RetentionDecision, Timestamped,
};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{error, info, warn};

/// Whether a run touches the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Live,
    /// Log every action, perform none
    DryRun,
}

impl RunMode {
    fn tag(self) -> &'static str {
        match self {
            RunMode::Live => "",
            RunMode::DryRun => "[DRY RUN] ",
        }
    }
}

/// What rotation did (or would do)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationSummary {
    pub kept: usize,
    /// Deleted, or selected for deletion in a dry run
    pub deleted: Vec<String>,
    /// Selected for deletion but could not be removed
    pub failed: Vec<String>,
    pub unparsed: usize,
}

/// Outcome of a backup run
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub mode: RunMode,
    /// Created archive, or the one a dry run would have created
    pub archive: PathBuf,
    /// Archive contents; `None` for a dry run
    pub stats: Option<ArchiveStats>,
    pub archive_size: Option<u64>,
    pub rotation: RotationSummary,
}

type RotationHook<'a> = Box<dyn Fn(&RetentionDecision<BackupRecord>) + 'a>;

/// Drives one backup run against a configuration
pub struct BackupOrchestrator<'a, A, C> {
    config: &'a Config,
    codec: A,
    checksummer: C,
    captured_at: Option<NaiveDateTime>,
    rotation_hook: Option<RotationHook<'a>>,
}

impl<'a, A: ArchiveCodec, C: Checksummer> BackupOrchestrator<'a, A, C> {
    pub fn new(config: &'a Config, codec: A, checksummer: C) -> Self {
        Self {
            config,
            codec,
            checksummer,
            captured_at: None,
            rotation_hook: None,
        }
    }

    /// Use a fixed capture time instead of the local clock
    pub fn captured_at(mut self, captured_at: NaiveDateTime) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    /// Observe each retention decision before it is applied
    pub fn on_rotation(mut self, hook: impl Fn(&RetentionDecision<BackupRecord>) + 'a) -> Self {
        self.rotation_hook = Some(Box::new(hook));
        self
    }

    /// Create, verify and rotate
    ///
    /// The caller holds the lock, so temporary archives already in the
    /// destination belong to a killed run and are removed first.
    pub fn run(&self, source: &Path) -> Result<BackupReport, BackupError> {
        validate_source(source)?;
        info!("Starting backup of {}", source.display());

        let destination = &self.config.destination;
        std::fs::create_dir_all(destination)
            .with_context(|| format!("Failed to create {}", destination.display()))
            .map_err(|e| BackupError::ArchiveCreation(chain(&e)))?;
        sweep_staging_files(destination);

        let archive = next_archive_path(destination, self.capture_time());
        let name = display_name(&archive);
        info!("Creating archive {}", archive.display());

        let stats = self
            .codec
            .compress_directory(source, &self.config.excludes, &archive)
            .map_err(|e| BackupError::ArchiveCreation(chain(&e)))?;
        let archive_size = std::fs::metadata(&archive).map(|m| m.len()).ok();
        info!(
            "Archive created: {} ({} files, {})",
            name,
            stats.files,
            format_size(archive_size.unwrap_or(0))
        );

        let sidecar = sidecar_path_for(&archive);
        if let Err(e) = self.write_checksum(&archive, &sidecar) {
            error!("{}", e);
        }
        self.verify_checksum(&archive, &sidecar)?;
        self.test_extraction(&archive)?;

        let rotation = self.rotate(RunMode::Live, None)?;
        if !rotation.failed.is_empty() {
            return Err(BackupError::Rotation(format!(
                "{} of {} deletions failed: {}",
                rotation.failed.len(),
                rotation.failed.len() + rotation.deleted.len(),
                rotation.failed.join(", ")
            )));
        }

        info!("Backup completed successfully: {}", name);
        Ok(BackupReport {
            mode: RunMode::Live,
            archive,
            stats: Some(stats),
            archive_size,
            rotation,
        })
    }

    /// Log what [`run`](Self::run) would do, changing nothing
    pub fn dry_run(&self, source: &Path) -> Result<BackupReport, BackupError> {
        let tag = RunMode::DryRun.tag();
        validate_source(source)?;
        info!("{}Starting backup of {}", tag, source.display());

        let archive = next_archive_path(&self.config.destination, self.capture_time());
        info!("{}Would create archive {}", tag, archive.display());
        info!(
            "{}Would write {} checksum to {}",
            tag,
            self.checksummer.algorithm(),
            sidecar_path_for(&archive).display()
        );
        info!("{}Would verify checksum and test extraction", tag);

        let rotation = self.rotate(RunMode::DryRun, BackupRecord::from_archive_path(&archive))?;

        info!("{}Finished, nothing was changed", tag);
        Ok(BackupReport {
            mode: RunMode::DryRun,
            archive,
            stats: None,
            archive_size: None,
            rotation,
        })
    }

    /// Apply the retention policy to the archives in the destination
    ///
    /// `pending` is an archive that does not exist yet but should be counted,
    /// as in a dry run. Deletions are independent of each other; failures
    /// are logged and collected in the summary.
    pub fn rotate(
        &self,
        mode: RunMode,
        pending: Option<BackupRecord>,
    ) -> Result<RotationSummary, BackupError> {
        let tag = mode.tag();
        let destination = &self.config.destination;

        let mut entries = scan_archives(destination)
            .map_err(|e| BackupError::Rotation(chain(&e)))?;
        if let Some(record) = pending {
            entries.push(ArchiveEntry {
                captured_at: record.captured_at(),
                name: record.archive_id,
                path: record.path,
                size_bytes: 0,
                modified: Some(SystemTime::now()),
            });
            entries.sort_by(newest_first);
        }

        if entries.is_empty() {
            info!("{}Rotation: no backups in {}, nothing to do", tag, destination.display());
            return Ok(RotationSummary::default());
        }

        info!(
            "{}Rotation: {} backups, keeping {}",
            tag,
            entries.len(),
            self.config.policy
        );

        let records = entries.iter().map(ArchiveEntry::record);
        let decision = Classifier::new(self.config.policy).classify(records);
        if let Some(hook) = &self.rotation_hook {
            hook(&decision);
        }

        for kept in &decision.keep {
            info!("{}Keeping {} ({} {})", tag, kept.record.archive_id, kept.tier, kept.bucket);
        }
        for record in &decision.unparsed {
            warn!("{}Skipping {}: no date in name", tag, record.archive_id);
        }

        let mut summary = RotationSummary {
            kept: decision.keep.len(),
            unparsed: decision.unparsed.len(),
            ..RotationSummary::default()
        };

        for record in decision.delete {
            match mode {
                RunMode::DryRun => {
                    info!("{}Would delete {}", tag, record.archive_id);
                    summary.deleted.push(record.archive_id);
                }
                RunMode::Live => match delete_record(&record) {
                    Ok(()) => {
                        info!("Deleted {}", record.archive_id);
                        summary.deleted.push(record.archive_id);
                    }
                    Err(e) => {
                        error!("Failed to delete {}: {:#}", record.archive_id, e);
                        summary.failed.push(record.archive_id);
                    }
                },
            }
        }

        info!(
            "{}Rotation finished: {} kept, {} deleted, {} failed",
            tag,
            summary.kept,
            summary.deleted.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    fn capture_time(&self) -> NaiveDateTime {
        self.captured_at
            .unwrap_or_else(|| chrono::Local::now().naive_local())
    }

    fn write_checksum(&self, archive: &Path, sidecar: &Path) -> Result<(), BackupError> {
        let record = self
            .checksummer
            .compute(archive)
            .and_then(|record| record.write_sidecar(sidecar).map(|()| record))
            .map_err(|e| BackupError::ChecksumCreation(chain(&e)))?;
        info!(
            "Checksum written: {} ({} {})",
            display_name(sidecar),
            record.algorithm,
            record.digest
        );
        Ok(())
    }

    fn verify_checksum(&self, archive: &Path, sidecar: &Path) -> Result<(), BackupError> {
        let failed = |reason: String| BackupError::ChecksumVerification {
            path: archive.to_path_buf(),
            reason,
        };

        let record = ChecksumRecord::read_sidecar(sidecar, self.checksummer.algorithm())
            .map_err(|e| failed(chain(&e)))?;
        match self.checksummer.verify(archive, &record) {
            Ok(true) => {
                info!("Checksum verified");
                Ok(())
            }
            Ok(false) => Err(failed("digest does not match the checksum file".to_string())),
            Err(e) => Err(failed(chain(&e))),
        }
    }

    fn test_extraction(&self, archive: &Path) -> Result<(), BackupError> {
        let entries = self
            .codec
            .test_integrity(archive)
            .map_err(|e| BackupError::ExtractionTest {
                path: archive.to_path_buf(),
                reason: chain(&e),
            })?;
        info!("Extraction test passed ({} entries)", entries);
        Ok(())
    }
}

fn validate_source(source: &Path) -> Result<(), BackupError> {
    if source.is_dir() {
        Ok(())
    } else {
        Err(BackupError::SourceNotFound(source.to_path_buf()))
    }
}

/// First archive path for `captured_at` not already taken
fn next_archive_path(destination: &Path, captured_at: NaiveDateTime) -> PathBuf {
    let mut n = 0;
    loop {
        let candidate = destination.join(numbered_archive_name(captured_at, n));
        if !candidate.exists() && !sidecar_path_for(&candidate).exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Remove temporary archives left behind by an interrupted run
fn sweep_staging_files(destination: &Path) {
    let Ok(dir) = std::fs::read_dir(destination) else {
        return;
    };
    for entry in dir.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().filter(|name| is_staging_name(name)) else {
            continue;
        };
        match std::fs::remove_file(entry.path()) {
            Ok(()) => warn!("Removed partial archive {} from an interrupted run", name),
            Err(e) => warn!("Failed to remove partial archive {}: {}", name, e),
        }
    }
}

/// Remove an archive and its sidecar
fn delete_record(record: &BackupRecord) -> Result<()> {
    std::fs::remove_file(&record.path)
        .with_context(|| format!("Failed to remove {}", record.path.display()))?;
    match std::fs::remove_file(&record.checksum_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e)
            .with_context(|| format!("Failed to remove {}", record.checksum_path.display())),
    }
}
