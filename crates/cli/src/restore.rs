//! Restoring an archive into a directory

use crate::error::{chain, BackupError};
use crate::settings::Config;
use crate::util::display_name;
use cairn_core::{ArchiveCodec, ChecksumRecord, Checksummer};
use cairn_retention::sidecar_path_for;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of a restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub archive: PathBuf,
    pub target: PathBuf,
    /// Whether a checksum file was found and matched
    pub checksum_verified: bool,
}

/// Drives a restore against a configuration
pub struct RestoreOrchestrator<'a, A, C> {
    config: &'a Config,
    codec: A,
    checksummer: C,
}

impl<'a, A: ArchiveCodec, C: Checksummer> RestoreOrchestrator<'a, A, C> {
    pub fn new(config: &'a Config, codec: A, checksummer: C) -> Self {
        Self {
            config,
            codec,
            checksummer,
        }
    }

    /// Verify (when a checksum file exists) and unpack `archive` into `target`
    ///
    /// The target directory is created if needed. Entries that would land
    /// outside it are refused by the codec.
    pub fn run(&self, archive: &Path, target: &Path) -> Result<RestoreReport, BackupError> {
        let archive = self.resolve_archive(archive)?;
        info!("Restoring {} into {}", archive.display(), target.display());

        let checksum_verified = self.verify(&archive)?;

        if target.exists() && !target.is_dir() {
            return Err(BackupError::RestoreTarget {
                path: target.to_path_buf(),
                reason: "exists and is not a directory".to_string(),
            });
        }
        std::fs::create_dir_all(target).map_err(|e| BackupError::RestoreTarget {
            path: target.to_path_buf(),
            reason: e.to_string(),
        })?;

        self.codec
            .extract(&archive, target)
            .map_err(|e| BackupError::RestoreExtraction {
                path: archive.clone(),
                reason: chain(&e),
            })?;

        info!("Restore completed: {} -> {}", display_name(&archive), target.display());
        Ok(RestoreReport {
            archive,
            target: target.to_path_buf(),
            checksum_verified,
        })
    }

    /// Check the archive without touching the target
    pub fn dry_run(&self, archive: &Path, target: &Path) -> Result<RestoreReport, BackupError> {
        let archive = self.resolve_archive(archive)?;
        let checksum_verified = self.verify(&archive)?;
        info!(
            "[DRY RUN] Would restore {} into {}",
            archive.display(),
            target.display()
        );
        Ok(RestoreReport {
            archive,
            target: target.to_path_buf(),
            checksum_verified,
        })
    }

    /// An existing path as given, else a bare name inside the destination
    fn resolve_archive(&self, archive: &Path) -> Result<PathBuf, BackupError> {
        if archive.is_file() {
            return Ok(archive.to_path_buf());
        }

        let is_bare_name = archive.components().count() == 1 && archive.is_relative();
        if is_bare_name {
            let candidate = self.config.destination.join(archive);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        Err(BackupError::RestoreSourceMissing(archive.to_path_buf()))
    }

    fn verify(&self, archive: &Path) -> Result<bool, BackupError> {
        let sidecar = sidecar_path_for(archive);
        if !sidecar.exists() {
            warn!("No checksum file for {}, restoring unverified", display_name(archive));
            return Ok(false);
        }

        let failed = |reason: String| BackupError::ChecksumVerification {
            path: archive.to_path_buf(),
            reason,
        };
        let record = ChecksumRecord::read_sidecar(&sidecar, self.checksummer.algorithm())
            .map_err(|e| failed(chain(&e)))?;
        match self.checksummer.verify(archive, &record) {
            Ok(true) => {
                info!("Checksum verified");
                Ok(true)
            }
            Ok(false) => Err(failed("digest does not match the checksum file".to_string())),
            Err(e) => Err(failed(chain(&e))),
        }
    }
}
