//! Restore an archive into a directory

use super::init_logging;
use cairn_cli::{settings, BackupError, ProcessLock, RestoreOrchestrator};
use cairn_core::TarGz;
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(archive: &Path, target: &Path, dry_run: bool) -> Result<(), BackupError> {
    let config = settings::load()?;
    let orchestrator = RestoreOrchestrator::new(&config, TarGz::default(), config.checksum);

    if dry_run {
        init_logging(None)?;
        orchestrator.dry_run(archive, target)?;
        return Ok(());
    }

    init_logging(Some(&config.log_file))?;

    let mut lock = ProcessLock::acquire(&config.lock_file)?;
    lock.release_on_signal().map_err(|e| BackupError::Lock {
        path: lock.path().to_path_buf(),
        reason: format!("{:#}", e),
    })?;

    let report = orchestrator.run(archive, target)?;

    println!();
    println!("{}", "Restore complete".green().bold());
    println!("  From: {}", report.archive.display().to_string().cyan());
    println!("  Into: {}", report.target.display());
    if !report.checksum_verified {
        println!("  {}", "No checksum file found, archive was not verified".yellow());
    }
    Ok(())
}
