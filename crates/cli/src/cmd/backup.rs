//! Create a backup and rotate old ones

use super::init_logging;
use cairn_cli::util::{display_name, format_size};
use cairn_cli::{settings, BackupError, BackupOrchestrator, BackupReport, ProcessLock};
use cairn_core::TarGz;
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(source: &Path, dry_run: bool) -> Result<(), BackupError> {
    let config = settings::load()?;

    if dry_run {
        // Console only: a dry run leaves no trace in the destination
        init_logging(None)?;
        let report = BackupOrchestrator::new(&config, TarGz::default(), config.checksum)
            .dry_run(source)?;
        print_dry_run(&report);
        return Ok(());
    }

    init_logging(Some(&config.log_file))?;

    let mut lock = ProcessLock::acquire(&config.lock_file)?;
    lock.release_on_signal().map_err(|e| BackupError::Lock {
        path: lock.path().to_path_buf(),
        reason: format!("{:#}", e),
    })?;

    let report = BackupOrchestrator::new(&config, TarGz::default(), config.checksum).run(source)?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &BackupReport) {
    println!();
    println!("{}", "Backup complete".green().bold());
    println!(
        "  Archive:   {} ({}, {} files)",
        display_name(&report.archive).cyan(),
        format_size(report.archive_size.unwrap_or(0)),
        report.stats.map(|s| s.files).unwrap_or(0)
    );
    println!(
        "  Rotation:  {} kept, {} deleted",
        report.rotation.kept,
        report.rotation.deleted.len().to_string().yellow()
    );
    if report.rotation.unparsed > 0 {
        println!(
            "  {}",
            format!("{} archives without a date were left alone", report.rotation.unparsed).dimmed()
        );
    }
}

fn print_dry_run(report: &BackupReport) {
    println!();
    println!("{}", "Dry run complete, nothing was changed".yellow().bold());
    println!("  Would create: {}", display_name(&report.archive).cyan());
    println!(
        "  Would keep {} and delete {}",
        report.rotation.kept,
        report.rotation.deleted.len()
    );
}
