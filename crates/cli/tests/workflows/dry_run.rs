//! Dry runs log the plan and change nothing

use crate::cairn;
use crate::common::Sandbox;
use anyhow::Result;
use std::fs;

#[test]
fn dry_run_creates_nothing() -> Result<()> {
    let sandbox = Sandbox::new(&["DAILY_KEEP=7"])?;
    let source = sandbox.source_arg();

    let result = cairn!(sandbox, "--dry-run", "--backup", source.as_str()).assert_success()?;
    assert!(result.contains_stdout("[DRY RUN] Would create archive"));
    assert!(result.contains_stdout("Dry run complete"));

    // No archive, no log, no lock, not even the destination directory
    assert!(!sandbox.destination().exists());
    assert!(!sandbox.lock_file().exists());
    Ok(())
}

#[test]
fn dry_run_reports_would_be_deletions() -> Result<()> {
    let sandbox = Sandbox::new(&["DAILY_KEEP=1"])?;
    sandbox.seed_archive("backup-2024-01-01_03-00-00.tar.gz", 10)?;
    sandbox.seed_archive("backup-2024-01-02_03-00-00.tar.gz", 10)?;
    let before: Vec<_> = {
        let mut names: Vec<_> = fs::read_dir(sandbox.destination())?
            .map(|e| e.map(|e| e.file_name()))
            .collect::<Result<_, _>>()?;
        names.sort();
        names
    };
    let source = sandbox.source_arg();

    let result = cairn!(sandbox, "--backup", source.as_str(), "--dry-run").assert_success()?;
    assert!(result.contains_stdout("[DRY RUN] Would delete backup-2024-01-02_03-00-00.tar.gz"));
    assert!(result.contains_stdout("[DRY RUN] Would delete backup-2024-01-01_03-00-00.tar.gz"));

    let mut after: Vec<_> = fs::read_dir(sandbox.destination())?
        .map(|e| e.map(|e| e.file_name()))
        .collect::<Result<_, _>>()?;
    after.sort();
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn dry_run_with_missing_source_fails() -> Result<()> {
    let sandbox = Sandbox::new(&[])?;
    let missing = sandbox.root().join("nope").display().to_string();

    let result = cairn!(sandbox, "--dry-run", "--backup", missing.as_str()).assert_failure()?;
    assert_eq!(result.exit_code, 1);
    assert!(!sandbox.destination().exists());
    Ok(())
}
