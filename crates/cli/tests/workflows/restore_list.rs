//! Listing and restoring backups

use crate::cairn;
use crate::common::Sandbox;
use anyhow::Result;
use std::fs;

#[test]
fn list_prints_name_and_size_newest_first() -> Result<()> {
    let sandbox = Sandbox::new(&[])?;
    sandbox.seed_archive("backup-2025-11-01_00-00-00.tar.gz", 512)?;
    sandbox.seed_archive("backup-2025-11-02_00-00-00.tar.gz", 1536)?;
    sandbox.seed_archive("backup-2025-10-20_00-00-00.tar.gz", 3 * 1024 * 1024)?;

    let result = cairn!(sandbox, "--list").assert_success()?;
    let lines: Vec<_> = result.stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "backup-2025-11-02_00-00-00.tar.gz - 1.50 KB",
            "backup-2025-11-01_00-00-00.tar.gz - 512 B",
            "backup-2025-10-20_00-00-00.tar.gz - 3.00 MB",
        ]
    );
    Ok(())
}

#[test]
fn list_with_no_backups() -> Result<()> {
    let sandbox = Sandbox::new(&[])?;

    let result = cairn!(sandbox, "--list").assert_success()?;
    assert!(result.contains_stdout("No backups found in"));
    // Listing never creates the destination
    assert!(!sandbox.destination().exists());
    Ok(())
}

#[test]
fn backup_then_restore_roundtrip() -> Result<()> {
    let sandbox = Sandbox::new(&["DAILY_KEEP=7"])?;
    let source = sandbox.source_arg();
    cairn!(sandbox, "--backup", source.as_str()).assert_success()?;

    let listed = cairn!(sandbox, "--list").assert_success()?.listed_archives();
    assert_eq!(listed.len(), 1);

    let target = sandbox.root().join("restored");
    let target_arg = target.display().to_string();
    // Bare name, resolved against the destination
    let result = cairn!(sandbox, "--restore", listed[0].as_str(), target_arg.as_str())
        .assert_success()?;
    assert!(result.contains_stdout("Restore complete"));

    assert_eq!(fs::read_to_string(target.join("home/notes.txt"))?, "buy milk\n");
    assert_eq!(fs::read(target.join("home/photos/2025/beach.jpg"))?.len(), 4096);
    // Excluded at backup time
    assert!(!target.join("home/cache/blob.tmp").exists());
    assert!(target.join("home/cache").is_dir());
    assert!(!sandbox.lock_file().exists());
    Ok(())
}

#[test]
fn restore_missing_archive_fails() -> Result<()> {
    let sandbox = Sandbox::new(&[])?;
    let target = sandbox.root().join("restored").display().to_string();

    let result = cairn!(
        sandbox,
        "--restore",
        "backup-1999-01-01_00-00-00.tar.gz",
        target.as_str()
    )
    .assert_failure()?;

    assert_eq!(result.exit_code, 1);
    assert!(result.contains_stdout("ERROR: Archive to restore not found"));
    assert!(!sandbox.root().join("restored").exists());
    Ok(())
}

#[test]
fn restore_refuses_tampered_archive() -> Result<()> {
    let sandbox = Sandbox::new(&["DAILY_KEEP=7"])?;
    let source = sandbox.source_arg();
    cairn!(sandbox, "--backup", source.as_str()).assert_success()?;

    let archive = sandbox.destination().join(&sandbox.archives()?[0]);
    let mut bytes = fs::read(&archive)?;
    bytes.extend_from_slice(b"tampered");
    fs::write(&archive, bytes)?;

    let archive_arg = archive.display().to_string();
    let target = sandbox.root().join("restored");
    let target_arg = target.display().to_string();
    let result = cairn!(sandbox, "--restore", archive_arg.as_str(), target_arg.as_str())
        .assert_failure()?;

    assert!(result.contains_stdout("ERROR: Checksum verification failed"));
    assert!(!target.exists());
    Ok(())
}
