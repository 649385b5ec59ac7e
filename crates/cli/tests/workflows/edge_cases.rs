//! Usage, configuration and locking edge cases

use crate::cairn;
use crate::common::Sandbox;
use anyhow::Result;
use cairn_core::is_staging_name;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fs;
use std::time::{Duration, Instant};

#[test]
fn no_arguments_prints_usage() -> Result<()> {
    let sandbox = Sandbox::new(&[])?;
    let result = sandbox.command().assert_success()?;
    assert!(result.contains_stdout("Usage:"));
    assert!(result.contains_stdout("--backup"));
    Ok(())
}

#[test]
fn unknown_or_conflicting_arguments_print_usage() -> Result<()> {
    let sandbox = Sandbox::new(&[])?;
    let source = sandbox.source_arg();

    let result = cairn!(sandbox, "--frobnicate").assert_success()?;
    assert!(result.contains_stdout("Usage:"));

    let result = cairn!(sandbox, "--list", "--backup", source.as_str()).assert_success()?;
    assert!(result.contains_stdout("Usage:"));
    assert!(!sandbox.destination().exists());

    // --restore needs both an archive and a directory
    let result = cairn!(sandbox, "--restore", "backup.tar.gz").assert_success()?;
    assert!(result.contains_stdout("Usage:"));
    Ok(())
}

#[test]
fn missing_config_fails() -> Result<()> {
    let sandbox = Sandbox::new(&[])?;
    let missing = sandbox.root().join("absent.conf").display().to_string();

    let result = cairn!(sandbox, "--list")
        .env("CAIRN_CONFIG", missing)
        .assert_failure()?;
    assert_eq!(result.exit_code, 1);
    assert!(result.contains_stderr("Configuration error"));
    Ok(())
}

#[test]
fn invalid_config_value_fails() -> Result<()> {
    let sandbox = Sandbox::new(&["WEEKLY_KEEP=lots"])?;
    let source = sandbox.source_arg();

    let result = cairn!(sandbox, "--backup", source.as_str()).assert_failure()?;
    assert!(result.contains_stderr("WEEKLY_KEEP"));
    assert!(!sandbox.destination().exists());
    Ok(())
}

#[test]
fn invalid_exclude_pattern_fails() -> Result<()> {
    let sandbox = Sandbox::new(&["DAILY_KEEP=7"])?;
    let source = sandbox.source_arg();

    let result = cairn!(sandbox, "--backup", source.as_str())
        .env("CAIRN_EXCLUDE_PATTERNS", "*.log,[oops")
        .assert_failure()?;
    assert_eq!(result.exit_code, 1);
    assert!(result.contains_stderr("EXCLUDE_PATTERNS"));
    assert!(result.contains_stderr("[oops"));
    assert!(!sandbox.destination().exists());
    Ok(())
}

#[test]
fn config_found_in_working_directory() -> Result<()> {
    let sandbox = Sandbox::new(&[])?;
    sandbox.seed_archive("backup-2025-11-01_00-00-00.tar.gz", 512)?;

    // No CAIRN_CONFIG: ./backup.conf in the working directory is used
    let mut command = crate::common::cli::CairnCommand::new(sandbox.root());
    let result = command.args(&["--list"]).assert_success()?;
    assert!(result.contains_stdout("backup-2025-11-01_00-00-00.tar.gz - 512 B"));
    Ok(())
}

#[test]
fn held_lock_blocks_backup() -> Result<()> {
    let sandbox = Sandbox::new(&["DAILY_KEEP=7"])?;
    fs::create_dir_all(sandbox.destination())?;
    fs::write(sandbox.lock_file(), r#"{"pid":999999,"started_at":1}"#)?;
    let source = sandbox.source_arg();

    let result = cairn!(sandbox, "--backup", source.as_str()).assert_failure()?;
    assert_eq!(result.exit_code, 1);
    assert!(result.contains_stdout("Another run holds the lock"));
    assert!(result.contains_stdout("999999"));

    // Nothing archived, and the lock is left for the operator
    assert!(sandbox.archives()?.is_empty());
    assert!(sandbox.lock_file().exists());

    // The refusal is in the log as well
    let log = fs::read_to_string(sandbox.log_file())?;
    assert!(log.contains("ERROR: Another run holds the lock"));
    Ok(())
}

#[test]
fn held_lock_does_not_block_list_or_dry_run() -> Result<()> {
    let sandbox = Sandbox::new(&["DAILY_KEEP=7"])?;
    fs::create_dir_all(sandbox.destination())?;
    fs::write(sandbox.lock_file(), r#"{"pid":999999,"started_at":1}"#)?;
    let source = sandbox.source_arg();

    cairn!(sandbox, "--list").assert_success()?;
    cairn!(sandbox, "--dry-run", "--backup", source.as_str()).assert_success()?;
    Ok(())
}

#[test]
fn default_lock_is_shared_between_destinations() -> Result<()> {
    let shared_tmp = tempfile::TempDir::new()?;
    let tmpdir = shared_tmp.path().display().to_string();
    let lock = shared_tmp.path().join("cairn.lock");
    fs::write(&lock, r#"{"pid":999999,"started_at":1}"#)?;

    let first = Sandbox::with_default_lock(&["DAILY_KEEP=7"])?;
    let second = Sandbox::with_default_lock(&["DAILY_KEEP=7"])?;
    assert_ne!(first.destination(), second.destination());

    for sandbox in [&first, &second] {
        let source = sandbox.source_arg();
        let result = cairn!(sandbox, "--backup", source.as_str())
            .env("TMPDIR", &tmpdir)
            .assert_failure()?;
        assert!(result.contains_stdout("Another run holds the lock"));
        assert!(result.contains_stdout(&lock.display().to_string()));
        assert!(sandbox.archives()?.is_empty());
    }

    fs::remove_file(&lock)?;
    let source = first.source_arg();
    cairn!(first, "--backup", source.as_str())
        .env("TMPDIR", &tmpdir)
        .assert_success()?;
    assert_eq!(first.archives()?.len(), 1);
    assert!(!lock.exists());
    Ok(())
}

fn partial_archives(sandbox: &Sandbox) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if sandbox.destination().exists() {
        for entry in fs::read_dir(sandbox.destination())? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if is_staging_name(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

#[test]
fn terminated_backup_removes_lock() -> Result<()> {
    let sandbox = Sandbox::new(&["DAILY_KEEP=7"])?;

    // Incompressible data keeps the archiver busy long enough to interrupt it
    let bulk = sandbox.source().join("bulk");
    fs::create_dir_all(&bulk)?;
    let mut rng = ChaCha8Rng::seed_from_u64(143);
    let mut chunk = vec![0u8; 1024 * 1024];
    for i in 0..96 {
        rng.fill_bytes(&mut chunk);
        fs::write(bulk.join(format!("{:03}.bin", i)), &chunk)?;
    }

    let source = sandbox.source_arg();
    let mut child = cairn!(sandbox, "--backup", source.as_str()).spawn()?;

    // The temporary archive only appears after the signal handlers are set
    let deadline = Instant::now() + Duration::from_secs(30);
    while partial_archives(&sandbox)?.is_empty() {
        if child.try_wait()?.is_some() {
            anyhow::bail!("backup finished before it could be interrupted");
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            anyhow::bail!("no temporary archive appeared");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(sandbox.lock_file().exists());

    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM)?;
    let status = child.wait()?;
    assert_eq!(status.code(), Some(128 + 15));

    assert!(!sandbox.lock_file().exists());
    assert!(sandbox.archives()?.is_empty());
    assert_eq!(partial_archives(&sandbox)?.len(), 1);

    // The next run clears the leftover and completes
    let result = cairn!(sandbox, "--backup", source.as_str()).assert_success()?;
    assert!(result.contains_stdout("Removed partial archive"));
    assert!(partial_archives(&sandbox)?.is_empty());
    assert_eq!(sandbox.archives()?.len(), 1);
    Ok(())
}
