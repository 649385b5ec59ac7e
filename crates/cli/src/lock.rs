//! Lock file guarding mutating runs
//!
//! Only one backup or restore may run against a destination at a time. The
//! lock is an exclusively created file holding the owner's PID; it is removed
//! when the [`ProcessLock`] is dropped, or by the signal handlers installed
//! with [`ProcessLock::release_on_signal`].

use crate::error::BackupError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::SigId;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

/// Locks whose signal handlers are currently registered
static HOOKED_LOCKS: AtomicUsize = AtomicUsize::new(0);
static DEFAULT_FALLBACK: Once = Once::new();

/// Held lock; released on drop
pub struct ProcessLock {
    path: PathBuf,
    /// Cleared once the file is gone, so a late signal does not unlink a
    /// lock taken by another process
    armed: Arc<AtomicBool>,
    signal_ids: Vec<SigId>,
    hooked: bool,
    #[allow(dead_code)]
    file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    started_at: u64,
}

impl ProcessLock {
    /// Acquire the lock, failing fast if the file already exists
    ///
    /// A leftover file from a crashed run is never removed automatically;
    /// the error names the file and the PID recorded in it.
    pub fn acquire(path: &Path) -> Result<Self, BackupError> {
        let lock_error = |e: anyhow::Error| BackupError::Lock {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context("Failed to create lock directory")
                .map_err(lock_error)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BackupError::LockHeld {
                    path: path.to_path_buf(),
                    holder: describe_holder(path),
                });
            }
            Err(e) => {
                return Err(lock_error(
                    anyhow::Error::new(e).context("Failed to create lock file"),
                ))
            }
        };

        if let Err(e) = write_lock_content(&mut file) {
            let _ = std::fs::remove_file(path);
            return Err(lock_error(e));
        }

        tracing::debug!("Acquired lock {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            armed: Arc::new(AtomicBool::new(true)),
            signal_ids: Vec::new(),
            hooked: false,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file if the process is interrupted
    ///
    /// On SIGINT or SIGTERM the file is unlinked and the process exits with
    /// `128 + signal`. The handlers are unregistered when the lock is dropped,
    /// after which the signals terminate the process as they normally would.
    pub fn release_on_signal(&mut self) -> Result<()> {
        if self.hooked {
            return Ok(());
        }
        let path = CString::new(self.path.as_os_str().as_bytes())
            .context("Lock path contains a NUL byte")?;

        install_default_fallback();
        HOOKED_LOCKS.fetch_add(1, Ordering::SeqCst);
        self.hooked = true;

        for signal in [SIGINT, SIGTERM] {
            let armed = Arc::clone(&self.armed);
            let path = path.clone();
            // Only async-signal-safe calls in here: an atomic swap, unlink, _exit
            let id = unsafe {
                signal_hook::low_level::register(signal, move || {
                    if armed.swap(false, Ordering::SeqCst) {
                        let _ = nix::unistd::unlink(path.as_c_str());
                    }
                    signal_hook::low_level::exit(128 + signal);
                })
            };
            match id {
                Ok(id) => self.signal_ids.push(id),
                Err(e) => {
                    self.unregister_signals();
                    return Err(e)
                        .with_context(|| format!("Failed to install handler for signal {}", signal));
                }
            }
        }

        Ok(())
    }

    /// Release the lock explicitly, reporting a failed removal
    pub fn release(mut self) -> Result<()> {
        self.unregister_signals();
        if self.armed.swap(false, Ordering::SeqCst) {
            std::fs::remove_file(&self.path).context("Failed to remove lock file")?;
        }
        Ok(())
    }

    fn unregister_signals(&mut self) {
        for id in self.signal_ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
        if std::mem::take(&mut self.hooked) {
            HOOKED_LOCKS.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.unregister_signals();
        if self.armed.swap(false, Ordering::SeqCst) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Give SIGINT/SIGTERM their default action whenever no lock is hooked
///
/// signal-hook keeps its own handler installed after the last action is
/// unregistered, which would otherwise leave both signals ignored.
fn install_default_fallback() {
    DEFAULT_FALLBACK.call_once(|| {
        for signal in [SIGINT, SIGTERM] {
            let registered = unsafe {
                signal_hook::low_level::register(signal, move || {
                    if HOOKED_LOCKS.load(Ordering::SeqCst) == 0 {
                        let _ = signal_hook::low_level::emulate_default_handler(signal);
                    }
                })
            };
            if let Err(e) = registered {
                tracing::warn!("Failed to install default handler for signal {}: {}", signal, e);
            }
        }
    });
}

/// Write PID and start time
fn write_lock_content(file: &mut File) -> Result<()> {
    let content = LockContent {
        pid: std::process::id(),
        started_at: current_timestamp_ms(),
    };

    let serialized =
        serde_json::to_string(&content).context("Failed to serialize lock content")?;
    file.write_all(serialized.as_bytes())
        .context("Failed to write lock file")?;
    file.sync_all().context("Failed to sync lock file")?;
    Ok(())
}

fn read_lock_content(path: &Path) -> Result<LockContent> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).context("Failed to deserialize lock content")
}

/// Human-readable description of whoever holds the lock
fn describe_holder(path: &Path) -> String {
    match read_lock_content(path) {
        Ok(content) if is_process_alive(content.pid) => {
            format!("held by running pid {}", content.pid)
        }
        Ok(content) => format!("held by pid {}, which is no longer running", content.pid),
        Err(_) => "holder unknown".to_string(),
    }
}

/// Check if process is alive
#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Null signal: existence check only
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

/// Get current timestamp in milliseconds
fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
