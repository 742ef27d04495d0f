//! Single-instance process lock
//!
//! One sync process may mutate the cache at a time. The lock is a JSON file
//! `{ "pid", "started_at", "mode" }` created with `O_CREAT | O_EXCL`; a
//! record whose pid is no longer alive (or which cannot be parsed) is stale
//! and removed with a warning. The returned [`LockGuard`] removes the file on
//! drop, so every exit path (normal return, `?`, panic unwinding, interrupt
//! handling that unwinds back to `main`) releases the lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Contents of the lock file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub mode: String,
}

impl LockRecord {
    /// Record for the current process
    pub fn current(mode: &str) -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
            mode: mode.to_string(),
        }
    }

    /// Stale when the owning process no longer exists
    pub fn is_stale(&self) -> bool {
        !is_process_running(self.pid)
    }

    pub fn display_summary(&self) -> String {
        let age = Utc::now().signed_duration_since(self.started_at);
        let age_str = if age.num_hours() > 0 {
            format!("{}h {}m ago", age.num_hours(), age.num_minutes() % 60)
        } else if age.num_minutes() > 0 {
            format!("{}m {}s ago", age.num_minutes(), age.num_seconds() % 60)
        } else {
            format!("{}s ago", age.num_seconds())
        };
        format!("PID {} running mode '{}' started {}", self.pid, self.mode, age_str)
    }
}

impl std::fmt::Display for LockRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_summary())
    }
}

/// Lock acquisition failures
#[derive(Debug, Error)]
pub enum LockError {
    /// A live process already holds the lock
    #[error("sync already running ({record}); if this is wrong, delete {}", .path.display())]
    Held { record: LockRecord, path: PathBuf },

    #[error("lock I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // kill(pid, 0) probes existence without sending a signal; EPERM still
    // means the process exists.
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    // Can't check on this platform, assume running
    true
}

/// Acquires the sync lock
pub struct ProcessLock;

impl ProcessLock {
    /// Acquire the lock at `path` for a run in `mode`
    ///
    /// At most one stale record is cleared per call; a second collision means
    /// another process won the race and is reported as held.
    pub fn acquire(path: &Path, mode: &str) -> Result<LockGuard, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match try_create(path, mode)? {
            Some(guard) => return Ok(guard),
            None => {
                match read_record(path) {
                    Some(existing) if !existing.is_stale() => {
                        return Err(LockError::Held {
                            record: existing,
                            path: path.to_path_buf(),
                        });
                    }
                    Some(existing) => {
                        warn!(
                            pid = existing.pid,
                            mode = %existing.mode,
                            "Removing stale sync lock from terminated process"
                        );
                    }
                    None => {
                        warn!(path = %path.display(), "Removing unreadable sync lock");
                    }
                }
                remove_if_present(path)?;
            }
        }

        match try_create(path, mode)? {
            Some(guard) => Ok(guard),
            None => match read_record(path) {
                Some(record) => Err(LockError::Held {
                    record,
                    path: path.to_path_buf(),
                }),
                None => Err(LockError::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("lock file {} reappeared while acquiring", path.display()),
                ))),
            },
        }
    }

    /// Read the current holder without acquiring, if any
    pub fn holder(path: &Path) -> Option<LockRecord> {
        read_record(path)
    }
}

/// Create the lock file exclusively; `Ok(None)` when it already exists
fn try_create(path: &Path, mode: &str) -> Result<Option<LockGuard>, LockError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let record = LockRecord::current(mode);
            let json = serde_json::to_string_pretty(&record)
                .map_err(|e| LockError::Io(std::io::Error::other(e)))?;
            if let Err(e) = file.write_all(json.as_bytes()).and_then(|_| file.sync_all()) {
                let _ = fs::remove_file(path);
                return Err(LockError::Io(e));
            }
            info!(pid = record.pid, mode = %record.mode, "Acquired sync lock");
            Ok(Some(LockGuard {
                path: path.to_path_buf(),
                record,
            }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(LockError::Io(e)),
    }
}

fn read_record(path: &Path) -> Option<LockRecord> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Held lock; the record is deleted when this is dropped
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    record: LockRecord,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &LockRecord {
        &self.record
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Only remove the file if it is still ours
        match read_record(&self.path) {
            Some(current) if current.pid != self.record.pid => {
                warn!(
                    path = %self.path.display(),
                    holder = current.pid,
                    "Sync lock was replaced by another process, leaving it in place"
                );
            }
            _ => {
                if let Err(e) = remove_if_present(&self.path) {
                    warn!(path = %self.path.display(), error = %e, "Failed to remove sync lock");
                } else {
                    debug!(path = %self.path.display(), "Released sync lock");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_current_process_is_running() {
        assert!(is_process_running(std::process::id()));
        assert!(!LockRecord::current("auto").is_stale());
    }

    #[test]
    fn test_display_summary_mentions_pid_and_mode() {
        let record = LockRecord::current("incremental");
        let summary = record.display_summary();
        assert!(summary.contains(&record.pid.to_string()));
        assert!(summary.contains("incremental"));
    }

    #[test]
    fn test_guard_removes_file_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.lock");
        {
            let guard = ProcessLock::acquire(&path, "auto").unwrap();
            assert!(path.exists());
            assert_eq!(guard.record().mode, "auto");
        }
        assert!(!path.exists());
    }
}
