//! Process lock: exclusivity, stale recovery and release on drop

use chrono::Utc;
use mpmon_common::{LockError, LockRecord, ProcessLock};
use std::fs;
use tempfile::TempDir;

/// A pid far above any default pid_max, so never alive
const DEAD_PID: u32 = 999_999_999;

fn write_record(path: &std::path::Path, pid: u32, mode: &str) {
    let record = LockRecord {
        pid,
        started_at: Utc::now(),
        mode: mode.to_string(),
    };
    fs::write(path, serde_json::to_string(&record).unwrap()).unwrap();
}

#[test]
fn test_acquire_writes_record_with_current_pid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync.lock");

    let guard = ProcessLock::acquire(&path, "incremental").unwrap();

    let on_disk = ProcessLock::holder(&path).unwrap();
    assert_eq!(on_disk.pid, std::process::id());
    assert_eq!(on_disk.mode, "incremental");
    assert_eq!(guard.path(), path.as_path());
}

#[test]
fn test_live_holder_blocks_second_acquire() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync.lock");
    let _guard = ProcessLock::acquire(&path, "auto").unwrap();

    match ProcessLock::acquire(&path, "full") {
        Err(LockError::Held { record, path: held_path }) => {
            assert_eq!(record.mode, "auto");
            assert_eq!(held_path, path);
        }
        other => panic!("expected Held, got {:?}", other.map(|_| ())),
    }
    // The live record is untouched
    assert_eq!(ProcessLock::holder(&path).unwrap().mode, "auto");
}

#[test]
fn test_held_error_message_names_the_lock_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync.lock");
    let _guard = ProcessLock::acquire(&path, "auto").unwrap();

    let err = ProcessLock::acquire(&path, "auto").unwrap_err();

    assert!(err.to_string().contains("sync.lock"));
}

#[test]
fn test_dead_pid_record_is_replaced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync.lock");
    write_record(&path, DEAD_PID, "full");

    let guard = ProcessLock::acquire(&path, "auto").unwrap();

    assert_eq!(guard.record().pid, std::process::id());
    assert_eq!(ProcessLock::holder(&path).unwrap().mode, "auto");
}

#[test]
fn test_unreadable_record_is_replaced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync.lock");
    fs::write(&path, "not json").unwrap();

    let guard = ProcessLock::acquire(&path, "auto");

    assert!(guard.is_ok());
}

#[test]
fn test_release_on_drop_allows_reacquire() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync.lock");

    drop(ProcessLock::acquire(&path, "auto").unwrap());
    assert!(!path.exists());

    let again = ProcessLock::acquire(&path, "auto");
    assert!(again.is_ok());
}

#[test]
fn test_release_on_panic_unwind() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync.lock");
    let inner = path.clone();

    let result = std::panic::catch_unwind(move || {
        let _guard = ProcessLock::acquire(&inner, "auto").unwrap();
        panic!("phase failed");
    });

    assert!(result.is_err());
    assert!(!path.exists());
}
