//! Locking for the runtime home directory and for individual instances.
//!
//! `RuntimeLock` uses flock so only one manager process controls a given
//! ROOTBOX_HOME at a time. `InstanceLocks` serialises operations on the same
//! instance identifier inside one manager.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::constants::filenames;

/// Exclusive ownership of a home directory by one manager process.
///
/// The owner's PID is written into the lock file so a refused manager can
/// say who holds it. The flock is dropped with the guard, or by the kernel
/// when the process dies.
#[derive(Debug)]
pub struct RuntimeLock {
    file: File,
    path: PathBuf,
}

impl RuntimeLock {
    /// Take the lock on `<home>/.lock` without blocking.
    ///
    /// # Errors
    ///
    /// `Internal` when another manager holds it, `Storage` on I/O failure.
    pub fn acquire(home_dir: &Path) -> RootboxResult<Self> {
        std::fs::create_dir_all(home_dir)
            .map_err(|e| RootboxError::Storage(format!("failed to create home dir: {}", e)))?;

        let lock_path = home_dir.join(filenames::LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| RootboxError::Storage(format!("failed to open lock file: {}", e)))?;

        if let Err(err) = try_flock(&file) {
            if err.kind() != std::io::ErrorKind::WouldBlock {
                return Err(RootboxError::Storage(format!(
                    "failed to acquire lock: {}",
                    err
                )));
            }
            let holder = read_holder(&mut file)
                .map(|pid| format!(" (pid {pid})"))
                .unwrap_or_default();
            return Err(RootboxError::Internal(format!(
                "Another rootbox manager{} is already using directory: {}",
                holder,
                home_dir.display()
            )));
        }

        write_holder(&mut file, std::process::id())?;
        tracing::debug!(lock_path = %lock_path.display(), "Acquired runtime lock");

        Ok(RuntimeLock {
            file,
            path: lock_path,
        })
    }

}

impl Drop for RuntimeLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            tracing::debug!(error = %e, "Failed to clear runtime lock owner");
        }
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        tracing::debug!(lock_path = %self.path.display(), "Released runtime lock");
    }
}

#[cfg(unix)]
fn try_flock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn try_flock(_file: &File) -> std::io::Result<()> {
    Ok(())
}

fn read_holder(file: &mut File) -> Option<u32> {
    let mut raw = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut raw).ok()?;
    raw.trim().parse().ok()
}

fn write_holder(file: &mut File, pid: u32) -> RootboxResult<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{pid}")?;
    file.flush()?;
    Ok(())
}

/// Per-instance async mutexes, created on first use.
///
/// Held across the awaits of build/start/stop so two operations on the same
/// instance never interleave. Distinct instances never contend.
#[derive(Debug, Default)]
pub struct InstanceLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the mutex for `instance_id`.
    pub fn get(&self, instance_id: &str) -> RootboxResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| RootboxError::Internal(format!("instance lock table poisoned: {}", e)))?;
        Ok(locks
            .entry(instance_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    /// Forget the mutex of a removed instance.
    pub fn release(&self, instance_id: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(instance_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_records_owner_pid() {
        let temp_dir = TempDir::new().unwrap();
        let _lock = RuntimeLock::acquire(temp_dir.path()).unwrap();

        let recorded = std::fs::read_to_string(temp_dir.path().join(".lock")).unwrap();
        assert_eq!(recorded.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_second_manager_is_told_the_owner() {
        let temp_dir = TempDir::new().unwrap();
        let _held = RuntimeLock::acquire(temp_dir.path()).unwrap();

        let err = RuntimeLock::acquire(temp_dir.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Another rootbox manager"));
        assert!(message.contains(&format!("pid {}", std::process::id())));
    }

    #[test]
    fn test_lock_is_reusable_after_drop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".lock");
        {
            let _lock = RuntimeLock::acquire(temp_dir.path()).unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        let _again = RuntimeLock::acquire(temp_dir.path()).unwrap();
    }

    #[test]
    fn test_instance_locks_are_shared_per_id() {
        let locks = InstanceLocks::new();
        let a1 = locks.get("a").unwrap();
        let a2 = locks.get("a").unwrap();
        let b = locks.get("b").unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }

    #[tokio::test]
    async fn test_instance_lock_serialises_same_id() {
        let locks = InstanceLocks::new();
        let lock = locks.get("db1").unwrap();
        let _held = lock.lock().await;

        let again = locks.get("db1").unwrap();
        assert!(again.try_lock().is_err());

        let other = locks.get("db2").unwrap();
        assert!(other.try_lock().is_ok());
    }
}
