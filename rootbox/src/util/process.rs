//! Process utilities for degraded-mode instances.

use crate::errors::{RootboxError, RootboxResult};
use std::path::Path;

/// Read a PID file holding a decimal PID, optionally newline-terminated.
pub fn read_pid_file(path: &Path) -> RootboxResult<u32> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RootboxError::Storage(format!("Failed to read PID file {}: {}", path.display(), e))
    })?;

    content.trim().parse::<u32>().map_err(|e| {
        RootboxError::Storage(format!(
            "Invalid PID in file {}: '{}' - {}",
            path.display(),
            content.trim(),
            e
        ))
    })
}

pub fn write_pid_file(path: &Path, pid: u32) -> RootboxResult<()> {
    std::fs::write(path, format!("{pid}\n")).map_err(|e| {
        RootboxError::Storage(format!("Failed to write PID file {}: {}", path.display(), e))
    })
}

/// Send SIGTERM to the process group led by `pid`, then to `pid` itself.
///
/// # Returns
/// * `true` - Signal delivered, or the process is already gone
/// * `false` - Delivery failed (permission denied)
pub fn terminate_process_group(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    let group = unsafe { libc::kill(-raw, libc::SIGTERM) == 0 };
    let leader = unsafe { libc::kill(raw, libc::SIGTERM) == 0 };
    group || leader || !is_process_alive(pid)
}

/// Check if a process with the given PID exists and is not a zombie.
///
/// Uses `libc::kill(pid, 0)`, which sends a null signal to check existence.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    if unsafe { libc::kill(raw, 0) } != 0 {
        return false;
    }
    !is_zombie(pid)
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // Field 3 of /proc/<pid>/stat, after the parenthesised command name.
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state == "Z"),
        Err(_) => false,
    }
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}
