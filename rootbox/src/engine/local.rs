//! Degraded execution: the startup routine as a detached local process.
//!
//! Used when the container runtime cannot build or start an instance. There
//! is no isolation; the process only keeps the instance "alive" so status,
//! logs and stop behave consistently. The PID is recorded in `vps.pid`,
//! whose presence marks the instance as running in degraded mode.

use std::fs::OpenOptions;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::layout::InstanceLayout;
use crate::util::process::{
    is_process_alive, read_pid_file, terminate_process_group, write_pid_file,
};

/// Grace period before a freshly spawned routine counts as started.
const STARTUP_GRACE: Duration = Duration::from_millis(150);

/// Launch `bash start.sh` detached, with output appended to the instance log.
///
/// Returns the PID. Fails if the process cannot be spawned or exits during
/// the startup grace period.
pub async fn launch(layout: &InstanceLayout) -> RootboxResult<u32> {
    layout.prepare()?;

    let log_path = layout.log_path();
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| {
            RootboxError::Storage(format!("failed to open {}: {}", log_path.display(), e))
        })?;
    let log_err = log.try_clone()?;

    let mut cmd = Command::new("bash");
    cmd.arg(layout.startup_path())
        .current_dir(layout.root())
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group so stop can signal the heartbeat's children too.
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|e| {
        RootboxError::Internal(format!("failed to launch local startup routine: {}", e))
    })?;
    let pid = child.id();

    tokio::time::sleep(STARTUP_GRACE).await;
    if let Some(status) = child.try_wait()? {
        return Err(RootboxError::Internal(format!(
            "local startup routine exited immediately with {} (see {})",
            status,
            log_path.display()
        )));
    }

    write_pid_file(&layout.pid_path(), pid)?;

    // Reap the child when it exits so it never lingers as a zombie while this
    // manager is alive. Once the manager exits the routine is re-parented.
    std::thread::spawn(move || {
        let _ = child.wait();
    });

    tracing::info!(pid, dir = %layout.root().display(), "Started local startup routine");
    Ok(pid)
}

/// PID recorded for a degraded instance, if any.
pub fn recorded_pid(layout: &InstanceLayout) -> Option<u32> {
    let path = layout.pid_path();
    if !path.exists() {
        return None;
    }
    match read_pid_file(&path) {
        Ok(pid) => Some(pid),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable PID file");
            None
        }
    }
}

/// Terminate the recorded process and clear the PID file.
pub fn terminate(layout: &InstanceLayout, pid: u32) -> RootboxResult<()> {
    if is_process_alive(pid) && !terminate_process_group(pid) {
        return Err(RootboxError::Internal(format!(
            "failed to signal local process {pid}"
        )));
    }

    let path = layout.pid_path();
    if path.exists() {
        std::fs::remove_file(&path).map_err(|e| {
            RootboxError::Storage(format!("failed to remove {}: {}", path.display(), e))
        })?;
    }

    tracing::info!(pid, dir = %layout.root().display(), "Stopped local startup routine");
    Ok(())
}
