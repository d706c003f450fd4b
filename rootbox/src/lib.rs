//! rootbox: lifecycle manager for long-lived, root-accessible instances.
//!
//! Each instance gets its own identity, host ports, credentials and storage
//! directory, and runs as a container when a container runtime is usable or
//! as a detached local process (degraded mode) when it is not.
//!
//! ```no_run
//! use rootbox::{CreateOptions, RootboxOptions, RootboxRuntime};
//!
//! # async fn example() -> rootbox::RootboxResult<()> {
//! let runtime = RootboxRuntime::open(RootboxOptions::default()).await?;
//! let info = runtime
//!     .create(CreateOptions {
//!         name: Some("db1".into()),
//!         os: Some("debian".into()),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("ssh root@127.0.0.1 -p {}", info.descriptor.endpoints.ssh_port);
//! # Ok(())
//! # }
//! ```

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub mod allocator;
pub mod engine;
pub mod errors;
pub mod instance;
pub mod registry;
pub mod runtime;
pub mod ssh;
pub mod store;
pub mod templates;
pub mod util;

pub use engine::{ContainerRuntime, ExecutionMode};
pub use errors::{RootboxError, RootboxResult};
pub use instance::InstanceStatus;
pub use runtime::RootboxRuntime;
pub use runtime::layout::FilesystemLayout;
pub use runtime::options::RootboxOptions;
pub use runtime::types::{
    CreateOptions, Credentials, Endpoints, ExecOutput, InstanceDescriptor, InstanceId,
    InstanceInfo, OsChoice, Resources,
};
pub use ssh::{SshClient, SshTarget};

/// Keeps the non-blocking writer flushing for the life of the process.
/// `None` when another subscriber was installed first.
static LOG_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Route `tracing` output to a daily log file under `<home>/logs/`.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Only the first call
/// in a process has any effect, and an already installed global subscriber
/// (for example the CLI's `--debug` stderr logger) takes precedence.
pub fn init_logging_for(layout: &FilesystemLayout) -> RootboxResult<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let logs_dir = layout.logs_dir();
    std::fs::create_dir_all(&logs_dir).map_err(|e| {
        RootboxError::Storage(format!(
            "failed to create logs dir {}: {}",
            logs_dir.display(),
            e
        ))
    })?;

    let _ = LOG_GUARD.get_or_init(|| {
        let appender = tracing_appender::rolling::daily(&logs_dir, "rootbox.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        util::register_to_tracing(non_blocking, env_filter).then_some(guard)
    });
    Ok(())
}
