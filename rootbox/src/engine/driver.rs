//! Execution driver: container runtime first, local process as fallback.

use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::engine::container::ContainerRuntime;
use crate::engine::local;
use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::layout::InstanceLayout;
use crate::runtime::types::{ExecOutput, InstanceId};

/// How an instance is currently executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Managed by the container runtime under `vps-<id>`.
    Container,
    /// Detached local process running the startup routine.
    Degraded { pid: u32 },
}

impl ExecutionMode {
    /// Mode implied by the instance directory: a PID file means degraded.
    pub fn detect(layout: &InstanceLayout) -> Self {
        match local::recorded_pid(layout) {
            Some(pid) => ExecutionMode::Degraded { pid },
            None => ExecutionMode::Container,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ExecutionMode::Degraded { .. })
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Container => write!(f, "container"),
            ExecutionMode::Degraded { pid } => write!(f, "degraded (pid {pid})"),
        }
    }
}

/// Result of an image build. Failure is never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// The build failed and the instance will run in degraded mode.
    pub degraded: bool,
    pub reason: Option<String>,
}

/// Result of a start or restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub mode: ExecutionMode,
    /// Why the container path was abandoned, when it was.
    pub fallback_reason: Option<String>,
}

impl StartOutcome {
    pub fn degraded(&self) -> bool {
        self.mode.is_degraded()
    }
}

/// Wraps a [`ContainerRuntime`] with the degraded-mode fallback.
///
/// Runtime unavailability is logged at warn level and recovered from.
/// Timeouts and local-process failures are returned to the caller.
#[derive(Clone)]
pub struct ExecutionDriver {
    engine: Arc<dyn ContainerRuntime>,
}

impl ExecutionDriver {
    pub fn new(engine: Arc<dyn ContainerRuntime>) -> Self {
        Self { engine }
    }

    /// Build the instance image. Any failure degrades instead of propagating.
    pub async fn build(&self, id: &InstanceId, layout: &InstanceLayout) -> BuildOutcome {
        match self
            .engine
            .build_image(layout.root(), &id.container_name())
            .await
        {
            Ok(()) => {
                tracing::info!(instance_id = %id, "Image built");
                BuildOutcome {
                    degraded: false,
                    reason: None,
                }
            }
            Err(e) => {
                tracing::warn!(instance_id = %id, error = %e, "Image build failed, using degraded mode");
                BuildOutcome {
                    degraded: true,
                    reason: Some(e.to_string()),
                }
            }
        }
    }

    /// Bring the instance up, falling back to a local process.
    ///
    /// `skip_container` goes straight to the fallback (used after a degraded
    /// build, where there is no image to run).
    pub async fn start(
        &self,
        id: &InstanceId,
        layout: &InstanceLayout,
        skip_container: bool,
    ) -> RootboxResult<StartOutcome> {
        let reason = if skip_container {
            "image build was degraded".to_string()
        } else {
            match self.engine.compose_up(layout.root()).await {
                Ok(()) => {
                    tracing::info!(instance_id = %id, "Composition up");
                    return Ok(StartOutcome {
                        mode: ExecutionMode::Container,
                        fallback_reason: None,
                    });
                }
                Err(e) if e.is_runtime_unavailable() => {
                    tracing::warn!(instance_id = %id, error = %e, "Compose up failed, starting local fallback");
                    e.to_string()
                }
                Err(e) => return Err(e),
            }
        };

        let pid = local::launch(layout).await?;
        Ok(StartOutcome {
            mode: ExecutionMode::Degraded { pid },
            fallback_reason: Some(reason),
        })
    }

    pub async fn stop(
        &self,
        id: &InstanceId,
        layout: &InstanceLayout,
        mode: ExecutionMode,
    ) -> RootboxResult<()> {
        match mode {
            ExecutionMode::Degraded { pid } => local::terminate(layout, pid),
            ExecutionMode::Container => {
                self.engine.compose_down(layout.root()).await?;
                tracing::info!(instance_id = %id, "Composition down");
                Ok(())
            }
        }
    }

    /// Restart in place. A degraded instance is stopped and started again,
    /// retrying the container path first.
    pub async fn restart(
        &self,
        id: &InstanceId,
        layout: &InstanceLayout,
        mode: ExecutionMode,
    ) -> RootboxResult<StartOutcome> {
        match mode {
            ExecutionMode::Container => match self.engine.compose_restart(layout.root()).await {
                Ok(()) => Ok(StartOutcome {
                    mode: ExecutionMode::Container,
                    fallback_reason: None,
                }),
                Err(e) if e.is_runtime_unavailable() => {
                    tracing::warn!(instance_id = %id, error = %e, "Compose restart failed, starting local fallback");
                    self.start(id, layout, true).await.map(|mut outcome| {
                        outcome.fallback_reason = Some(e.to_string());
                        outcome
                    })
                }
                Err(e) => Err(e),
            },
            ExecutionMode::Degraded { .. } => {
                self.stop(id, layout, mode).await?;
                self.start(id, layout, false).await
            }
        }
    }

    /// Whether the instance is up.
    ///
    /// A missing runtime cannot be running anything, so it reports false.
    /// Any other failure (a timeout, a daemon error) leaves liveness unknown
    /// and is returned.
    pub async fn is_running(&self, id: &InstanceId, mode: ExecutionMode) -> RootboxResult<bool> {
        match mode {
            ExecutionMode::Degraded { pid } => Ok(crate::util::is_process_alive(pid)),
            ExecutionMode::Container => {
                let name = id.container_name();
                match self.engine.list_running(&name).await {
                    Ok(names) => Ok(names.iter().any(|n| *n == name)),
                    Err(e) if e.is_runtime_unavailable() => {
                        tracing::debug!(instance_id = %id, error = %e, "No container runtime, treating as not running");
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    pub async fn exec_inside(
        &self,
        id: &InstanceId,
        mode: ExecutionMode,
        argv: &[String],
    ) -> RootboxResult<ExecOutput> {
        match mode {
            ExecutionMode::Degraded { .. } => Err(RootboxError::Unsupported(format!(
                "exec is not available for {id}: running in degraded mode without a container"
            ))),
            ExecutionMode::Container => self.engine.exec(&id.container_name(), argv).await,
        }
    }

    /// Snapshot the instance under `backups/`; the instance keeps running.
    ///
    /// Container mode exports the container filesystem. Degraded mode has no
    /// container, so the `data/` volume is archived instead.
    pub async fn backup(
        &self,
        id: &InstanceId,
        layout: &InstanceLayout,
        mode: ExecutionMode,
    ) -> RootboxResult<PathBuf> {
        std::fs::create_dir_all(layout.backups_dir())?;
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");

        let path = match mode {
            ExecutionMode::Container => {
                let dest = layout.backups_dir().join(format!("backup-{stamp}.tar"));
                self.engine.export(&id.container_name(), &dest).await?;
                dest
            }
            ExecutionMode::Degraded { .. } => {
                let dest = layout.backups_dir().join(format!("backup-{stamp}.tar.gz"));
                let data_dir = layout.data_dir();
                let archive = dest.clone();
                tokio::task::spawn_blocking(move || archive_dir(&data_dir, &archive))
                    .await
                    .map_err(|e| RootboxError::Internal(format!("backup task failed: {e}")))??;
                dest
            }
        };

        tracing::info!(instance_id = %id, path = %path.display(), "Backup written");
        Ok(path)
    }
}

/// Gzipped tar of `dir`, rooted at `data/`.
fn archive_dir(dir: &std::path::Path, dest: &std::path::Path) -> RootboxResult<()> {
    std::fs::create_dir_all(dir)?;
    let file = File::create(dest).map_err(|e| {
        RootboxError::Storage(format!("failed to create {}: {}", dest.display(), e))
    })?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.append_dir_all(crate::runtime::layout::dirs::DATA_DIR, dir)?;
    builder.into_inner()?.finish()?;
    Ok(())
}
