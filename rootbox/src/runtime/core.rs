//! Orchestration surface: create, list and control instances.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::allocator::{allocate_identity, allocate_port, generate_key_material, generate_password};
use crate::engine::{ContainerRuntime, DisabledRuntime, DockerCli, ExecutionDriver, ExecutionMode};
use crate::errors::{RootboxError, RootboxResult};
use crate::init_logging_for;
use crate::registry::{InstanceRegistry, RegistryEntry};
use crate::runtime::constants::instance_defaults;
use crate::runtime::layout::{FilesystemLayout, InstanceLayout};
use crate::runtime::lock::{InstanceLocks, RuntimeLock};
use crate::runtime::options::RootboxOptions;
use crate::runtime::types::{
    CreateOptions, Credentials, Endpoints, ExecOutput, InstanceDescriptor, InstanceId,
    InstanceInfo, InstanceStatus, OsChoice, Resources,
};
use crate::ssh::{OpenSshClient, SshClient, SshTarget};
use crate::store::DescriptorStore;
use crate::templates::{self, RenderContext};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Entry point for managing instances under one home directory.
///
/// **Lock Behavior**: Only one `RootboxRuntime` can use a given home
/// directory at a time. The filesystem lock is released when the last clone
/// is dropped.
///
/// **Cloning**: Cheap via `Arc`; all clones share the same registry.
///
/// **Concurrency**: identifier and port allocation is serialised globally.
/// Build, start, stop, restart, backup and remove are serialised per
/// instance. Operations on distinct instances run in parallel.
#[derive(Clone)]
pub struct RootboxRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    options: RootboxOptions,
    layout: FilesystemLayout,
    store: DescriptorStore,
    registry: InstanceRegistry,
    driver: ExecutionDriver,
    ssh: Arc<dyn SshClient>,
    allocation: Mutex<()>,
    instance_locks: InstanceLocks,
    _runtime_lock: RuntimeLock,
}

impl RootboxRuntime {
    /// Open the runtime with the docker CLI (or the disabled engine when
    /// `options.engine.enabled` is false) and the system ssh client.
    pub async fn open(options: RootboxOptions) -> RootboxResult<Self> {
        let engine: Arc<dyn ContainerRuntime> = if options.engine.enabled {
            Arc::new(DockerCli::new(&options.engine, options.timeouts.clone()))
        } else {
            tracing::info!("Container runtime disabled, instances will run in degraded mode");
            Arc::new(DisabledRuntime)
        };
        Self::with_components(options, engine, Arc::new(OpenSshClient::default())).await
    }

    /// Open the runtime with explicit collaborators.
    ///
    /// **Prepare Before Execute**: validates options, prepares the home
    /// directory, takes the runtime lock and reconciles every persisted
    /// descriptor against a fresh liveness probe before returning.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Options are invalid
    /// - Another manager already uses the same home directory
    /// - The home directory cannot be initialised
    pub async fn with_components(
        options: RootboxOptions,
        engine: Arc<dyn ContainerRuntime>,
        ssh: Arc<dyn SshClient>,
    ) -> RootboxResult<Self> {
        options.validate()?;

        let layout = FilesystemLayout::new(options.home_dir.clone());
        layout.prepare().map_err(|e| {
            RootboxError::Storage(format!(
                "Failed to initialize filesystem at {}: {}",
                layout.home_dir().display(),
                e
            ))
        })?;

        init_logging_for(&layout)?;

        let runtime_lock = RuntimeLock::acquire(layout.home_dir())?;

        let runtime = Self {
            inner: Arc::new(RuntimeInner {
                store: DescriptorStore::new(layout.clone()),
                options,
                layout,
                registry: InstanceRegistry::new(),
                driver: ExecutionDriver::new(engine),
                ssh,
                allocation: Mutex::new(()),
                instance_locks: InstanceLocks::new(),
                _runtime_lock: runtime_lock,
            }),
        };

        runtime.recover().await?;
        tracing::debug!(home = %runtime.inner.layout.home_dir().display(), "Initialized runtime");
        Ok(runtime)
    }

    pub fn options(&self) -> &RootboxOptions {
        &self.inner.options
    }

    pub fn layout(&self) -> &FilesystemLayout {
        &self.inner.layout
    }

    /// Allocate, provision, build and start a new instance.
    ///
    /// The descriptor is persisted as CREATING before the build and updated
    /// to RUNNING after a successful start. If even the degraded path cannot
    /// start, the instance is persisted as ERROR and the error returned.
    ///
    /// # Errors
    ///
    /// - `Allocation`: the id is taken or no port could be found
    /// - `Provisioning`: the request produced a malformed descriptor
    pub async fn create(&self, options: CreateOptions) -> RootboxResult<InstanceInfo> {
        let (mut descriptor, layout, _guard) = self.allocate(options).await?;
        let id = descriptor.id.clone();

        descriptor.transition_to(InstanceStatus::Building)?;
        tracing::info!(instance_id = %id, os = %descriptor.os_choice, "Building instance");
        let build = self.inner.driver.build(&id, &layout).await;

        match self.inner.driver.start(&id, &layout, build.degraded).await {
            Ok(outcome) => {
                descriptor.transition_to(InstanceStatus::Running)?;
                if let Some(reason) = &outcome.fallback_reason {
                    tracing::warn!(instance_id = %id, reason = %reason, "Instance running in degraded mode");
                }
                let entry = self.commit(descriptor, &layout, outcome.mode)?;
                tracing::info!(
                    instance_id = %id,
                    ssh_port = entry.descriptor.endpoints.ssh_port,
                    web_port = entry.descriptor.endpoints.web_port,
                    mode = %entry.mode,
                    "Instance created"
                );
                Ok(info_of(entry, true))
            }
            Err(e) => {
                tracing::error!(instance_id = %id, error = %e, "Instance failed to start");
                descriptor.transition_to(InstanceStatus::Error)?;
                self.commit(descriptor, &layout, ExecutionMode::Container)?;
                Err(e)
            }
        }
    }

    /// Every instance, oldest first, with status re-verified by a probe.
    pub async fn list(&self) -> RootboxResult<Vec<InstanceInfo>> {
        let mut infos = Vec::new();
        for entry in self.inner.registry.list()? {
            infos.push(self.probe(entry).await?);
        }
        Ok(infos)
    }

    /// Current status of one instance, re-verified by a probe.
    pub async fn status(&self, id: &str) -> RootboxResult<InstanceInfo> {
        let entry = self.inner.registry.require(id)?;
        self.probe(entry).await
    }

    /// Start a stopped or failed instance. A live instance is left alone.
    pub async fn start(&self, id: &str) -> RootboxResult<InstanceInfo> {
        let (entry, _guard) = self.lock_entry(id).await?;
        let (mut entry, live) = self.reconcile(entry).await?;
        if live {
            tracing::debug!(instance_id = %id, "Instance already running");
            return Ok(info_of(entry, true));
        }

        let layout = InstanceLayout::new(entry.storage_dir.clone());
        let outcome = self
            .inner
            .driver
            .start(&entry.descriptor.id, &layout, false)
            .await?;
        entry.descriptor.transition_to(InstanceStatus::Running)?;
        if let Some(reason) = &outcome.fallback_reason {
            tracing::warn!(instance_id = %id, reason = %reason, "Instance running in degraded mode");
        }

        let entry = self.commit(entry.descriptor, &layout, outcome.mode)?;
        tracing::info!(instance_id = %id, mode = %entry.mode, "Instance started");
        Ok(info_of(entry, true))
    }

    /// Stop an instance. Stopping a stopped instance is a no-op.
    pub async fn stop(&self, id: &str) -> RootboxResult<InstanceStatus> {
        let (entry, _guard) = self.lock_entry(id).await?;
        let (mut entry, live) = self.reconcile(entry).await?;
        let layout = InstanceLayout::new(entry.storage_dir.clone());

        if live {
            self.inner
                .driver
                .stop(&entry.descriptor.id, &layout, entry.mode)
                .await?;
            tracing::info!(instance_id = %id, "Instance stopped");
        } else if entry.descriptor.status().is_stopped() {
            tracing::debug!(instance_id = %id, "Instance already stopped");
            return Ok(InstanceStatus::Stopped);
        }

        entry.descriptor.transition_to(InstanceStatus::Stopped)?;
        let entry = self.commit(entry.descriptor, &layout, ExecutionMode::Container)?;
        Ok(entry.descriptor.status())
    }

    /// Restart a running instance in place, or start it if it is not live.
    pub async fn restart(&self, id: &str) -> RootboxResult<InstanceInfo> {
        let (entry, guard) = self.lock_entry(id).await?;
        let (mut entry, live) = self.reconcile(entry).await?;
        if !live {
            drop(guard);
            return self.start(id).await;
        }

        let layout = InstanceLayout::new(entry.storage_dir.clone());
        let outcome = self
            .inner
            .driver
            .restart(&entry.descriptor.id, &layout, entry.mode)
            .await?;
        entry.descriptor.transition_to(InstanceStatus::Running)?;

        let entry = self.commit(entry.descriptor, &layout, outcome.mode)?;
        tracing::info!(instance_id = %id, mode = %entry.mode, "Instance restarted");
        Ok(info_of(entry, true))
    }

    /// Resolve where to SSH into a running instance.
    ///
    /// The target carries everything the session needs, so the caller can
    /// drop the runtime (and its home directory lock) before connecting.
    pub async fn ssh_target(&self, id: &str) -> RootboxResult<SshTarget> {
        let entry = self.require_live(id).await?;
        if entry.mode.is_degraded() {
            tracing::warn!(instance_id = %id, "Instance runs in degraded mode, no SSH daemon is expected");
        }

        let descriptor = &entry.descriptor;
        Ok(SshTarget {
            host: instance_defaults::HOST.to_string(),
            port: descriptor.endpoints.ssh_port,
            username: descriptor.credentials.username.clone(),
            password: descriptor.credentials.password.clone(),
            key_path: None,
        })
    }

    /// Open an interactive SSH session; returns the client's exit code.
    pub async fn connect(&self, id: &str) -> RootboxResult<i32> {
        let target = self.ssh_target(id).await?;
        self.inner.ssh.connect(&target).await
    }

    /// Run `argv` inside a running instance.
    ///
    /// # Errors
    ///
    /// `Unsupported` in degraded mode, `InvalidState` if not running.
    pub async fn exec(&self, id: &str, argv: &[String]) -> RootboxResult<ExecOutput> {
        if argv.is_empty() {
            return Err(RootboxError::Config("exec requires a command".into()));
        }
        let entry = self.require_live(id).await?;
        self.inner
            .driver
            .exec_inside(&entry.descriptor.id, entry.mode, argv)
            .await
    }

    /// Upgrade the packages of a running instance.
    pub async fn update(&self, id: &str) -> RootboxResult<ExecOutput> {
        let entry = self.inner.registry.require(id)?;
        let upgrade = templates::lookup(entry.descriptor.os_choice).upgrade_command();
        let argv = vec!["sh".to_string(), "-c".to_string(), upgrade.to_string()];
        tracing::info!(instance_id = %id, "Updating instance packages");
        self.exec(id, &argv).await
    }

    /// Write a timestamped archive under the instance's `backups/`.
    pub async fn backup(&self, id: &str) -> RootboxResult<std::path::PathBuf> {
        let (entry, _guard) = self.lock_entry(id).await?;
        let layout = InstanceLayout::new(entry.storage_dir.clone());
        self.inner
            .driver
            .backup(&entry.descriptor.id, &layout, entry.mode)
            .await
    }

    /// Last `lines` lines of the instance's persisted output.
    pub async fn logs(&self, id: &str, lines: usize) -> RootboxResult<Vec<String>> {
        let entry = self.inner.registry.require(id)?;
        let path = InstanceLayout::new(entry.storage_dir).log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            RootboxError::Storage(format!("failed to read {}: {}", path.display(), e))
        })?;
        let all: Vec<&str> = content.lines().collect();
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].iter().map(|line| line.to_string()).collect())
    }

    /// The persisted descriptor, exactly as stored.
    pub async fn info(&self, id: &str) -> RootboxResult<InstanceDescriptor> {
        let entry = self.inner.registry.require(id)?;
        self.inner
            .store
            .load(&entry.descriptor.id)?
            .ok_or_else(|| RootboxError::NotFound(id.to_string()))
    }

    /// Delete an instance: registry entry, descriptor and directory.
    ///
    /// A live instance is refused unless `force`, in which case it is
    /// stopped first.
    pub async fn remove(&self, id: &str, force: bool) -> RootboxResult<()> {
        let (entry, _guard) = self.lock_entry(id).await?;
        let (entry, live) = self.reconcile(entry).await?;
        let layout = InstanceLayout::new(entry.storage_dir.clone());

        if live {
            if !force {
                return Err(RootboxError::InvalidState(format!(
                    "instance {id} is running; stop it first or use force"
                )));
            }
            self.inner
                .driver
                .stop(&entry.descriptor.id, &layout, entry.mode)
                .await?;
        }

        self.inner.store.delete(&entry.descriptor.id)?;
        self.inner.registry.remove(id)?;
        self.inner.instance_locks.release(id);
        tracing::info!(instance_id = %id, "Instance removed");
        Ok(())
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

impl RootboxRuntime {
    /// Rebuild the registry from the store and correct stale statuses.
    async fn recover(&self) -> RootboxResult<()> {
        let descriptors = self.inner.store.load_all()?;
        let count = descriptors.len();

        for descriptor in descriptors {
            let layout = self.inner.store.instance_layout(&descriptor.id);
            let entry = RegistryEntry {
                mode: ExecutionMode::detect(&layout),
                storage_dir: layout.root().to_path_buf(),
                descriptor,
            };
            self.inner.registry.register(entry.clone())?;
            self.refresh(entry).await?;
        }

        tracing::info!(instances = count, "Recovered instances from store");
        Ok(())
    }

    /// Allocation critical section: id, ports, credentials, artifacts.
    ///
    /// Returns with the new instance registered as CREATING and its lock held.
    async fn allocate(
        &self,
        options: CreateOptions,
    ) -> RootboxResult<(InstanceDescriptor, InstanceLayout, OwnedMutexGuard<()>)> {
        let _allocation = self.inner.allocation.lock().await;

        let id = allocate_identity(options.name.as_deref())?;
        if self.inner.registry.contains(id.as_str())? || self.inner.store.exists(&id) {
            return Err(RootboxError::Allocation(format!(
                "instance {id} already exists"
            )));
        }

        let ranges = &self.inner.options.ports;
        let mut excluded = self.inner.registry.allocated_ports()?;
        let ssh_port = allocate_port(ranges.ssh_base, &excluded, ranges)?;
        excluded.insert(ssh_port);
        let web_port = allocate_port(ranges.web_base, &excluded, ranges)?;

        let descriptor = build_descriptor(id, options, Endpoints { ssh_port, web_port });
        let layout = self.inner.store.instance_layout(&descriptor.id);

        let entry = templates::lookup(descriptor.os_choice);
        let ctx = RenderContext {
            instance_dir: layout.root().to_path_buf(),
            heartbeat_secs: self.inner.options.heartbeat_secs,
            docker_program: self.inner.options.engine.docker_program.clone(),
            compose_program: self.inner.options.engine.compose_program.clone(),
        };
        let artifacts = templates::render(&descriptor, &entry, &ctx)?;

        let persisted = self
            .inner
            .store
            .save(&descriptor)
            .and_then(|()| self.inner.store.write_artifacts(&descriptor.id, &artifacts));
        if let Err(e) = persisted {
            if let Err(cleanup) = self.inner.store.delete(&descriptor.id) {
                tracing::warn!(instance_id = %descriptor.id, error = %cleanup, "Failed to clean up partial instance");
            }
            return Err(e);
        }

        let guard = self
            .inner
            .instance_locks
            .get(descriptor.id.as_str())?
            .lock_owned()
            .await;
        self.inner.registry.register(RegistryEntry {
            descriptor: descriptor.clone(),
            storage_dir: layout.root().to_path_buf(),
            mode: ExecutionMode::Container,
        })?;

        tracing::debug!(instance_id = %descriptor.id, ssh_port, web_port, "Allocated instance");
        Ok((descriptor, layout, guard))
    }

    /// Reconcile under the instance lock and fail unless the instance is live.
    ///
    /// The lock is released on return; the entry is a snapshot.
    async fn require_live(&self, id: &str) -> RootboxResult<RegistryEntry> {
        let (entry, _guard) = self.lock_entry(id).await?;
        let (entry, live) = self.reconcile(entry).await?;
        if !live {
            return Err(RootboxError::InvalidState(format!(
                "instance {id} is not running"
            )));
        }
        Ok(entry)
    }

    /// Take the per-instance lock and re-read the entry under it.
    async fn lock_entry(&self, id: &str) -> RootboxResult<(RegistryEntry, OwnedMutexGuard<()>)> {
        self.inner.registry.require(id)?;
        let guard = self.inner.instance_locks.get(id)?.lock_owned().await;
        let entry = self.inner.registry.require(id)?;
        Ok((entry, guard))
    }

    /// Probe without waiting on a busy instance.
    ///
    /// An instance locked by an in-flight operation is reported as-is.
    async fn probe(&self, entry: RegistryEntry) -> RootboxResult<InstanceInfo> {
        let lock = self.inner.instance_locks.get(entry.descriptor.id.as_str())?;
        let Ok(_guard) = lock.try_lock() else {
            let live = entry.descriptor.status().is_running();
            return Ok(info_of(entry, live));
        };

        let entry = self
            .inner
            .registry
            .get(entry.descriptor.id.as_str())?
            .ok_or_else(|| RootboxError::NotFound(entry.descriptor.id.to_string()))?;
        let (entry, live) = self.refresh(entry).await?;
        Ok(info_of(entry, live))
    }

    /// Like [`reconcile`](Self::reconcile), but a failed probe keeps the
    /// stored status when liveness cannot be determined. Used for reporting only.
    async fn refresh(&self, entry: RegistryEntry) -> RootboxResult<(RegistryEntry, bool)> {
        match self
            .inner
            .driver
            .is_running(&entry.descriptor.id, entry.mode)
            .await
        {
            Ok(live) => self.apply_liveness(entry, live),
            Err(e) => {
                tracing::warn!(
                    instance_id = %entry.descriptor.id,
                    error = %e,
                    "Liveness check failed, keeping last known status"
                );
                let live = entry.descriptor.status().is_running();
                Ok((entry, live))
            }
        }
    }

    /// Probe liveness and persist any status correction. Caller holds the
    /// instance lock (or the instance is not yet shared).
    ///
    /// An undetermined liveness is returned as an error: control operations
    /// must not act on an instance whose state is unknown.
    async fn reconcile(&self, entry: RegistryEntry) -> RootboxResult<(RegistryEntry, bool)> {
        let live = self
            .inner
            .driver
            .is_running(&entry.descriptor.id, entry.mode)
            .await?;
        self.apply_liveness(entry, live)
    }

    fn apply_liveness(
        &self,
        mut entry: RegistryEntry,
        live: bool,
    ) -> RootboxResult<(RegistryEntry, bool)> {
        let id = entry.descriptor.id.clone();

        let mut mode_changed = false;
        if !live && entry.mode.is_degraded() {
            let layout = InstanceLayout::new(entry.storage_dir.clone());
            if let Err(e) = std::fs::remove_file(layout.pid_path())
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(instance_id = %id, error = %e, "Failed to remove stale PID file");
            }
            entry.mode = ExecutionMode::Container;
            mode_changed = true;
        }

        let previous = entry.descriptor.status();
        let status_changed = entry.descriptor.reconcile(live);
        if status_changed {
            tracing::info!(
                instance_id = %id,
                persisted = %previous,
                observed = %entry.descriptor.status(),
                "Correcting persisted status"
            );
            self.inner.store.save(&entry.descriptor)?;
        }
        if status_changed || mode_changed {
            self.inner.registry.update(entry.clone())?;
        }

        Ok((entry, live))
    }

    /// Persist the descriptor and publish the new entry.
    fn commit(
        &self,
        descriptor: InstanceDescriptor,
        layout: &InstanceLayout,
        mode: ExecutionMode,
    ) -> RootboxResult<RegistryEntry> {
        self.inner.store.save(&descriptor)?;
        let entry = RegistryEntry {
            descriptor,
            storage_dir: layout.root().to_path_buf(),
            mode,
        };
        self.inner.registry.update(entry.clone())?;
        Ok(entry)
    }
}

fn build_descriptor(
    id: InstanceId,
    options: CreateOptions,
    endpoints: Endpoints,
) -> InstanceDescriptor {
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let display_name = non_empty(options.name)
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| id.to_string());
    let os_choice = options
        .os
        .as_deref()
        .map(OsChoice::parse_lenient)
        .unwrap_or_default();
    let username = non_empty(options.username)
        .unwrap_or_else(|| templates::lookup(os_choice).default_user.to_string());
    let password = non_empty(options.password)
        .unwrap_or_else(|| generate_password(instance_defaults::PASSWORD_LENGTH));
    let defaults = Resources::default();
    let resources = Resources {
        ram_limit: non_empty(options.ram).unwrap_or(defaults.ram_limit),
        cpu_limit: non_empty(options.cpu).unwrap_or(defaults.cpu_limit),
        disk_limit: non_empty(options.disk).unwrap_or(defaults.disk_limit),
    };
    let key_material = generate_key_material(&id);

    InstanceDescriptor::new(
        id,
        display_name,
        os_choice,
        Credentials {
            username,
            password,
            key_material,
        },
        resources,
        endpoints,
    )
}

fn info_of(entry: RegistryEntry, live: bool) -> InstanceInfo {
    InstanceInfo {
        descriptor: entry.descriptor,
        live,
        mode: entry.mode,
        storage_dir: entry.storage_dir,
    }
}

impl std::fmt::Debug for RootboxRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootboxRuntime")
            .field("home_dir", &self.inner.layout.home_dir())
            .finish()
    }
}

// Compile-time assertion: the runtime is shared across tasks.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<RootboxRuntime>;
};
