//! Shared fixtures: an in-memory container runtime and a recording SSH client.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rootbox::runtime::options::PortRanges;
use rootbox::{
    ContainerRuntime, ExecOutput, RootboxError, RootboxOptions, RootboxResult, RootboxRuntime,
    SshClient, SshTarget,
};
use tempfile::TempDir;

// ============================================================================
// FAKE CONTAINER RUNTIME
// ============================================================================

/// Container runtime that tracks "running" containers in memory.
#[derive(Default)]
pub struct FakeEngine {
    unavailable: AtomicBool,
    listings_time_out: AtomicBool,
    running: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn available() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unavailable() -> Arc<Self> {
        let engine = Self::default();
        engine.unavailable.store(true, Ordering::SeqCst);
        Arc::new(engine)
    }

    /// Make every liveness listing time out from now on.
    pub fn time_out_listings(&self) {
        self.listings_time_out.store(true, Ordering::SeqCst);
    }

    /// Pretend a container is already running.
    pub fn mark_running(&self, container: &str) {
        self.running.lock().unwrap().insert(container.to_string());
    }

    pub fn is_running(&self, container: &str) -> bool {
        self.running.lock().unwrap().contains(container)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> RootboxResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RootboxError::RuntimeUnavailable(
                "docker: command not found".into(),
            ));
        }
        Ok(())
    }

    fn container_for(dir: &Path) -> String {
        format!("vps-{}", dir.file_name().unwrap().to_string_lossy())
    }
}

#[async_trait]
impl ContainerRuntime for FakeEngine {
    async fn build_image(&self, _context: &Path, tag: &str) -> RootboxResult<()> {
        self.record(format!("build {tag}"))
    }

    async fn compose_up(&self, dir: &Path) -> RootboxResult<()> {
        let name = Self::container_for(dir);
        self.record(format!("up {name}"))?;
        self.running.lock().unwrap().insert(name);
        Ok(())
    }

    async fn compose_down(&self, dir: &Path) -> RootboxResult<()> {
        let name = Self::container_for(dir);
        self.record(format!("down {name}"))?;
        self.running.lock().unwrap().remove(&name);
        Ok(())
    }

    async fn compose_restart(&self, dir: &Path) -> RootboxResult<()> {
        self.record(format!("restart {}", Self::container_for(dir)))
    }

    async fn list_running(&self, name: &str) -> RootboxResult<Vec<String>> {
        self.record(format!("ps {name}"))?;
        if self.listings_time_out.load(Ordering::SeqCst) {
            return Err(RootboxError::ExecutionTimeout {
                operation: format!("docker ps --filter name={name}"),
                seconds: 10,
            });
        }
        Ok(self
            .running
            .lock()
            .unwrap()
            .iter()
            .filter(|n| *n == name)
            .cloned()
            .collect())
    }

    async fn exec(&self, container: &str, argv: &[String]) -> RootboxResult<ExecOutput> {
        self.record(format!("exec {container}"))?;
        Ok(ExecOutput {
            exit_code: 0,
            stdout: argv.join(" "),
            stderr: String::new(),
        })
    }

    async fn export(&self, container: &str, dest: &Path) -> RootboxResult<()> {
        self.record(format!("export {container}"))?;
        std::fs::write(dest, b"exported")?;
        Ok(())
    }
}

// ============================================================================
// FAKE SSH CLIENT
// ============================================================================

#[derive(Default)]
pub struct RecordingSsh {
    pub targets: Mutex<Vec<SshTarget>>,
}

#[async_trait]
impl SshClient for RecordingSsh {
    async fn connect(&self, target: &SshTarget) -> RootboxResult<i32> {
        self.targets.lock().unwrap().push(target.clone());
        Ok(0)
    }
}

// ============================================================================
// TEST CONTEXT
// ============================================================================

/// Isolated runtime over a temporary home directory.
pub struct TestContext {
    pub runtime: RootboxRuntime,
    pub engine: Arc<FakeEngine>,
    pub ssh: Arc<RecordingSsh>,
    pub temp_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_engine(FakeEngine::available()).await
    }

    pub async fn with_engine(engine: Arc<FakeEngine>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let ssh = Arc::new(RecordingSsh::default());
        let runtime = open(temp_dir.path(), engine.clone(), ssh.clone())
            .await
            .expect("Failed to create runtime");
        Self {
            runtime,
            engine,
            ssh,
            temp_dir,
        }
    }

    /// Drop the runtime and open a new one on the same home directory.
    pub async fn reopen(self, engine: Arc<FakeEngine>) -> Self {
        let Self { runtime, temp_dir, .. } = self;
        drop(runtime);

        let ssh = Arc::new(RecordingSsh::default());
        let runtime = open(temp_dir.path(), engine.clone(), ssh.clone())
            .await
            .expect("Failed to reopen runtime");
        Self {
            runtime,
            engine,
            ssh,
            temp_dir,
        }
    }
}

pub fn options(home: &Path) -> RootboxOptions {
    RootboxOptions {
        home_dir: home.to_path_buf(),
        ports: PortRanges::default(),
        heartbeat_secs: 1,
        ..Default::default()
    }
}

pub async fn open(
    home: &Path,
    engine: Arc<FakeEngine>,
    ssh: Arc<RecordingSsh>,
) -> RootboxResult<RootboxRuntime> {
    RootboxRuntime::with_components(options(home), engine, ssh).await
}
