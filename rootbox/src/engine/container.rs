//! Container runtime boundary.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::runner::{CommandRunner, CommandSpec, ProcessRunner};
use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::options::{EngineOptions, ExecutionTimeouts};
use crate::runtime::types::ExecOutput;

/// The operations the manager needs from a container runtime.
///
/// Any failure to reach the runtime is `RuntimeUnavailable`; the execution
/// driver recovers from it by degrading to a local process.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build the image in `context` and tag it `tag`.
    async fn build_image(&self, context: &Path, tag: &str) -> RootboxResult<()>;

    /// Bring the composition in `dir` up, detached.
    async fn compose_up(&self, dir: &Path) -> RootboxResult<()>;

    async fn compose_down(&self, dir: &Path) -> RootboxResult<()>;

    async fn compose_restart(&self, dir: &Path) -> RootboxResult<()>;

    /// Names of running containers whose name equals `name`.
    async fn list_running(&self, name: &str) -> RootboxResult<Vec<String>>;

    /// Run `argv` inside `container`. A non-zero exit is not an error.
    async fn exec(&self, container: &str, argv: &[String]) -> RootboxResult<ExecOutput>;

    /// Export the filesystem of `container` as a tar archive at `dest`.
    async fn export(&self, container: &str, dest: &Path) -> RootboxResult<()>;
}

// ============================================================================
// DOCKER CLI
// ============================================================================

/// [`ContainerRuntime`] driving the docker and compose command-line tools.
pub struct DockerCli {
    runner: Arc<dyn CommandRunner>,
    docker: String,
    compose: Vec<String>,
    timeouts: ExecutionTimeouts,
}

impl DockerCli {
    pub fn new(options: &EngineOptions, timeouts: ExecutionTimeouts) -> Self {
        Self::with_runner(options, timeouts, Arc::new(ProcessRunner))
    }

    pub fn with_runner(
        options: &EngineOptions,
        timeouts: ExecutionTimeouts,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let mut compose: Vec<String> = options
            .compose_program
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if compose.is_empty() {
            compose.push("docker-compose".to_string());
        }

        Self {
            runner,
            docker: options.docker_program.clone(),
            compose,
            timeouts,
        }
    }

    fn docker(&self) -> CommandSpec {
        CommandSpec::new(&self.docker)
    }

    fn compose(&self, dir: &Path) -> CommandSpec {
        CommandSpec::new(&self.compose[0])
            .args(self.compose[1..].iter().cloned())
            .current_dir(dir)
    }

    async fn run_checked(
        &self,
        spec: CommandSpec,
        limit: std::time::Duration,
    ) -> RootboxResult<String> {
        let output = self.runner.run(&spec, limit).await?;
        Ok(output.ensure_success(&spec)?.stdout)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build_image(&self, context: &Path, tag: &str) -> RootboxResult<()> {
        let spec = self
            .docker()
            .args(["build", "-t", tag, "."])
            .current_dir(context);
        self.run_checked(spec, self.timeouts.build()).await?;
        Ok(())
    }

    async fn compose_up(&self, dir: &Path) -> RootboxResult<()> {
        let spec = self.compose(dir).args(["up", "-d"]);
        self.run_checked(spec, self.timeouts.control()).await?;
        Ok(())
    }

    async fn compose_down(&self, dir: &Path) -> RootboxResult<()> {
        let spec = self.compose(dir).arg("down");
        self.run_checked(spec, self.timeouts.control()).await?;
        Ok(())
    }

    async fn compose_restart(&self, dir: &Path) -> RootboxResult<()> {
        let spec = self.compose(dir).arg("restart");
        self.run_checked(spec, self.timeouts.control()).await?;
        Ok(())
    }

    async fn list_running(&self, name: &str) -> RootboxResult<Vec<String>> {
        let spec = self.docker().args([
            "ps".to_string(),
            "--filter".to_string(),
            format!("name=^{name}$"),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ]);
        let stdout = self.run_checked(spec, self.timeouts.probe()).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| *line == name)
            .map(str::to_string)
            .collect())
    }

    async fn exec(&self, container: &str, argv: &[String]) -> RootboxResult<ExecOutput> {
        if argv.is_empty() {
            return Err(RootboxError::Config("exec requires a command".into()));
        }
        let spec = self
            .docker()
            .args(["exec".to_string(), container.to_string()])
            .args(argv.iter().cloned());
        let output = self.runner.run(&spec, self.timeouts.control()).await?;
        Ok(ExecOutput {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn export(&self, container: &str, dest: &Path) -> RootboxResult<()> {
        let spec = self.docker().args([
            "export".to_string(),
            "-o".to_string(),
            dest.display().to_string(),
            container.to_string(),
        ]);
        self.run_checked(spec, self.timeouts.control()).await?;
        Ok(())
    }
}

// ============================================================================
// DISABLED RUNTIME
// ============================================================================

/// Runtime used when the engine is switched off: everything is unavailable.
#[derive(Debug, Default, Clone)]
pub struct DisabledRuntime;

impl DisabledRuntime {
    fn unavailable<T>(&self) -> RootboxResult<T> {
        Err(RootboxError::RuntimeUnavailable(
            "container runtime disabled by configuration".into(),
        ))
    }
}

#[async_trait]
impl ContainerRuntime for DisabledRuntime {
    async fn build_image(&self, _context: &Path, _tag: &str) -> RootboxResult<()> {
        self.unavailable()
    }

    async fn compose_up(&self, _dir: &Path) -> RootboxResult<()> {
        self.unavailable()
    }

    async fn compose_down(&self, _dir: &Path) -> RootboxResult<()> {
        self.unavailable()
    }

    async fn compose_restart(&self, _dir: &Path) -> RootboxResult<()> {
        self.unavailable()
    }

    async fn list_running(&self, _name: &str) -> RootboxResult<Vec<String>> {
        self.unavailable()
    }

    async fn exec(&self, _container: &str, _argv: &[String]) -> RootboxResult<ExecOutput> {
        self.unavailable()
    }

    async fn export(&self, _container: &str, _dest: &Path) -> RootboxResult<()> {
        self.unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runner::CommandOutput;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every command and answers with a canned output.
    struct RecordingRunner {
        calls: Mutex<Vec<CommandSpec>>,
        output: CommandOutput,
    }

    impl RecordingRunner {
        fn new(exit_code: i32, stdout: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                output: CommandOutput {
                    exit_code,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            })
        }

        fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, spec: &CommandSpec, _limit: Duration) -> RootboxResult<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            Ok(self.output.clone())
        }
    }

    fn cli(runner: Arc<RecordingRunner>, compose: &str) -> DockerCli {
        let options = EngineOptions {
            compose_program: compose.to_string(),
            ..Default::default()
        };
        DockerCli::with_runner(&options, ExecutionTimeouts::default(), runner)
    }

    #[tokio::test]
    async fn test_build_image_command() {
        let runner = RecordingRunner::new(0, "");
        let docker = cli(runner.clone(), "docker-compose");

        docker.build_image(Path::new("/tmp/db1"), "vps-db1").await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].display(), "docker build -t vps-db1 .");
        assert_eq!(calls[0].cwd.as_deref(), Some(Path::new("/tmp/db1")));
    }

    #[tokio::test]
    async fn test_compose_program_is_split() {
        let runner = RecordingRunner::new(0, "");
        let docker = cli(runner.clone(), "docker compose");

        docker.compose_up(Path::new("/tmp/db1")).await.unwrap();
        docker.compose_down(Path::new("/tmp/db1")).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].display(), "docker compose up -d");
        assert_eq!(calls[1].display(), "docker compose down");
    }

    #[tokio::test]
    async fn test_list_running_filters_exact_names() {
        let runner = RecordingRunner::new(0, "vps-db1\nvps-db10\n");
        let docker = cli(runner, "docker-compose");

        let names = docker.list_running("vps-db1").await.unwrap();
        assert_eq!(names, vec!["vps-db1"]);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_unavailable() {
        let runner = RecordingRunner::new(1, "");
        let docker = cli(runner, "docker-compose");

        let err = docker.compose_up(Path::new("/tmp")).await.unwrap_err();
        assert!(err.is_runtime_unavailable());
    }

    #[tokio::test]
    async fn test_exec_keeps_exit_code() {
        let runner = RecordingRunner::new(2, "partial");
        let docker = cli(runner.clone(), "docker-compose");

        let output = docker
            .exec("vps-db1", &["ls".to_string(), "/data".to_string()])
            .await
            .unwrap();
        assert_eq!(output.exit_code, 2);
        assert_eq!(output.stdout, "partial");
        assert_eq!(runner.calls()[0].display(), "docker exec vps-db1 ls /data");
    }

    #[tokio::test]
    async fn test_disabled_runtime() {
        let runtime = DisabledRuntime;
        assert!(runtime.compose_up(Path::new("/")).await.unwrap_err().is_runtime_unavailable());
        assert!(runtime.list_running("x").await.is_err());
    }
}
