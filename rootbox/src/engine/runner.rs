//! External command execution with a bounded timeout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{RootboxError, RootboxResult};

/// One external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// `program arg1 arg2`, for log lines and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into `RuntimeUnavailable`.
    pub fn ensure_success(self, spec: &CommandSpec) -> RootboxResult<Self> {
        if self.success() {
            return Ok(self);
        }
        let detail = self.stderr.trim();
        Err(RootboxError::RuntimeUnavailable(format!(
            "`{}` exited with status {}{}",
            spec.display(),
            self.exit_code,
            if detail.is_empty() {
                String::new()
            } else {
                format!(": {detail}")
            }
        )))
    }
}

/// Runs external commands. Implementations must honour `limit`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, limit: Duration) -> RootboxResult<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`.
///
/// A missing program is `RuntimeUnavailable`. When `limit` expires the child
/// is killed and `ExecutionTimeout` is returned.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec, limit: Duration) -> RootboxResult<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        tracing::debug!(command = %spec.display(), timeout_secs = limit.as_secs(), "Running command");

        let child = cmd.spawn().map_err(|e| {
            RootboxError::RuntimeUnavailable(format!("failed to spawn `{}`: {}", spec.program, e))
        })?;

        // Dropping the wait future on timeout kills the child (kill_on_drop).
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                RootboxError::RuntimeUnavailable(format!("`{}` failed: {}", spec.display(), e))
            })?,
            Err(_) => {
                tracing::warn!(command = %spec.display(), "Command timed out, killed");
                return Err(RootboxError::ExecutionTimeout {
                    operation: spec.display(),
                    seconds: limit.as_secs(),
                });
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
