//! SSH boundary used by `connect`.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;

use crate::errors::{RootboxError, RootboxResult};

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Shown to the user; OpenSSH reads passwords from the terminal itself.
    pub password: String,
    pub key_path: Option<PathBuf>,
}

impl std::fmt::Debug for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("key_path", &self.key_path)
            .finish()
    }
}

#[async_trait]
pub trait SshClient: Send + Sync {
    /// Open an interactive session and return the client's exit code.
    async fn connect(&self, target: &SshTarget) -> RootboxResult<i32>;
}

/// [`SshClient`] that runs the system `ssh` with inherited stdio.
#[derive(Debug, Clone)]
pub struct OpenSshClient {
    program: String,
}

impl OpenSshClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn args(target: &SshTarget) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-p".to_string(),
            target.port.to_string(),
        ];
        if let Some(key) = &target.key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push(format!("{}@{}", target.username, target.host));
        args
    }
}

impl Default for OpenSshClient {
    fn default() -> Self {
        Self::new("ssh")
    }
}

#[async_trait]
impl SshClient for OpenSshClient {
    async fn connect(&self, target: &SshTarget) -> RootboxResult<i32> {
        tracing::info!(host = %target.host, port = target.port, user = %target.username, "Opening SSH session");

        let status = tokio::process::Command::new(&self.program)
            .args(Self::args(target))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| {
                RootboxError::RuntimeUnavailable(format!("failed to run {}: {}", self.program, e))
            })?;

        Ok(status.code().unwrap_or(-1))
    }
}
