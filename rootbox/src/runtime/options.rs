//! Configuration for rootbox.

use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::constants::{envs as const_envs, instance_defaults, ports, timeouts};
use crate::runtime::layout::dirs as const_dirs;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Engine Options
// ============================================================================

/// How the container runtime is reached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// When false every operation goes straight to degraded mode.
    #[serde(default = "default_engine_enabled")]
    pub enabled: bool,

    /// Container CLI used for build, ps, exec and export.
    #[serde(default = "default_docker_program")]
    pub docker_program: String,

    /// Compose CLI used for up, down and restart.
    ///
    /// Multiple words are split on whitespace, so `"docker compose"` works
    /// alongside the standalone `"docker-compose"`.
    #[serde(default = "default_compose_program")]
    pub compose_program: String,
}

fn default_engine_enabled() -> bool {
    true
}

fn default_docker_program() -> String {
    "docker".to_string()
}

fn default_compose_program() -> String {
    "docker-compose".to_string()
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enabled: default_engine_enabled(),
            docker_program: default_docker_program(),
            compose_program: default_compose_program(),
        }
    }
}

// ============================================================================
// Port Ranges
// ============================================================================

/// Windows the allocator draws host ports from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRanges {
    #[serde(default = "default_ssh_base")]
    pub ssh_base: u16,

    #[serde(default = "default_web_base")]
    pub web_base: u16,

    /// Each window is `base..base + span`.
    #[serde(default = "default_span")]
    pub span: u16,

    /// Reserved for the host dashboard, never allocated.
    #[serde(default = "default_dashboard_port")]
    pub dashboard_port: u16,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Also reject ports that cannot be bound on the host right now.
    #[serde(default = "default_probe_host")]
    pub probe_host: bool,
}

fn default_ssh_base() -> u16 {
    ports::SSH_BASE
}

fn default_web_base() -> u16 {
    ports::WEB_BASE
}

fn default_span() -> u16 {
    ports::SPAN
}

fn default_dashboard_port() -> u16 {
    ports::DASHBOARD
}

fn default_max_attempts() -> u32 {
    ports::MAX_ATTEMPTS
}

fn default_probe_host() -> bool {
    true
}

impl Default for PortRanges {
    fn default() -> Self {
        Self {
            ssh_base: default_ssh_base(),
            web_base: default_web_base(),
            span: default_span(),
            dashboard_port: default_dashboard_port(),
            max_attempts: default_max_attempts(),
            probe_host: default_probe_host(),
        }
    }
}

// ============================================================================
// Execution Timeouts
// ============================================================================

/// Upper bounds, in seconds, for external process invocations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTimeouts {
    /// Image builds.
    #[serde(default = "default_build_secs")]
    pub build_secs: u64,

    /// Compose up/down/restart, exec and export.
    #[serde(default = "default_control_secs")]
    pub control_secs: u64,

    /// Liveness probes.
    #[serde(default = "default_probe_secs")]
    pub probe_secs: u64,
}

fn default_build_secs() -> u64 {
    timeouts::BUILD_SECS
}

fn default_control_secs() -> u64 {
    timeouts::CONTROL_SECS
}

fn default_probe_secs() -> u64 {
    timeouts::PROBE_SECS
}

impl ExecutionTimeouts {
    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn control(&self) -> Duration {
        Duration::from_secs(self.control_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }
}

impl Default for ExecutionTimeouts {
    fn default() -> Self {
        Self {
            build_secs: default_build_secs(),
            control_secs: default_control_secs(),
            probe_secs: default_probe_secs(),
        }
    }
}

// ============================================================================
// Rootbox Options
// ============================================================================

/// Top-level manager configuration.
///
/// Every field has a default, so a partial JSON options file is valid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RootboxOptions {
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,

    #[serde(default)]
    pub engine: EngineOptions,

    #[serde(default)]
    pub ports: PortRanges,

    #[serde(default)]
    pub timeouts: ExecutionTimeouts,

    /// Interval of the startup routine's keep-alive heartbeat.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_home_dir() -> PathBuf {
    std::env::var(const_envs::ROOTBOX_HOME)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let mut path = home_dir().unwrap_or_else(|| PathBuf::from("."));
            path.push(const_dirs::ROOTBOX_DIR);
            path
        })
}

fn default_heartbeat_secs() -> u64 {
    instance_defaults::HEARTBEAT_SECS
}

impl Default for RootboxOptions {
    fn default() -> Self {
        let mut engine = EngineOptions::default();
        if std::env::var(const_envs::ROOTBOX_ENGINE).as_deref() == Ok("none") {
            engine.enabled = false;
        }

        Self {
            home_dir: default_home_dir(),
            engine,
            ports: PortRanges::default(),
            timeouts: ExecutionTimeouts::default(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl RootboxOptions {
    /// Load options from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> RootboxResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RootboxError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut options: RootboxOptions = serde_json::from_str(&raw).map_err(|e| {
            RootboxError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        if std::env::var(const_envs::ROOTBOX_ENGINE).as_deref() == Ok("none") {
            options.engine.enabled = false;
        }
        Ok(options)
    }

    /// Check preconditions before any directory is touched.
    pub fn validate(&self) -> RootboxResult<()> {
        if !self.home_dir.is_absolute() {
            return Err(RootboxError::Config(format!(
                "home_dir must be absolute path, got: {}",
                self.home_dir.display()
            )));
        }

        let ports = &self.ports;
        if ports.span == 0 {
            return Err(RootboxError::Config("port span must be non-zero".into()));
        }
        if ports.max_attempts == 0 {
            return Err(RootboxError::Config(
                "port max_attempts must be non-zero".into(),
            ));
        }
        for (label, base) in [("ssh", ports.ssh_base), ("web", ports.web_base)] {
            if base.checked_add(ports.span).is_none() {
                return Err(RootboxError::Config(format!(
                    "{label} port window {base}+{} exceeds 65535",
                    ports.span
                )));
            }
        }

        let t = &self.timeouts;
        if t.build_secs == 0 || t.control_secs == 0 || t.probe_secs == 0 {
            return Err(RootboxError::Config("timeouts must be non-zero".into()));
        }
        if self.heartbeat_secs == 0 {
            return Err(RootboxError::Config("heartbeat_secs must be non-zero".into()));
        }

        Ok(())
    }
}
