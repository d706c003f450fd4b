//! Constants for the rootbox runtime
//!
//! Centralized location for hardcoded ports, defaults, names and file names.

pub mod envs {
    pub const ROOTBOX_HOME: &str = "ROOTBOX_HOME";

    /// Set to `none` to disable the container runtime and force degraded mode.
    pub const ROOTBOX_ENGINE: &str = "ROOTBOX_ENGINE";
}

/// Host-side port allocation defaults.
pub mod ports {
    /// First candidate for instance SSH endpoints.
    pub const SSH_BASE: u16 = 2222;

    /// First candidate for instance web endpoints.
    pub const WEB_BASE: u16 = 8080;

    /// Width of each allocation window (`base..base + SPAN`).
    pub const SPAN: u16 = 1000;

    /// Fixed port of the host dashboard, never handed to an instance.
    pub const DASHBOARD: u16 = 3000;

    /// Re-roll budget before allocation gives up.
    pub const MAX_ATTEMPTS: u32 = 64;

    /// Container-side SSH port.
    pub const GUEST_SSH: u16 = 22;

    /// Container-side web port.
    pub const GUEST_WEB: u16 = 80;
}

/// Defaults applied when a create request leaves fields empty.
pub mod instance_defaults {
    pub const USERNAME: &str = "root";
    pub const RAM: &str = "1GB";
    pub const CPU: &str = "2";
    pub const DISK: &str = "20GB";
    pub const PASSWORD_LENGTH: usize = 12;

    /// Address every endpoint is published on.
    pub const HOST: &str = "127.0.0.1";

    /// Prefix for generated identifiers and container names.
    pub const NAME_PREFIX: &str = "vps-";

    /// Length of the random part of a generated identifier.
    pub const GENERATED_ID_LENGTH: usize = 8;

    /// Seconds between heartbeat lines of the startup routine.
    pub const HEARTBEAT_SECS: u64 = 60;
}

/// Bounds applied to every external process invocation.
pub mod timeouts {
    pub const BUILD_SECS: u64 = 600;
    pub const CONTROL_SECS: u64 = 120;
    pub const PROBE_SECS: u64 = 10;
}

/// File naming patterns inside an instance directory.
pub mod filenames {
    pub const LOCK_FILE: &str = ".lock";
    pub const DESCRIPTOR: &str = "config.json";
    pub const DOCKERFILE: &str = "Dockerfile";
    pub const COMPOSE: &str = "docker-compose.yml";
    pub const STARTUP: &str = "start.sh";
    pub const MANAGE: &str = "manage.sh";
    pub const CONNECT: &str = "connect.sh";
    pub const PID_FILE: &str = "vps.pid";
    pub const INSTANCE_LOG: &str = "instance.log";
    pub const PRIVATE_KEY: &str = "id_rsa";
    pub const PUBLIC_KEY: &str = "id_rsa.pub";
}
