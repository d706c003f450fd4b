//! Core data types for instance lifecycle management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::engine::ExecutionMode;
use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::constants::instance_defaults;

pub use crate::instance::state::InstanceStatus;

// ============================================================================
// INSTANCE ID
// ============================================================================

/// Instance identifier: a slug usable as a directory and container name.
///
/// # Example
///
/// ```
/// use rootbox::runtime::types::InstanceId;
///
/// let id = InstanceId::from_name("My Server").unwrap();
/// assert_eq!(id.as_str(), "my-server");
/// assert_eq!(id.container_name(), "vps-my-server");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Slugify a requested name: lower-case, whitespace runs become `-`.
    ///
    /// Fails with `Allocation` if the result is empty or holds characters
    /// that cannot appear in a directory or container name.
    pub fn from_name(name: &str) -> RootboxResult<Self> {
        let slug = name
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");
        Self::parse(&slug).ok_or_else(|| {
            RootboxError::Allocation(format!("invalid instance name: {:?}", name))
        })
    }

    /// Accept an already slugified identifier.
    pub fn parse(s: &str) -> Option<Self> {
        if Self::is_valid(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Container-name rules: starts alphanumeric, then `[a-z0-9_.-]`.
    pub fn is_valid(s: &str) -> bool {
        let mut chars = s.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
            _ => return false,
        }
        s.len() <= 63
            && chars.all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')
            })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name shared by the image, the compose service and the container.
    pub fn container_name(&self) -> String {
        format!("{}{}", instance_defaults::NAME_PREFIX, self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for InstanceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// OS CHOICE
// ============================================================================

/// Operating system template an instance is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsChoice {
    #[default]
    Ubuntu,
    Debian,
    Centos,
    Alpine,
}

impl OsChoice {
    pub const ALL: [OsChoice; 4] = [
        OsChoice::Ubuntu,
        OsChoice::Debian,
        OsChoice::Centos,
        OsChoice::Alpine,
    ];

    /// Parse a user-supplied value; unknown values fall back to Ubuntu.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "ubuntu" => OsChoice::Ubuntu,
            "debian" => OsChoice::Debian,
            "centos" => OsChoice::Centos,
            "alpine" => OsChoice::Alpine,
            other => {
                tracing::warn!(os = other, "Unknown OS choice, falling back to ubuntu");
                OsChoice::Ubuntu
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsChoice::Ubuntu => "ubuntu",
            OsChoice::Debian => "debian",
            OsChoice::Centos => "centos",
            OsChoice::Alpine => "alpine",
        }
    }
}

impl fmt::Display for OsChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CREDENTIALS, RESOURCES, ENDPOINTS
// ============================================================================

/// Placeholder SSH key pair; real key generation is out of scope.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterial {
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Login credentials. Stored in plaintext in the descriptor file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub key_material: KeyMaterial,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("key_material", &self.key_material)
            .finish()
    }
}

/// Quota strings passed through to the runtime unvalidated (`1GB`, `2`, `20GB`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    pub ram_limit: String,
    pub cpu_limit: String,
    pub disk_limit: String,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            ram_limit: instance_defaults::RAM.to_string(),
            cpu_limit: instance_defaults::CPU.to_string(),
            disk_limit: instance_defaults::DISK.to_string(),
        }
    }
}

/// Host-side ports published for the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub ssh_port: u16,
    pub web_port: u16,
}

impl Endpoints {
    pub fn ports(&self) -> [u16; 2] {
        [self.ssh_port, self.web_port]
    }
}

// ============================================================================
// INSTANCE DESCRIPTOR
// ============================================================================

/// The persisted configuration record for one instance.
///
/// `status` is only changed through the lifecycle state machine; callers
/// read it through [`InstanceDescriptor::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDescriptor {
    pub id: InstanceId,
    pub display_name: String,
    pub os_choice: OsChoice,
    pub credentials: Credentials,
    pub resources: Resources,
    pub endpoints: Endpoints,
    pub(crate) status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub last_started_at: Option<DateTime<Utc>>,
}

impl InstanceDescriptor {
    /// Fresh descriptor in `Creating` status.
    pub(crate) fn new(
        id: InstanceId,
        display_name: String,
        os_choice: OsChoice,
        credentials: Credentials,
        resources: Resources,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            id,
            display_name,
            os_choice,
            credentials,
            resources,
            endpoints,
            status: InstanceStatus::Creating,
            created_at: Utc::now(),
            last_started_at: None,
        }
    }

    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    /// Validated transition.
    pub(crate) fn transition_to(&mut self, target: InstanceStatus) -> RootboxResult<()> {
        self.status = crate::instance::state::checked_transition(self.status, target)?;
        if target == InstanceStatus::Running {
            self.last_started_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Overwrite status with what a liveness probe observed.
    ///
    /// Returns true when the status changed.
    pub(crate) fn reconcile(&mut self, live: bool) -> bool {
        let next = crate::instance::state::reconciled_status(self.status, live);
        let changed = next != self.status;
        self.status = next;
        changed
    }
}

// ============================================================================
// REQUESTS AND REPORTS
// ============================================================================

/// Parameters of a create request; empty fields take defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOptions {
    /// Requested name, slugified into the id. A random id is generated when absent.
    pub name: Option<String>,
    /// One of ubuntu, debian, centos, alpine. Anything else means ubuntu.
    pub os: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ram: Option<String>,
    pub cpu: Option<String>,
    pub disk: Option<String>,
}

/// Live view of an instance (returned by list and status operations).
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    /// Descriptor with status already corrected by the liveness probe.
    pub descriptor: InstanceDescriptor,

    /// Result of the liveness probe.
    pub live: bool,

    /// Container or degraded local process.
    pub mode: ExecutionMode,

    /// Directory holding the descriptor and artifacts.
    pub storage_dir: PathBuf,
}

impl InstanceInfo {
    pub fn id(&self) -> &InstanceId {
        &self.descriptor.id
    }

    pub fn status(&self) -> InstanceStatus {
        self.descriptor.status
    }
}

/// Captured output of a command run inside an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_descriptor() -> InstanceDescriptor {
        InstanceDescriptor::new(
            InstanceId::from_name("db1").unwrap(),
            "db1".into(),
            OsChoice::Debian,
            Credentials {
                username: "root".into(),
                password: "s3cret!".into(),
                key_material: KeyMaterial {
                    public_key: "ssh-rsa AAAA root@db1".into(),
                    private_key: "-----BEGIN-----".into(),
                },
            },
            Resources::default(),
            Endpoints {
                ssh_port: 2300,
                web_port: 8100,
            },
        )
    }

    #[test]
    fn test_id_slugifies_names() {
        assert_eq!(InstanceId::from_name("db1").unwrap().as_str(), "db1");
        assert_eq!(
            InstanceId::from_name("My  Web\tServer").unwrap().as_str(),
            "my-web-server"
        );
        assert_eq!(InstanceId::from_name("  Alpha ").unwrap().as_str(), "alpha");
    }

    #[test]
    fn test_id_rejects_unsafe_names() {
        assert!(InstanceId::from_name("").is_err());
        assert!(InstanceId::from_name("   ").is_err());
        assert!(InstanceId::from_name("../etc").is_err());
        assert!(InstanceId::from_name("a/b").is_err());
        assert!(InstanceId::from_name("-leading").is_err());
    }

    #[test]
    fn test_container_name() {
        let id = InstanceId::from_name("db1").unwrap();
        assert_eq!(id.container_name(), "vps-db1");
    }

    #[test]
    fn test_os_choice_lenient_parse() {
        assert_eq!(OsChoice::parse_lenient("debian"), OsChoice::Debian);
        assert_eq!(OsChoice::parse_lenient("ALPINE"), OsChoice::Alpine);
        assert_eq!(OsChoice::parse_lenient("windows"), OsChoice::Ubuntu);
        assert_eq!(OsChoice::parse_lenient(""), OsChoice::Ubuntu);
    }

    #[test]
    fn test_descriptor_json_field_names() {
        let descriptor = sample_descriptor();
        let value = serde_json::to_value(&descriptor).unwrap();

        assert_eq!(value["id"], "db1");
        assert_eq!(value["displayName"], "db1");
        assert_eq!(value["osChoice"], "debian");
        assert_eq!(value["status"], "CREATING");
        assert_eq!(value["endpoints"]["sshPort"], 2300);
        assert_eq!(value["resources"]["ramLimit"], "1GB");
        assert_eq!(value["credentials"]["keyMaterial"]["publicKey"], "ssh-rsa AAAA root@db1");
        assert!(value["lastStartedAt"].is_null());
    }

    #[test]
    fn test_transition_to_running_stamps_start_time() {
        let mut descriptor = sample_descriptor();
        descriptor.transition_to(InstanceStatus::Building).unwrap();
        assert!(descriptor.last_started_at.is_none());

        descriptor.transition_to(InstanceStatus::Running).unwrap();
        assert!(descriptor.last_started_at.is_some());
    }

    #[test]
    fn test_invalid_transition_leaves_status() {
        let mut descriptor = sample_descriptor();
        assert!(descriptor.transition_to(InstanceStatus::Stopped).is_err());
        assert_eq!(descriptor.status(), InstanceStatus::Creating);
    }

    #[test]
    fn test_reconcile_reports_changes() {
        let mut descriptor = sample_descriptor();
        descriptor.status = InstanceStatus::Running;

        assert!(descriptor.reconcile(false));
        assert_eq!(descriptor.status(), InstanceStatus::Stopped);
        assert!(!descriptor.reconcile(false));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", sample_descriptor().credentials);
        assert!(!debug.contains("s3cret!"));
        assert!(debug.contains("<redacted>"));
    }
}
