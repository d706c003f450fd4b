//! Provisioning templater.
//!
//! Turns a descriptor into the artifacts needed to run it. Every artifact is
//! built as structured data first ([`ImageSpec`], [`ComposeSpec`],
//! [`StartupRoutine`], [`ManagementInterface`]) and rendered to text only at
//! the end. Nothing in this module executes anything.

pub mod catalog;
pub mod compose;
pub mod image;
pub mod scripts;

use std::path::PathBuf;

pub use catalog::{CatalogEntry, PackageManager, lookup};
pub use compose::{ComposeService, ComposeSpec};
pub use image::{ImageSpec, Instruction};
pub use scripts::{ConnectScript, ManageCommand, ManagementInterface, StartupRoutine};

use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::constants::instance_defaults;
use crate::runtime::types::InstanceDescriptor;

/// Inputs to rendering that do not live in the descriptor.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Storage directory of the instance, baked into `manage.sh`.
    pub instance_dir: PathBuf,
    pub heartbeat_secs: u64,
    pub docker_program: String,
    pub compose_program: String,
}

/// Rendered artifacts of one instance, ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub dockerfile: String,
    pub compose: String,
    pub startup: String,
    pub manage: String,
    pub connect: String,
    pub private_key: String,
    pub public_key: String,
}

/// Render every artifact of `descriptor`.
///
/// Fails with `Provisioning` only when the descriptor itself is malformed.
pub fn render(
    descriptor: &InstanceDescriptor,
    entry: &CatalogEntry,
    ctx: &RenderContext,
) -> RootboxResult<ArtifactSet> {
    validate(descriptor)?;

    let host = instance_defaults::HOST.to_string();
    let username = descriptor.credentials.username.clone();

    let manage = ManagementInterface {
        instance_id: descriptor.id.to_string(),
        display_name: descriptor.display_name.clone(),
        instance_dir: ctx.instance_dir.clone(),
        container_name: descriptor.id.container_name(),
        username: username.clone(),
        host: host.clone(),
        ssh_port: descriptor.endpoints.ssh_port,
        web_port: descriptor.endpoints.web_port,
        upgrade_command: entry.upgrade_command().to_string(),
        docker_program: ctx.docker_program.clone(),
        compose_program: ctx.compose_program.clone(),
    };
    let connect = ConnectScript {
        display_name: descriptor.display_name.clone(),
        username,
        host,
        ssh_port: descriptor.endpoints.ssh_port,
    };

    Ok(ArtifactSet {
        dockerfile: ImageSpec::for_instance(descriptor, entry).render()?,
        compose: ComposeSpec::for_instance(descriptor).render()?,
        startup: StartupRoutine::for_instance(descriptor, entry, ctx.heartbeat_secs).render(),
        manage: manage.render(),
        connect: connect.render(),
        private_key: descriptor.credentials.key_material.private_key.clone(),
        public_key: format!("{}\n", descriptor.credentials.key_material.public_key),
    })
}

/// Fields that end up unquoted in a Dockerfile or composition.
fn validate(descriptor: &InstanceDescriptor) -> RootboxResult<()> {
    let username = &descriptor.credentials.username;
    let username_ok = !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !username.starts_with('-');
    if !username_ok {
        return Err(RootboxError::Provisioning(format!(
            "invalid username {:?}",
            username
        )));
    }

    let endpoints = descriptor.endpoints;
    if endpoints.ssh_port == 0 || endpoints.web_port == 0 || endpoints.ssh_port == endpoints.web_port
    {
        return Err(RootboxError::Provisioning(format!(
            "invalid endpoints ssh={} web={}",
            endpoints.ssh_port, endpoints.web_port
        )));
    }

    let resources = &descriptor.resources;
    for (label, value) in [
        ("ram", &resources.ram_limit),
        ("cpu", &resources.cpu_limit),
        ("disk", &resources.disk_limit),
    ] {
        if value.trim().is_empty() || value.chars().any(char::is_control) {
            return Err(RootboxError::Provisioning(format!(
                "invalid {label} limit {:?}",
                value
            )));
        }
    }

    if descriptor.credentials.password.chars().any(|c| c == '\n' || c == '\0') {
        return Err(RootboxError::Provisioning(
            "password must not contain newlines".into(),
        ));
    }

    Ok(())
}

/// Quote `value` as a single POSIX shell word.
pub fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
