//! Image build recipe as structured data, rendered to a Dockerfile.

use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::constants::{filenames, ports};
use crate::runtime::types::InstanceDescriptor;
use crate::templates::catalog::CatalogEntry;
use crate::templates::sh_quote;

/// Environment variable telling the startup routine it runs inside a container.
pub const IN_CONTAINER_ENV: &str = "ROOTBOX_IN_CONTAINER";

const MOTD_PATH: &str = "/etc/update-motd.d/00-rootbox";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    From(String),
    Env(String, String),
    Run(String),
    Copy { src: String, dest: String },
    Expose(u16),
    Cmd(Vec<String>),
}

impl Instruction {
    fn render(&self) -> RootboxResult<String> {
        Ok(match self {
            Instruction::From(image) => format!("FROM {image}"),
            Instruction::Env(key, value) => format!("ENV {key}={value}"),
            Instruction::Run(command) => format!("RUN {command}"),
            Instruction::Copy { src, dest } => format!("COPY {src} {dest}"),
            Instruction::Expose(port) => format!("EXPOSE {port}"),
            Instruction::Cmd(argv) => {
                let json = serde_json::to_string(argv).map_err(|e| {
                    RootboxError::Provisioning(format!("failed to encode CMD: {e}"))
                })?;
                format!("CMD {json}")
            }
        })
    }
}

/// Ordered build instructions for one instance image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub instructions: Vec<Instruction>,
}

impl ImageSpec {
    pub fn for_instance(descriptor: &InstanceDescriptor, entry: &CatalogEntry) -> Self {
        let user = &descriptor.credentials.username;
        let login = sh_quote(&format!("{}:{}", user, descriptor.credentials.password));

        let mut instructions = vec![
            Instruction::From(entry.image.to_string()),
            Instruction::Env("DEBIAN_FRONTEND".into(), "noninteractive".into()),
            Instruction::Env("TERM".into(), "xterm-256color".into()),
            Instruction::Env(IN_CONTAINER_ENV.into(), "1".into()),
            Instruction::Run(entry.setup_command()),
        ];

        if user != "root" {
            let quoted = sh_quote(user);
            instructions.push(Instruction::Run(format!(
                "id -u {quoted} >/dev/null 2>&1 || useradd -m -s /bin/bash {quoted} || adduser -D {quoted}"
            )));
        }
        instructions.push(Instruction::Run(format!("echo {login} | chpasswd")));

        instructions.push(Instruction::Run(
            "mkdir -p /run/sshd \
             && echo \"PermitRootLogin yes\" >> /etc/ssh/sshd_config \
             && echo \"PasswordAuthentication yes\" >> /etc/ssh/sshd_config"
                .to_string(),
        ));
        instructions.push(Instruction::Run(entry.monitoring_command()));
        instructions.push(Instruction::Run(motd_command(descriptor, entry)));

        instructions.push(Instruction::Copy {
            src: filenames::STARTUP.to_string(),
            dest: "/start.sh".to_string(),
        });
        instructions.push(Instruction::Run("chmod +x /start.sh".to_string()));
        instructions.push(Instruction::Expose(ports::GUEST_SSH));
        instructions.push(Instruction::Expose(ports::GUEST_WEB));
        instructions.push(Instruction::Cmd(vec!["/start.sh".to_string()]));

        Self { instructions }
    }

    pub fn render(&self) -> RootboxResult<String> {
        let mut out = String::new();
        for instruction in &self.instructions {
            out.push_str(&instruction.render()?);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Login banner written as an executable motd fragment.
fn motd_command(descriptor: &InstanceDescriptor, entry: &CatalogEntry) -> String {
    let rule = "echo \"==========================================\"";
    let lines = [
        "#!/bin/sh".to_string(),
        rule.to_string(),
        format!("echo {}", sh_quote(&format!("ROOTBOX INSTANCE - {}", descriptor.display_name))),
        rule.to_string(),
        format!("echo {}", sh_quote(&format!("OS: {}", entry.display_name))),
        format!(
            "echo {}",
            sh_quote(&format!("SSH port: {}", descriptor.endpoints.ssh_port))
        ),
        format!("echo {}", sh_quote(&format!("User: {}", descriptor.credentials.username))),
        format!(
            "echo {}",
            sh_quote(&format!(
                "RAM: {} | CPU: {} | Disk: {}",
                descriptor.resources.ram_limit,
                descriptor.resources.cpu_limit,
                descriptor.resources.disk_limit
            ))
        ),
        format!(
            "echo {}",
            sh_quote(&format!("Created: {}", descriptor.created_at.to_rfc3339()))
        ),
        rule.to_string(),
    ];

    let quoted: Vec<String> = lines.iter().map(|line| sh_quote(line)).collect();
    format!(
        "mkdir -p /etc/update-motd.d && printf '%s\\n' {} > {MOTD_PATH} && chmod +x {MOTD_PATH}",
        quoted.join(" ")
    )
}
