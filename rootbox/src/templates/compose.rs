//! Runtime composition for one instance, serialized as docker-compose YAML.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::constants::ports;
use crate::runtime::layout::dirs;
use crate::runtime::types::InstanceDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposeSpec {
    pub version: String,
    pub services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposeService {
    pub build: String,
    pub image: String,
    pub container_name: String,
    pub hostname: String,
    pub restart: String,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub environment: Vec<String>,
    pub cap_add: Vec<String>,
    pub privileged: bool,
    pub tty: bool,
    pub stdin_open: bool,
    pub mem_limit: String,
    pub cpus: String,
}

impl ComposeSpec {
    pub fn for_instance(descriptor: &InstanceDescriptor) -> Self {
        let name = descriptor.id.container_name();
        let endpoints = descriptor.endpoints;

        let service = ComposeService {
            build: ".".to_string(),
            image: name.clone(),
            container_name: name.clone(),
            hostname: descriptor.id.to_string(),
            restart: "unless-stopped".to_string(),
            ports: vec![
                format!("{}:{}", endpoints.ssh_port, ports::GUEST_SSH),
                format!("{}:{}", endpoints.web_port, ports::GUEST_WEB),
            ],
            volumes: vec![
                format!("./{}:/data", dirs::DATA_DIR),
                format!("./{}:/root/.ssh", dirs::SSH_DIR),
            ],
            environment: vec![
                format!("VPS_NAME={}", descriptor.display_name),
                format!("VPS_OS={}", descriptor.os_choice),
                format!("VPS_USER={}", descriptor.credentials.username),
            ],
            cap_add: vec!["SYS_ADMIN".to_string(), "NET_ADMIN".to_string()],
            privileged: true,
            tty: true,
            stdin_open: true,
            mem_limit: descriptor.resources.ram_limit.clone(),
            cpus: descriptor.resources.cpu_limit.clone(),
        };

        Self {
            version: "3.8".to_string(),
            services: BTreeMap::from([(name, service)]),
        }
    }

    pub fn render(&self) -> RootboxResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| RootboxError::Provisioning(format!("failed to encode composition: {e}")))
    }
}
