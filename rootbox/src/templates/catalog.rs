//! Static OS catalog: base image and package-manager incantations per OS.

use crate::runtime::types::OsChoice;

/// Packages installed on every instance.
const BASE_PACKAGES: &str = "sudo curl wget git vim htop net-tools openssh-server python3";

/// Package manager family, which decides how setup and updates are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Yum,
    Apk,
}

impl PackageManager {
    /// Non-interactive install of `packages`.
    pub fn install(&self, packages: &str) -> String {
        match self {
            PackageManager::Apt => {
                format!("apt-get update && apt-get install -y {packages}")
            }
            PackageManager::Yum => format!("yum install -y {packages}"),
            PackageManager::Apk => format!("apk update && apk add {packages}"),
        }
    }

    /// Full system upgrade.
    pub fn upgrade(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get update && apt-get upgrade -y",
            PackageManager::Yum => "yum update -y",
            PackageManager::Apk => "apk update && apk upgrade",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub os: OsChoice,
    pub display_name: &'static str,
    pub image: &'static str,
    pub package_manager: PackageManager,
    /// OS-specific additions to the base package list.
    pub extra_packages: &'static str,
    pub default_user: &'static str,
}

impl CatalogEntry {
    /// Setup command run once during the image build.
    pub fn setup_command(&self) -> String {
        let packages = if self.extra_packages.is_empty() {
            BASE_PACKAGES.to_string()
        } else {
            format!("{BASE_PACKAGES} {}", self.extra_packages)
        };
        self.package_manager.install(&packages)
    }

    pub fn upgrade_command(&self) -> &'static str {
        self.package_manager.upgrade()
    }

    /// Monitoring tools installed after setup.
    pub fn monitoring_command(&self) -> String {
        match self.package_manager {
            PackageManager::Yum => {
                "yum install -y epel-release && yum install -y htop neofetch wget curl".to_string()
            }
            pm => pm.install("htop neofetch wget curl"),
        }
    }
}

/// Catalog entry for an OS choice. Total over `OsChoice`.
pub fn lookup(os: OsChoice) -> CatalogEntry {
    match os {
        OsChoice::Ubuntu => CatalogEntry {
            os,
            display_name: "Ubuntu 22.04 LTS",
            image: "ubuntu:22.04",
            package_manager: PackageManager::Apt,
            extra_packages: "",
            default_user: "root",
        },
        OsChoice::Debian => CatalogEntry {
            os,
            display_name: "Debian 11",
            image: "debian:11",
            package_manager: PackageManager::Apt,
            extra_packages: "systemctl",
            default_user: "root",
        },
        OsChoice::Centos => CatalogEntry {
            os,
            display_name: "CentOS 8",
            image: "centos:8",
            package_manager: PackageManager::Yum,
            extra_packages: "epel-release",
            default_user: "root",
        },
        OsChoice::Alpine => CatalogEntry {
            os,
            display_name: "Alpine Linux",
            image: "alpine:latest",
            package_manager: PackageManager::Apk,
            extra_packages: "bash",
            default_user: "root",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_choice_has_an_entry() {
        for os in OsChoice::ALL {
            let entry = lookup(os);
            assert_eq!(entry.os, os);
            assert!(!entry.image.is_empty());
            assert!(entry.setup_command().contains("openssh-server"));
        }
    }

    #[test]
    fn test_setup_uses_package_manager() {
        assert!(lookup(OsChoice::Debian).setup_command().starts_with("apt-get update"));
        assert!(lookup(OsChoice::Debian).setup_command().ends_with("systemctl"));
        assert!(lookup(OsChoice::Centos).setup_command().starts_with("yum install -y"));
        assert!(lookup(OsChoice::Alpine).setup_command().contains("apk add"));
    }

    #[test]
    fn test_upgrade_commands() {
        assert_eq!(lookup(OsChoice::Centos).upgrade_command(), "yum update -y");
        assert_eq!(
            lookup(OsChoice::Alpine).upgrade_command(),
            "apk update && apk upgrade"
        );
    }
}
