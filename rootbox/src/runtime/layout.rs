use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::constants::filenames;
use std::path::{Path, PathBuf};

/// Directory structure constants
pub mod dirs {
    /// Base directory name for rootbox data
    pub const ROOTBOX_DIR: &str = ".rootbox";

    /// Subdirectory holding one directory per instance
    pub const INSTANCES_DIR: &str = "instances";

    /// Subdirectory for manager log files
    pub const LOGS_DIR: &str = "logs";

    /// Per-instance persistent volume mounted at /data
    pub const DATA_DIR: &str = "data";

    /// Per-instance SSH key material mounted at /root/.ssh
    pub const SSH_DIR: &str = "ssh";

    /// Per-instance backup archives
    pub const BACKUPS_DIR: &str = "backups";
}

// ============================================================================
// FILESYSTEM LAYOUT (home directory)
// ============================================================================

#[derive(Clone, Debug)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::LOGS_DIR)
    }

    /// Root directory for all instances: ~/.rootbox/instances
    pub fn instances_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::INSTANCES_DIR)
    }

    /// Initialize the filesystem structure.
    pub fn prepare(&self) -> RootboxResult<()> {
        std::fs::create_dir_all(&self.home_dir)
            .map_err(|e| RootboxError::Storage(format!("failed to create home: {e}")))?;

        std::fs::create_dir_all(self.instances_dir())
            .map_err(|e| RootboxError::Storage(format!("failed to create instances dir: {e}")))?;

        std::fs::create_dir_all(self.logs_dir())
            .map_err(|e| RootboxError::Storage(format!("failed to create logs dir: {e}")))?;

        Ok(())
    }

    /// Layout for a single instance directory.
    pub fn instance_layout(&self, instance_id: &str) -> InstanceLayout {
        InstanceLayout::new(self.instances_dir().join(instance_id))
    }
}

// ============================================================================
// INSTANCE FILESYSTEM LAYOUT (per-instance directory)
// ============================================================================

/// Filesystem layout for a single instance directory.
///
/// The directory is the unit of backup: it holds the descriptor, every
/// rendered artifact, the persistent volume and the degraded-mode log.
///
/// # Directory Structure
///
/// ```text
/// ~/.rootbox/instances/{id}/
/// ├── config.json
/// ├── Dockerfile
/// ├── docker-compose.yml
/// ├── start.sh / manage.sh / connect.sh
/// ├── data/
/// ├── ssh/
/// │   ├── id_rsa
/// │   └── id_rsa.pub
/// ├── backups/
/// ├── logs/instance.log
/// └── vps.pid             # only while running in degraded mode
/// ```
#[derive(Clone, Debug)]
pub struct InstanceLayout {
    root: PathBuf,
}

impl InstanceLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join(filenames::DESCRIPTOR)
    }

    pub fn dockerfile_path(&self) -> PathBuf {
        self.root.join(filenames::DOCKERFILE)
    }

    pub fn compose_path(&self) -> PathBuf {
        self.root.join(filenames::COMPOSE)
    }

    pub fn startup_path(&self) -> PathBuf {
        self.root.join(filenames::STARTUP)
    }

    pub fn manage_path(&self) -> PathBuf {
        self.root.join(filenames::MANAGE)
    }

    pub fn connect_path(&self) -> PathBuf {
        self.root.join(filenames::CONNECT)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(dirs::DATA_DIR)
    }

    pub fn ssh_dir(&self) -> PathBuf {
        self.root.join(dirs::SSH_DIR)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.ssh_dir().join(filenames::PRIVATE_KEY)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.ssh_dir().join(filenames::PUBLIC_KEY)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(dirs::BACKUPS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(dirs::LOGS_DIR)
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir().join(filenames::INSTANCE_LOG)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.root.join(filenames::PID_FILE)
    }

    /// Create the instance directory and its subdirectories.
    pub fn prepare(&self) -> RootboxResult<()> {
        for dir in [
            self.root.clone(),
            self.data_dir(),
            self.ssh_dir(),
            self.backups_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                RootboxError::Storage(format!("failed to create {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_home_structure() {
        let temp = TempDir::new().unwrap();
        let layout = FilesystemLayout::new(temp.path().join("home"));

        layout.prepare().unwrap();

        assert!(layout.instances_dir().is_dir());
        assert!(layout.logs_dir().is_dir());
    }

    #[test]
    fn test_instance_layout_paths() {
        let layout = FilesystemLayout::new(PathBuf::from("/srv/rootbox"));
        let instance = layout.instance_layout("db1");

        assert_eq!(instance.root(), Path::new("/srv/rootbox/instances/db1"));
        assert!(instance.descriptor_path().ends_with("db1/config.json"));
        assert!(instance.private_key_path().ends_with("ssh/id_rsa"));
        assert!(instance.log_path().ends_with("logs/instance.log"));
        assert!(instance.pid_path().ends_with("vps.pid"));
    }

    #[test]
    fn test_instance_prepare_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let instance = InstanceLayout::new(temp.path().join("web"));

        instance.prepare().unwrap();
        instance.prepare().unwrap();

        assert!(instance.data_dir().is_dir());
        assert!(instance.ssh_dir().is_dir());
        assert!(instance.backups_dir().is_dir());
    }
}
