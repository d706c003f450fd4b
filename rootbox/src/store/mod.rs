//! Descriptor store: one `config.json` per instance directory.
//!
//! The store is the source of truth across manager restarts. The in-memory
//! registry is rebuilt from [`DescriptorStore::load_all`] at startup.

use std::fs;
use std::path::Path;

use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::layout::{FilesystemLayout, InstanceLayout};
use crate::runtime::types::{InstanceDescriptor, InstanceId};
use crate::templates::ArtifactSet;

#[derive(Clone, Debug)]
pub struct DescriptorStore {
    layout: FilesystemLayout,
}

impl DescriptorStore {
    pub fn new(layout: FilesystemLayout) -> Self {
        Self { layout }
    }

    pub fn instance_layout(&self, id: &InstanceId) -> InstanceLayout {
        self.layout.instance_layout(id.as_str())
    }

    /// True if a descriptor for `id` exists on disk.
    pub fn exists(&self, id: &InstanceId) -> bool {
        self.instance_layout(id).descriptor_path().exists()
    }

    /// Persist `descriptor`, replacing any previous version atomically.
    pub fn save(&self, descriptor: &InstanceDescriptor) -> RootboxResult<()> {
        let layout = self.instance_layout(&descriptor.id);
        layout.prepare()?;

        let path = layout.descriptor_path();
        let json = serde_json::to_string_pretty(descriptor)?;
        write_atomic(&path, json.as_bytes())?;

        tracing::debug!(
            instance_id = %descriptor.id,
            status = %descriptor.status(),
            "Saved descriptor"
        );
        Ok(())
    }

    /// Load one descriptor, `None` if it does not exist.
    pub fn load(&self, id: &InstanceId) -> RootboxResult<Option<InstanceDescriptor>> {
        let path = self.instance_layout(id).descriptor_path();
        if !path.exists() {
            return Ok(None);
        }
        read_descriptor(&path).map(Some)
    }

    /// Load every readable descriptor, ordered by creation time.
    ///
    /// Malformed or unreadable records are skipped with a warning.
    pub fn load_all(&self) -> RootboxResult<Vec<InstanceDescriptor>> {
        let instances_dir = self.layout.instances_dir();
        if !instances_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&instances_dir).map_err(|e| {
            RootboxError::Storage(format!(
                "failed to read {}: {}",
                instances_dir.display(),
                e
            ))
        })?;

        let mut descriptors = Vec::new();
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            let path = InstanceLayout::new(dir.clone()).descriptor_path();
            if !path.exists() {
                tracing::warn!(dir = %dir.display(), "Instance directory has no descriptor, skipping");
                continue;
            }

            match read_descriptor(&path) {
                Ok(descriptor) if descriptor.id.as_str() == dir_name => descriptors.push(descriptor),
                Ok(descriptor) => {
                    tracing::warn!(
                        path = %path.display(),
                        instance_id = %descriptor.id,
                        "Descriptor id does not match its directory, skipping"
                    );
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable descriptor");
                }
            }
        }

        descriptors.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(descriptors)
    }

    /// Remove the instance directory: descriptor, artifacts, data and backups.
    pub fn delete(&self, id: &InstanceId) -> RootboxResult<()> {
        let root = self.instance_layout(id).root().to_path_buf();
        if !root.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&root).map_err(|e| {
            RootboxError::Storage(format!("failed to remove {}: {}", root.display(), e))
        })?;
        tracing::debug!(instance_id = %id, "Deleted instance directory");
        Ok(())
    }

    /// Write rendered artifacts next to the descriptor.
    pub fn write_artifacts(&self, id: &InstanceId, artifacts: &ArtifactSet) -> RootboxResult<()> {
        let layout = self.instance_layout(id);
        layout.prepare()?;

        write_file(&layout.dockerfile_path(), &artifacts.dockerfile, 0o644)?;
        write_file(&layout.compose_path(), &artifacts.compose, 0o644)?;
        write_file(&layout.startup_path(), &artifacts.startup, 0o755)?;
        write_file(&layout.manage_path(), &artifacts.manage, 0o755)?;
        write_file(&layout.connect_path(), &artifacts.connect, 0o755)?;
        write_file(&layout.private_key_path(), &artifacts.private_key, 0o600)?;
        write_file(&layout.public_key_path(), &artifacts.public_key, 0o644)?;

        tracing::debug!(instance_id = %id, dir = %layout.root().display(), "Wrote artifacts");
        Ok(())
    }
}

fn read_descriptor(path: &Path) -> RootboxResult<InstanceDescriptor> {
    let raw = fs::read_to_string(path).map_err(|e| {
        RootboxError::Storage(format!("failed to read {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_atomic(path: &Path, contents: &[u8]) -> RootboxResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).map_err(|e| {
        RootboxError::Storage(format!("failed to write {}: {}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        RootboxError::Storage(format!("failed to replace {}: {}", path.display(), e))
    })
}

fn write_file(path: &Path, contents: &str, mode: u32) -> RootboxResult<()> {
    fs::write(path, contents).map_err(|e| {
        RootboxError::Storage(format!("failed to write {}: {}", path.display(), e))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
            RootboxError::Storage(format!("failed to chmod {}: {}", path.display(), e))
        })?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}
