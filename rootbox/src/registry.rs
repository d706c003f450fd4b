//! Thread-safe in-memory instance registry.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::engine::ExecutionMode;
use crate::errors::{RootboxError, RootboxResult};
use crate::runtime::types::{InstanceDescriptor, InstanceId};

/// One known instance: descriptor, storage directory and runtime handle.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub descriptor: InstanceDescriptor,
    pub storage_dir: PathBuf,
    pub mode: ExecutionMode,
}

/// Registry of every instance this manager knows about.
///
/// Owned by the runtime and rebuilt from the descriptor store at startup.
/// Uses RwLock for concurrent reads (list, status) with exclusive writes.
/// The lock is never held across an await.
#[derive(Clone, Debug, Default)]
pub struct InstanceRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<InstanceId, RegistryEntry>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RootboxResult<std::sync::RwLockReadGuard<'_, RegistryInner>> {
        self.inner
            .read()
            .map_err(|e| RootboxError::Internal(format!("registry lock poisoned: {}", e)))
    }

    fn write(&self) -> RootboxResult<std::sync::RwLockWriteGuard<'_, RegistryInner>> {
        self.inner
            .write()
            .map_err(|e| RootboxError::Internal(format!("registry lock poisoned: {}", e)))
    }

    /// Register a new instance.
    ///
    /// # Errors
    ///
    /// Returns `Allocation` if an instance with this id already exists.
    pub fn register(&self, entry: RegistryEntry) -> RootboxResult<()> {
        let mut inner = self.write()?;
        let id = entry.descriptor.id.clone();

        if inner.entries.contains_key(&id) {
            return Err(RootboxError::Allocation(format!(
                "instance {} already exists",
                id
            )));
        }

        tracing::debug!(
            instance_id = %id,
            status = %entry.descriptor.status(),
            "Registering instance"
        );
        inner.entries.insert(id, entry);
        Ok(())
    }

    /// Replace the entry of an existing instance.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the instance is not registered.
    pub fn update(&self, entry: RegistryEntry) -> RootboxResult<()> {
        let mut inner = self.write()?;
        match inner.entries.get_mut(&entry.descriptor.id) {
            Some(existing) => {
                tracing::trace!(
                    instance_id = %entry.descriptor.id,
                    old_status = %existing.descriptor.status(),
                    new_status = %entry.descriptor.status(),
                    mode = %entry.mode,
                    "Updating instance"
                );
                *existing = entry;
                Ok(())
            }
            None => Err(RootboxError::NotFound(entry.descriptor.id.to_string())),
        }
    }

    pub fn get(&self, id: &str) -> RootboxResult<Option<RegistryEntry>> {
        Ok(self.read()?.entries.get(id).cloned())
    }

    /// Like [`get`](Self::get), but a missing id is `NotFound`.
    pub fn require(&self, id: &str) -> RootboxResult<RegistryEntry> {
        self.get(id)?
            .ok_or_else(|| RootboxError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> RootboxResult<bool> {
        Ok(self.read()?.entries.contains_key(id))
    }

    /// Remove an instance, returning its last entry.
    pub fn remove(&self, id: &str) -> RootboxResult<RegistryEntry> {
        tracing::debug!(instance_id = %id, "Removing instance from registry");
        self.write()?
            .entries
            .remove(id)
            .ok_or_else(|| RootboxError::NotFound(id.to_string()))
    }

    /// All entries, oldest first, ties broken by id.
    pub fn list(&self) -> RootboxResult<Vec<RegistryEntry>> {
        let mut entries: Vec<RegistryEntry> = self.read()?.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.descriptor
                .created_at
                .cmp(&b.descriptor.created_at)
                .then_with(|| a.descriptor.id.cmp(&b.descriptor.id))
        });
        Ok(entries)
    }

    /// Every host port held by a registered instance.
    pub fn allocated_ports(&self) -> RootboxResult<HashSet<u16>> {
        Ok(self
            .read()?
            .entries
            .values()
            .flat_map(|entry| entry.descriptor.endpoints.ports())
            .collect())
    }

    pub fn len(&self) -> RootboxResult<usize> {
        Ok(self.read()?.entries.len())
    }

    pub fn is_empty(&self) -> RootboxResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::types::{Credentials, Endpoints, KeyMaterial, OsChoice, Resources};

    fn entry(name: &str, ssh_port: u16, web_port: u16) -> RegistryEntry {
        RegistryEntry {
            descriptor: InstanceDescriptor::new(
                InstanceId::from_name(name).unwrap(),
                name.to_string(),
                OsChoice::Ubuntu,
                Credentials {
                    username: "root".into(),
                    password: "pw".into(),
                    key_material: KeyMaterial {
                        public_key: String::new(),
                        private_key: String::new(),
                    },
                },
                Resources::default(),
                Endpoints { ssh_port, web_port },
            ),
            storage_dir: PathBuf::from(format!("/tmp/{name}")),
            mode: ExecutionMode::Container,
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = InstanceRegistry::new();
        registry.register(entry("db1", 2300, 8100)).unwrap();

        let err = registry.register(entry("db1", 2400, 8200)).unwrap_err();
        assert!(matches!(err, RootboxError::Allocation(_)));

        let kept = registry.require("db1").unwrap();
        assert_eq!(kept.descriptor.endpoints.ssh_port, 2300);
    }

    #[test]
    fn test_missing_ids_are_not_found() {
        let registry = InstanceRegistry::new();
        assert!(registry.get("missing").unwrap().is_none());
        assert!(matches!(registry.require("missing"), Err(RootboxError::NotFound(_))));
        assert!(matches!(registry.remove("missing"), Err(RootboxError::NotFound(_))));
        assert!(matches!(
            registry.update(entry("missing", 1, 2)),
            Err(RootboxError::NotFound(_))
        ));
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_allocated_ports_cover_both_endpoints() {
        let registry = InstanceRegistry::new();
        registry.register(entry("a", 2300, 8100)).unwrap();
        registry.register(entry("b", 2301, 8101)).unwrap();

        let ports = registry.allocated_ports().unwrap();
        assert_eq!(ports, HashSet::from([2300, 8100, 2301, 8101]));
    }

    #[test]
    fn test_update_and_remove() {
        let registry = InstanceRegistry::new();
        registry.register(entry("db1", 2300, 8100)).unwrap();

        let mut updated = registry.require("db1").unwrap();
        updated.mode = ExecutionMode::Degraded { pid: 42 };
        registry.update(updated).unwrap();
        assert_eq!(
            registry.require("db1").unwrap().mode,
            ExecutionMode::Degraded { pid: 42 }
        );

        registry.remove("db1").unwrap();
        assert!(!registry.contains("db1").unwrap());
    }

    #[test]
    fn test_list_is_ordered_by_creation() {
        let registry = InstanceRegistry::new();
        let first = entry("zeta", 2300, 8100);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = entry("alpha", 2301, 8101);
        registry.register(second).unwrap();
        registry.register(first).unwrap();

        let ids: Vec<String> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|e| e.descriptor.id.to_string())
            .collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);
    }
}
