// SPDX-License-Identifier: MIT
//! Volume, network, and runtime registries (§3, §9): each is a shared,
//! mutable collection behind its own reader-writer lock, independent of
//! the job store's lock (§5 "each guarded by a dedicated reader-writer
//! lock").

use joblet_core::error::JobletError;
use joblet_core::network::{Network, NetworkKind};
use joblet_core::runtime::Runtime;
use joblet_core::volume::{Volume, VolumeKind};
use parking_lot::RwLock;
use std::collections::HashMap;

pub struct VolumeRegistry {
    volumes: RwLock<HashMap<String, Volume>>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self { volumes: RwLock::new(HashMap::new()) }
    }

    pub fn create(&self, name: &str, size_bytes: u64, kind: VolumeKind) -> Result<Volume, JobletError> {
        let mut volumes = self.volumes.write();
        if volumes.contains_key(name) {
            return Err(JobletError::already_exists(name.to_string()));
        }
        let volume = Volume::new(name, size_bytes, kind);
        volumes.insert(name.to_string(), volume.clone());
        Ok(volume)
    }

    pub fn list(&self) -> Vec<Volume> {
        self.volumes.read().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Volume> {
        self.volumes.read().get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.volumes.read().contains_key(name)
    }

    /// Remove a volume; rejected while it is referenced by any job
    /// (§3 `RefCount`).
    pub fn remove(&self, name: &str) -> Result<(), JobletError> {
        let mut volumes = self.volumes.write();
        match volumes.get(name) {
            None => Err(JobletError::not_found(name.to_string())),
            Some(v) if v.ref_count > 0 => {
                Err(JobletError::validation(name.to_string(), "volume is still referenced by a job"))
            }
            Some(_) => {
                volumes.remove(name);
                Ok(())
            }
        }
    }

    pub fn acquire(&self, name: &str) {
        if let Some(v) = self.volumes.write().get_mut(name) {
            v.acquire();
        }
    }

    pub fn release(&self, name: &str) {
        if let Some(v) = self.volumes.write().get_mut(name) {
            v.release();
        }
    }
}

impl Default for VolumeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NetworkRegistry {
    networks: RwLock<HashMap<String, Network>>,
}

impl NetworkRegistry {
    /// Built-ins (`bridge`, `isolated`, `none`) always exist (§3).
    pub fn new() -> Self {
        let mut networks = HashMap::new();
        for n in Network::builtins() {
            networks.insert(n.name.clone(), n);
        }
        Self { networks: RwLock::new(networks) }
    }

    pub fn create(&self, name: &str, kind: NetworkKind) -> Result<Network, JobletError> {
        let mut networks = self.networks.write();
        if networks.contains_key(name) {
            return Err(JobletError::already_exists(name.to_string()));
        }
        let network = Network { name: name.to_string(), kind };
        networks.insert(name.to_string(), network.clone());
        Ok(network)
    }

    pub fn list(&self) -> Vec<Network> {
        self.networks.read().values().cloned().collect()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.networks.read().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Result<(), JobletError> {
        if Network::is_builtin(name) {
            return Err(JobletError::validation(name.to_string(), "cannot remove a built-in network"));
        }
        let mut networks = self.networks.write();
        if networks.remove(name).is_none() {
            return Err(JobletError::not_found(name.to_string()));
        }
        Ok(())
    }
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RuntimeRegistry {
    runtimes: RwLock<HashMap<String, Runtime>>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self { runtimes: RwLock::new(HashMap::new()) }
    }

    /// Runtimes are prepared out-of-band (image pulling is a non-goal);
    /// this only registers the tag against the already-materialized tree.
    pub fn register(&self, runtime: Runtime) {
        self.runtimes.write().insert(runtime.tag.clone(), runtime);
    }

    pub fn list(&self) -> Vec<Runtime> {
        self.runtimes.read().values().cloned().collect()
    }

    pub fn get(&self, tag: &str) -> Option<Runtime> {
        self.runtimes.read().get(tag).cloned()
    }

    pub fn exists(&self, tag: &str) -> bool {
        self.runtimes.read().contains_key(tag)
    }
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_registry_seeds_builtins() {
        let reg = NetworkRegistry::new();
        assert!(reg.exists("bridge"));
        assert!(reg.exists("isolated"));
        assert!(reg.exists("none"));
    }

    #[test]
    fn builtin_network_cannot_be_removed() {
        let reg = NetworkRegistry::new();
        assert!(reg.remove("bridge").is_err());
    }

    #[test]
    fn volume_with_refs_cannot_be_removed() {
        let reg = VolumeRegistry::new();
        reg.create("data", 1024, VolumeKind::Filesystem).unwrap();
        reg.acquire("data");
        assert!(reg.remove("data").is_err());
        reg.release("data");
        assert!(reg.remove("data").is_ok());
    }

    #[test]
    fn duplicate_volume_create_is_already_exists() {
        let reg = VolumeRegistry::new();
        reg.create("data", 1024, VolumeKind::Filesystem).unwrap();
        let err = reg.create("data", 1024, VolumeKind::Filesystem).unwrap_err();
        assert_eq!(err.kind(), joblet_core::error::ErrorKind::AlreadyExists);
    }
}
