// SPDX-License-Identifier: MIT
//! Daemon configuration (§6): YAML with top-level `server`, `logging`,
//! `security`, `persist`, `state`, loaded from a fixed path and backed by
//! an exclusive lock file so only one `jobletd` instance runs against a
//! given base directory at a time.

use fs2::FileExt;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_yaml::Error },
    #[error("another jobletd instance is already running against {0}")]
    LockFailed(PathBuf),
    #[error("failed to create base directory {path}: {source}")]
    CreateDir { path: PathBuf, #[source] source: std::io::Error },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub server_cert_pem: String,
    pub server_key_pem: String,
    pub ca_cert_pem: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistConfig {
    pub socket_path: PathBuf,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_log_ring_bytes")]
    pub log_ring_bytes: usize,
    #[serde(default = "default_network")]
    pub default_network: String,
    /// Parent cgroup under the real cgroup v2 hierarchy that each job's own
    /// cgroup is created beneath (§4.3 step 6). Must live under the
    /// kernel's cgroupfs mount (typically `/sys/fs/cgroup`), not under
    /// `base_dir` — `cgroup.procs`/`cpu.max`/etc. are only meaningful to
    /// the kernel at their real path.
    #[serde(default = "default_cgroup_parent")]
    pub cgroup_parent: PathBuf,
}

fn default_log_ring_bytes() -> usize {
    1024 * 1024
}

fn default_network() -> String {
    "bridge".to_string()
}

fn default_cgroup_parent() -> PathBuf {
    PathBuf::from("/sys/fs/cgroup/joblet")
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub persist: PersistConfig,
    #[serde(default = "StateConfig::default_values")]
    pub state: StateConfig,
}

impl StateConfig {
    fn default_values() -> Self {
        Self {
            log_ring_bytes: default_log_ring_bytes(),
            default_network: default_network(),
            cgroup_parent: default_cgroup_parent(),
        }
    }
}

impl Config {
    /// Load and parse the YAML config at `path` (§6's config shape).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read { path: path.to_path_buf(), source: e })?;
        let config: Config =
            serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: e })?;
        Ok(config)
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.server.base_dir.join("jobs")
    }

    pub fn runtimes_dir(&self) -> PathBuf {
        self.server.base_dir.join("runtimes")
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.server.base_dir.join("volumes")
    }

    pub fn run_dir(&self) -> PathBuf {
        self.server.base_dir.join("run")
    }

    /// Parent directory under the real cgroup v2 hierarchy that per-job
    /// cgroups are created beneath (§4.3 step 6). Unlike `jobs_dir`/
    /// `run_dir`/etc. this is deliberately *not* rooted under `base_dir`:
    /// it must resolve to a path the kernel's cgroupfs actually mounts.
    pub fn cgroup_root(&self) -> PathBuf {
        self.state.cgroup_parent.clone()
    }

    fn lock_path(&self) -> PathBuf {
        self.run_dir().join("jobletd.lock")
    }

    /// Create the persistent filesystem layout of §6 and take the
    /// exclusive lock guarding a single instance per base directory.
    pub fn acquire_lock(&self) -> Result<File, ConfigError> {
        for dir in [self.jobs_dir(), self.runtimes_dir(), self.volumes_dir(), self.run_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir { path: dir, source: e })?;
        }
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).map_err(|e| ConfigError::CreateDir { path: lock_path.clone(), source: e })?;
        file.try_lock_exclusive().map_err(|_| ConfigError::LockFailed(lock_path))?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml(base_dir: &Path) -> String {
        format!(
            r#"
server:
  listen_addr: "127.0.0.1:50051"
  base_dir: "{}"
logging:
  level: "debug"
  file: "{}/logs/jobletd.log"
security:
  server_cert_pem: "cert"
  server_key_pem: "key"
  ca_cert_pem: "ca"
persist:
  socket_path: "{}/run/persist.sock"
"#,
            base_dir.display(),
            base_dir.display(),
            base_dir.display(),
        )
    }

    #[test]
    fn loads_config_with_defaulted_state_section() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("joblet-config.yml");
        std::fs::write(&config_path, sample_yaml(dir.path())).unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:50051");
        assert_eq!(config.state.log_ring_bytes, 1024 * 1024);
        assert_eq!(config.state.default_network, "bridge");
        assert_eq!(config.state.cgroup_parent, PathBuf::from("/sys/fs/cgroup/joblet"));
        assert_eq!(config.persist.write_timeout_ms, 5_000);
    }

    #[test]
    fn second_lock_attempt_on_same_base_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("joblet-config.yml");
        std::fs::write(&config_path, sample_yaml(dir.path())).unwrap();
        let config = Config::load(&config_path).unwrap();

        let _first = config.acquire_lock().unwrap();
        assert!(config.acquire_lock().is_err());
    }
}
