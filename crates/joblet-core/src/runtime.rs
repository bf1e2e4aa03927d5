// SPDX-License-Identifier: MIT
//! Runtime domain type (§3): a `name:version` tag naming a read-only
//! directory tree mounted into a job's chroot per a declarative mount
//! list and environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single host-path → chroot-path bind mount, read-only unless `writable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeMount {
    pub host_path: PathBuf,
    pub chroot_path: PathBuf,
    pub writable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runtime {
    /// `name:version`, e.g. `python:3.12`.
    pub tag: String,
    /// Root of the pre-built toolchain tree on the host.
    pub root_dir: PathBuf,
    pub mounts: Vec<RuntimeMount>,
    pub env: Vec<(String, String)>,
    pub path_prepend: Vec<String>,
}

impl Runtime {
    pub fn parse_tag(tag: &str) -> Option<(&str, &str)> {
        tag.split_once(':')
    }
}
