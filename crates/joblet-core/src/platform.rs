// SPDX-License-Identifier: MIT
//! Platform facade (§2.1, §9): abstracts filesystem, process, mount, and
//! syscall operations behind a minimal interface so the isolator can be
//! unit tested on non-Linux CI with [`FakePlatform`]. The real
//! implementation (`joblet-isolate::linux::LinuxPlatform`) targets Linux
//! only and is free to assume cgroups v2.

use crate::error::JobletError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A single bind mount to perform while materializing a job's chroot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSpec {
    pub source: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
}

/// Narrow interface over the OS primitives the isolator needs: mount,
/// chroot, namespace entry, cgroup file writes, and directory setup.
///
/// Every method is synchronous and expected to run inside the forked child
/// before `exec` — the trait exists for *testability*, not async dispatch.
pub trait Platform: Send + Sync + 'static {
    fn create_dir_all(&self, path: &Path) -> Result<(), JobletError>;
    fn remove_dir_all(&self, path: &Path) -> Result<(), JobletError>;
    fn bind_mount(&self, spec: &MountSpec) -> Result<(), JobletError>;
    fn make_mounts_private(&self) -> Result<(), JobletError>;
    fn mount_proc(&self, at: &Path) -> Result<(), JobletError>;
    fn chroot(&self, root: &Path) -> Result<(), JobletError>;
    fn chdir(&self, dir: &Path) -> Result<(), JobletError>;
    fn unshare_namespaces(&self) -> Result<(), JobletError>;
    fn sethostname(&self, name: &str) -> Result<(), JobletError>;
    fn write_cgroup_file(&self, cgroup: &Path, file: &str, value: &str) -> Result<(), JobletError>;
    fn create_cgroup(&self, path: &Path) -> Result<(), JobletError>;
    fn remove_cgroup(&self, path: &Path) -> Result<(), JobletError>;
    fn drop_privileges(&self, uid: u32, gid: u32) -> Result<(), JobletError>;
    fn current_pid(&self) -> u32;
}

/// A call recorded by [`FakePlatform`] for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    CreateDirAll(PathBuf),
    RemoveDirAll(PathBuf),
    BindMount { source: PathBuf, target: PathBuf, read_only: bool },
    MakeMountsPrivate,
    MountProc(PathBuf),
    Chroot(PathBuf),
    Chdir(PathBuf),
    UnshareNamespaces,
    SetHostname(String),
    WriteCgroupFile { cgroup: PathBuf, file: String, value: String },
    CreateCgroup(PathBuf),
    RemoveCgroup(PathBuf),
    DropPrivileges { uid: u32, gid: u32 },
}

/// An in-memory fake of [`Platform`] for unit tests: records every call and
/// never touches the real filesystem or kernel.
#[derive(Debug, Clone, Default)]
pub struct FakePlatform {
    calls: Arc<Mutex<Vec<FakeCall>>>,
    pub fail_chroot: bool,
    pub fail_cgroup_write: bool,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: FakeCall) {
        self.calls.lock().push(call);
    }
}

impl Platform for FakePlatform {
    fn create_dir_all(&self, path: &Path) -> Result<(), JobletError> {
        self.record(FakeCall::CreateDirAll(path.to_path_buf()));
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), JobletError> {
        self.record(FakeCall::RemoveDirAll(path.to_path_buf()));
        Ok(())
    }

    fn bind_mount(&self, spec: &MountSpec) -> Result<(), JobletError> {
        self.record(FakeCall::BindMount {
            source: spec.source.clone(),
            target: spec.target.clone(),
            read_only: spec.read_only,
        });
        Ok(())
    }

    fn make_mounts_private(&self) -> Result<(), JobletError> {
        self.record(FakeCall::MakeMountsPrivate);
        Ok(())
    }

    fn mount_proc(&self, at: &Path) -> Result<(), JobletError> {
        self.record(FakeCall::MountProc(at.to_path_buf()));
        Ok(())
    }

    fn chroot(&self, root: &Path) -> Result<(), JobletError> {
        self.record(FakeCall::Chroot(root.to_path_buf()));
        if self.fail_chroot {
            return Err(JobletError::isolation(root.display().to_string(), "fake chroot failure"));
        }
        Ok(())
    }

    fn chdir(&self, dir: &Path) -> Result<(), JobletError> {
        self.record(FakeCall::Chdir(dir.to_path_buf()));
        Ok(())
    }

    fn unshare_namespaces(&self) -> Result<(), JobletError> {
        self.record(FakeCall::UnshareNamespaces);
        Ok(())
    }

    fn sethostname(&self, name: &str) -> Result<(), JobletError> {
        self.record(FakeCall::SetHostname(name.to_string()));
        Ok(())
    }

    fn write_cgroup_file(&self, cgroup: &Path, file: &str, value: &str) -> Result<(), JobletError> {
        self.record(FakeCall::WriteCgroupFile {
            cgroup: cgroup.to_path_buf(),
            file: file.to_string(),
            value: value.to_string(),
        });
        if self.fail_cgroup_write {
            return Err(JobletError::isolation(cgroup.display().to_string(), "fake cgroup write failure"));
        }
        Ok(())
    }

    fn create_cgroup(&self, path: &Path) -> Result<(), JobletError> {
        self.record(FakeCall::CreateCgroup(path.to_path_buf()));
        Ok(())
    }

    fn remove_cgroup(&self, path: &Path) -> Result<(), JobletError> {
        self.record(FakeCall::RemoveCgroup(path.to_path_buf()));
        Ok(())
    }

    fn drop_privileges(&self, uid: u32, gid: u32) -> Result<(), JobletError> {
        self.record(FakeCall::DropPrivileges { uid, gid });
        Ok(())
    }

    fn current_pid(&self) -> u32 {
        1
    }
}
