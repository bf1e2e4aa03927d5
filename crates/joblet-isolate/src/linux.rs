// SPDX-License-Identifier: MIT
//! Production [`Platform`] backend for Linux, implemented directly on top
//! of `nix`'s namespace, mount, and process primitives. Only compiled on
//! Linux; other targets get [`crate::isolator`] unit-testable via
//! `FakePlatform` but no production isolator.

#![cfg(target_os = "linux")]

use joblet_core::error::JobletError;
use joblet_core::platform::{MountSpec, Platform};
use nix::mount::{mount, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::unistd::{chdir, chroot, sethostname, Gid, Uid};
use std::fs;
use std::path::Path;

fn io_err(identifier: impl Into<String>, message: impl Into<String>, err: nix::Error) -> JobletError {
    JobletError::with_cause(joblet_core::error::ErrorKind::Isolation, identifier, message, std::io::Error::from(err))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxPlatform;

impl LinuxPlatform {
    pub fn new() -> Self {
        Self
    }
}

impl Platform for LinuxPlatform {
    fn create_dir_all(&self, path: &Path) -> Result<(), JobletError> {
        fs::create_dir_all(path)
            .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Filesystem, path.display().to_string(), "create_dir_all", e))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), JobletError> {
        fs::remove_dir_all(path)
            .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Filesystem, path.display().to_string(), "remove_dir_all", e))
    }

    fn bind_mount(&self, spec: &MountSpec) -> Result<(), JobletError> {
        let mut flags = MsFlags::MS_BIND;
        mount(Some(&spec.source), &spec.target, None::<&str>, flags, None::<&str>)
            .map_err(|e| io_err(spec.target.display().to_string(), "bind mount failed", e))?;
        if spec.read_only {
            flags |= MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY;
            mount(None::<&str>, &spec.target, None::<&str>, flags, None::<&str>)
                .map_err(|e| io_err(spec.target.display().to_string(), "read-only remount failed", e))?;
        }
        Ok(())
    }

    fn make_mounts_private(&self) -> Result<(), JobletError> {
        mount(
            None::<&str>,
            "/",
            None::<&str>,
            MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            None::<&str>,
        )
        .map_err(|e| io_err("/", "making mounts recursively private failed", e))
    }

    fn mount_proc(&self, at: &Path) -> Result<(), JobletError> {
        mount(Some("proc"), at, Some("proc"), MsFlags::empty(), None::<&str>)
            .map_err(|e| io_err(at.display().to_string(), "mounting fresh /proc failed", e))
    }

    fn chroot(&self, root: &Path) -> Result<(), JobletError> {
        chroot(root).map_err(|e| io_err(root.display().to_string(), "chroot failed", e))
    }

    fn chdir(&self, dir: &Path) -> Result<(), JobletError> {
        chdir(dir).map_err(|e| io_err(dir.display().to_string(), "chdir failed", e))
    }

    fn unshare_namespaces(&self) -> Result<(), JobletError> {
        unshare(CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWUTS | CloneFlags::CLONE_NEWIPC)
            .map_err(|e| io_err("namespaces", "unshare failed", e))
    }

    fn sethostname(&self, name: &str) -> Result<(), JobletError> {
        sethostname(name).map_err(|e| io_err(name.to_string(), "sethostname failed", e))
    }

    fn write_cgroup_file(&self, cgroup: &Path, file: &str, value: &str) -> Result<(), JobletError> {
        let path = cgroup.join(file);
        fs::write(&path, value)
            .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Isolation, path.display().to_string(), format!("writing '{value}'"), e))
    }

    fn create_cgroup(&self, path: &Path) -> Result<(), JobletError> {
        self.create_dir_all(path)
    }

    fn remove_cgroup(&self, path: &Path) -> Result<(), JobletError> {
        fs::remove_dir(path)
            .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Isolation, path.display().to_string(), "removing cgroup", e))
    }

    fn drop_privileges(&self, uid: u32, gid: u32) -> Result<(), JobletError> {
        nix::unistd::setgid(Gid::from_raw(gid)).map_err(|e| io_err(gid.to_string(), "setgid failed", e))?;
        nix::unistd::setuid(Uid::from_raw(uid)).map_err(|e| io_err(uid.to_string(), "setuid failed", e))?;
        Ok(())
    }

    fn current_pid(&self) -> u32 {
        nix::unistd::getpid().as_raw() as u32
    }
}
