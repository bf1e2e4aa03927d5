// SPDX-License-Identifier: MIT
//! Isolator orchestration (§4.3): the idempotent sequence a forked child
//! runs before `exec`ing the user command. Every syscall goes through the
//! [`Platform`] facade so this module is unit-testable with
//! [`joblet_core::platform::FakePlatform`].

use crate::cgroup;
use joblet_core::error::JobletError;
use joblet_core::id::JobId;
use joblet_core::limits::ResourceLimits;
use joblet_core::platform::{MountSpec, Platform};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Above this many entries under `/proc`, log a warning (§4.3
/// "Verification" — informational only, never fatal).
const PROC_ENTRY_WARN_THRESHOLD: usize = 100;

#[derive(Debug, Clone)]
pub struct IsolatorConfig {
    pub job_id: JobId,
    /// Deterministic per-job root, materialized before chroot.
    pub root_dir: PathBuf,
    /// Workspace directory *inside* the new root, `chdir`'d into after
    /// chroot.
    pub workspace_dir: PathBuf,
    pub runtime_mounts: Vec<MountSpec>,
    pub volume_mounts: Vec<MountSpec>,
    pub env: HashMap<String, String>,
    pub path_prepend: Vec<String>,
    pub cgroup_path: PathBuf,
    pub limits: ResourceLimits,
    /// GPU device nodes as resolved `major:minor` pairs, when GPUs are
    /// requested (discovery happens outside this crate).
    pub gpu_devices: Vec<String>,
    /// The block device backing the workspace, as `major:minor`, used for
    /// `io.max` (§4.3 step 6).
    pub workspace_device: String,
    /// Runtime-build jobs get the permissive variant (§4.3 "Builder-mode
    /// variant"): writable `/tmp`, network left up, no privilege drop.
    pub builder_mode: bool,
    pub service_uid: u32,
    pub service_gid: u32,
}

/// Run isolator steps 1-7 of §4.3. Step 8 (`exec`) is the caller's
/// responsibility since it replaces the process image. The "fresh PID,
/// mount, network, UTS, and IPC namespaces" precondition these steps
/// assume is established by the caller before `prepare` is invoked
/// (`unshare(2)` followed by the `fork` that lands this process at PID 1
/// of the new PID namespace), not by `prepare` itself — see
/// `joblet-daemon`'s `init.rs`.
pub fn prepare(platform: &dyn Platform, config: &IsolatorConfig) -> Result<(), JobletError> {
    // Step 1: recursively private mounts.
    platform.make_mounts_private()?;

    // Step 2: materialize the per-job root.
    platform.create_dir_all(&config.root_dir)?;
    for spec in config.runtime_mounts.iter().chain(config.volume_mounts.iter()) {
        platform.create_dir_all(&spec.target)?;
        platform.bind_mount(spec)?;
    }
    if config.builder_mode {
        let tmp = config.root_dir.join("tmp");
        platform.create_dir_all(&tmp)?;
    }

    // Step 3: environment/PATH resolution is pure data, applied by the
    // caller when spawning the child's `exec`; see `resolve_environment`.

    // Step 4: chroot + chdir.
    platform.chroot(&config.root_dir)?;
    platform.chdir(&config.workspace_dir)?;

    // Step 5: fresh /proc.
    platform
        .mount_proc(&PathBuf::from("/proc"))
        .map_err(|e| JobletError::isolation(config.job_id.as_str(), format!("proc remount failed: {e}")))?;

    // Step 6: cgroups v2 controllers.
    apply_cgroups(platform, config)?;

    // Step 7: drop privileges unless this is a builder job.
    if !config.builder_mode {
        platform.drop_privileges(config.service_uid, config.service_gid)?;
    }

    info!(job_id = %config.job_id, "isolator steps complete, ready to exec");
    Ok(())
}

fn apply_cgroups(platform: &dyn Platform, config: &IsolatorConfig) -> Result<(), JobletError> {
    platform.create_cgroup(&config.cgroup_path)?;
    // Join the cgroup before writing any controller limit: a process is
    // only constrained once its own PID is in `cgroup.procs`. Children
    // forked from this process (the real command, after the PID-1 fork
    // in `init.rs`) inherit membership automatically.
    platform.write_cgroup_file(&config.cgroup_path, "cgroup.procs", &std::process::id().to_string())?;

    if let Some(value) = cgroup::cpu_max_value(&config.limits) {
        platform.write_cgroup_file(&config.cgroup_path, "cpu.max", &value)?;
    }
    if let Some(value) = cgroup::cpuset_cpus_value(&config.limits) {
        platform.write_cgroup_file(&config.cgroup_path, "cpuset.cpus", &value)?;
    }
    if let Some(value) = cgroup::memory_max_value(&config.limits) {
        platform.write_cgroup_file(&config.cgroup_path, "memory.max", &value)?;
    }
    if let Some(value) = cgroup::io_max_value(&config.limits, &config.workspace_device) {
        platform.write_cgroup_file(&config.cgroup_path, "io.max", &value)?;
    }
    if let Some(values) = cgroup::device_allow_values(&config.limits, &config.gpu_devices) {
        for value in values {
            platform.write_cgroup_file(&config.cgroup_path, "devices.allow", &value)?;
        }
    }
    Ok(())
}

/// Resolve the final environment map: runtime env merged with the job's
/// own environment (job wins on conflict), and `PATH` prepended per the
/// runtime's declared prepend list (§4.3 step 3).
pub fn resolve_environment(
    runtime_env: &HashMap<String, String>,
    job_env: &HashMap<String, String>,
    path_prepend: &[String],
) -> HashMap<String, String> {
    let mut env = runtime_env.clone();
    env.extend(job_env.clone());
    if !path_prepend.is_empty() {
        let existing = env.get("PATH").cloned().unwrap_or_default();
        let mut parts = path_prepend.to_vec();
        if !existing.is_empty() {
            parts.push(existing);
        }
        env.insert("PATH".to_string(), parts.join(":"));
    }
    env
}

/// §4.3 "Verification": after namespace entry, warn (never fail) if the
/// child doesn't see itself at PID 1, or if `/proc` holds an unexpectedly
/// large number of entries.
pub fn verify_namespace_entry(platform: &dyn Platform, job_id: &JobId, proc_entry_count: usize) {
    if platform.current_pid() != 1 {
        warn!(job_id = %job_id, pid = platform.current_pid(), "process did not land at PID 1 of its namespace");
    }
    if proc_entry_count > PROC_ENTRY_WARN_THRESHOLD {
        warn!(job_id = %job_id, count = proc_entry_count, "unexpectedly many /proc entries after namespace entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joblet_core::platform::FakePlatform;

    fn config() -> IsolatorConfig {
        IsolatorConfig {
            job_id: JobId::generate(),
            root_dir: PathBuf::from("/var/lib/joblet/jobs/x/root"),
            workspace_dir: PathBuf::from("/workspace"),
            runtime_mounts: vec![MountSpec {
                source: PathBuf::from("/var/lib/joblet/runtimes/base"),
                target: PathBuf::from("/var/lib/joblet/jobs/x/root/runtime"),
                read_only: true,
            }],
            volume_mounts: vec![],
            env: HashMap::new(),
            path_prepend: vec![],
            cgroup_path: PathBuf::from("/sys/fs/cgroup/joblet/x"),
            limits: ResourceLimits { max_cpu_percent: 100, max_memory_mb: 512, ..Default::default() },
            gpu_devices: vec![],
            workspace_device: "253:0".to_string(),
            builder_mode: false,
            service_uid: 1000,
            service_gid: 1000,
        }
    }

    #[test]
    fn happy_path_runs_steps_in_order() {
        let platform = FakePlatform::new();
        let config = config();
        prepare(&platform, &config).unwrap();

        let calls = platform.calls();
        use joblet_core::platform::FakeCall::*;
        let positions: Vec<_> = calls
            .iter()
            .enumerate()
            .map(|(i, c)| (i, std::mem::discriminant(c)))
            .collect();
        let idx = |needle: &joblet_core::platform::FakeCall| {
            positions
                .iter()
                .find(|(_, d)| *d == std::mem::discriminant(needle))
                .map(|(i, _)| *i)
                .unwrap()
        };
        assert!(idx(&MakeMountsPrivate) < idx(&Chroot(PathBuf::new())));
        assert!(idx(&Chroot(PathBuf::new())) < idx(&MountProc(PathBuf::new())));
        assert!(idx(&MountProc(PathBuf::new())) < idx(&CreateCgroup(PathBuf::new())));
        assert!(idx(&CreateCgroup(PathBuf::new())) < idx(&DropPrivileges { uid: 0, gid: 0 }));
    }

    #[test]
    fn builder_mode_skips_privilege_drop() {
        let platform = FakePlatform::new();
        let mut config = config();
        config.builder_mode = true;
        prepare(&platform, &config).unwrap();
        assert!(!platform
            .calls()
            .iter()
            .any(|c| matches!(c, joblet_core::platform::FakeCall::DropPrivileges { .. })));
    }

    #[test]
    fn chroot_failure_propagates() {
        let platform = FakePlatform { fail_chroot: true, ..Default::default() };
        assert!(prepare(&platform, &config()).is_err());
    }

    #[test]
    fn cgroup_write_failure_propagates() {
        let platform = FakePlatform { fail_cgroup_write: true, ..Default::default() };
        assert!(prepare(&platform, &config()).is_err());
    }

    #[test]
    fn joins_cgroup_procs_before_writing_any_controller_limit() {
        let platform = FakePlatform::new();
        let config = config();
        prepare(&platform, &config).unwrap();

        let calls = platform.calls();
        use joblet_core::platform::FakeCall::WriteCgroupFile;
        let procs_write = calls
            .iter()
            .position(|c| matches!(c, WriteCgroupFile { file, .. } if file == "cgroup.procs"))
            .expect("cgroup.procs must be written");
        let pid = std::process::id().to_string();
        assert!(matches!(&calls[procs_write], WriteCgroupFile { value, .. } if *value == pid));

        let cpu_max_write = calls
            .iter()
            .position(|c| matches!(c, WriteCgroupFile { file, .. } if file == "cpu.max"))
            .expect("cpu.max must be written");
        assert!(procs_write < cpu_max_write, "the process must join the cgroup before any limit is applied");
    }

    #[test]
    fn resolve_environment_prepends_path_and_job_env_wins() {
        let mut runtime_env = HashMap::new();
        runtime_env.insert("PATH".to_string(), "/usr/bin".to_string());
        runtime_env.insert("LANG".to_string(), "C".to_string());
        let mut job_env = HashMap::new();
        job_env.insert("LANG".to_string(), "en_US.UTF-8".to_string());

        let resolved = resolve_environment(&runtime_env, &job_env, &["/runtime/bin".to_string()]);
        assert_eq!(resolved.get("LANG"), Some(&"en_US.UTF-8".to_string()));
        assert_eq!(resolved.get("PATH"), Some(&"/runtime/bin:/usr/bin".to_string()));
    }
}
