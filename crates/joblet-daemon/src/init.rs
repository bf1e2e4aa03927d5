// SPDX-License-Identifier: MIT
//! `--job-init` re-exec entry point (§4.3, §4.4 admission steps 5-7).
//!
//! The daemon re-execs itself into this mode inside the freshly forked
//! child (after `setsid`, before any isolation has happened). This process
//! reads its job spec from the path named by `JOBLET_JOB_SPEC_PATH`, then:
//!
//! 1. calls `unshare(2)` for fresh mount/PID/net/UTS/IPC namespaces. That
//!    call only moves processes *forked after it* into the new PID
//!    namespace — this process itself stays in the old one — so it forks
//!    once more immediately after.
//! 2. the parent half of that fork becomes the new PID namespace's init:
//!    it waits for the child and mirrors the child's exit, including
//!    death by signal, as its own.
//! 3. the child half lands at PID 1 of the new namespace and runs the rest
//!    of admission: [`joblet_isolate::isolator::prepare`], the namespace
//!    entry check, unpacking any upload FIFO session into the workspace
//!    (§4.2), and finally `execvp`ing the user's command — at which point
//!    this binary's own code stops running and the job's command takes
//!    over that PID.

use crate::manager::{LaunchSpec, JOB_ID_ENV, JOB_SPEC_PATH_ENV};
use joblet_core::id::JobId;
use joblet_core::platform::Platform;
use joblet_isolate::isolator::{self, IsolatorConfig};
use nix::sys::signal::{raise, signal as set_signal_handler, SigHandler};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::ffi::CString;

#[cfg(target_os = "linux")]
use joblet_isolate::linux::LinuxPlatform;

/// Entered from `main()` when invoked as `jobletd --job-init`. Never
/// returns on success — it execs over itself.
pub fn run() -> ! {
    match try_run() {
        Ok(never) => match never {},
        Err(e) => {
            eprintln!("jobletd --job-init failed: {e}");
            std::process::exit(127);
        }
    }
}

/// Uninhabited: `execvp` never returns on success, so the only way out of
/// this function is `Err`.
enum Never {}

fn try_run() -> Result<Never, String> {
    let job_id = std::env::var(JOB_ID_ENV).map_err(|_| format!("{JOB_ID_ENV} not set"))?;
    let spec_path = std::env::var(JOB_SPEC_PATH_ENV).map_err(|_| format!("{JOB_SPEC_PATH_ENV} not set"))?;
    let spec_bytes = std::fs::read(&spec_path).map_err(|e| format!("reading job spec {spec_path}: {e}"))?;
    let spec: LaunchSpec = serde_json::from_slice(&spec_bytes).map_err(|e| format!("parsing job spec: {e}"))?;

    if spec.job_id != job_id {
        return Err(format!("job spec id {} does not match {JOB_ID_ENV}={job_id}", spec.job_id));
    }

    let config = IsolatorConfig {
        job_id: JobId::new(spec.job_id.clone()),
        root_dir: spec.root_dir.clone(),
        workspace_dir: spec.workspace_dir.clone(),
        runtime_mounts: spec.runtime_mounts.clone(),
        volume_mounts: spec.volume_mounts.clone(),
        env: spec.environment.clone(),
        path_prepend: spec.path_prepend.clone(),
        cgroup_path: spec.cgroup_path.clone(),
        limits: spec.limits.clone(),
        gpu_devices: spec.gpu_devices.clone(),
        workspace_device: spec.workspace_device.clone(),
        builder_mode: spec.builder_mode,
        service_uid: spec.service_uid,
        service_gid: spec.service_gid,
    };

    #[cfg(target_os = "linux")]
    let platform = LinuxPlatform;
    #[cfg(not(target_os = "linux"))]
    let platform = joblet_core::platform::FakePlatform::default();

    platform.unshare_namespaces().map_err(|e| format!("unshare failed: {e}"))?;

    // `unshare(CLONE_NEWPID)` only moves processes forked after this call
    // into the new PID namespace; this process is still in the old one.
    // Fork so the child lands at PID 1 of the fresh namespace, and have
    // this process act as that namespace's init: wait for the child and
    // mirror its exit as our own.
    match unsafe { fork() }.map_err(|e| format!("fork failed: {e}"))? {
        ForkResult::Parent { child } => wait_for_child_and_exit(child),
        ForkResult::Child => run_isolated_child(&platform, &config, &spec),
    }
}

/// The new PID namespace's init process: reap the real job process and
/// exit with the same status, including death by signal.
fn wait_for_child_and_exit(child: Pid) -> ! {
    match waitpid(child, None) {
        Ok(WaitStatus::Exited(_, code)) => std::process::exit(code),
        Ok(WaitStatus::Signaled(_, sig, _)) => {
            // Restore the signal's default disposition and re-raise it
            // against ourselves so our own exit status reflects it too.
            unsafe { set_signal_handler(sig, SigHandler::SigDfl) }.ok();
            raise(sig).ok();
            std::process::exit(128 + sig as i32)
        }
        Ok(_) => std::process::exit(127),
        Err(e) => {
            eprintln!("jobletd --job-init: waitpid failed: {e}");
            std::process::exit(127);
        }
    }
}

/// PID 1 of the fresh namespace: finish admission and exec the job.
fn run_isolated_child(platform: &dyn Platform, config: &IsolatorConfig, spec: &LaunchSpec) -> Result<Never, String> {
    isolator::prepare(platform, config).map_err(|e| format!("isolation setup failed: {e}"))?;

    let proc_entry_count = std::fs::read_dir("/proc").map(|d| d.count()).unwrap_or(0);
    isolator::verify_namespace_entry(platform, &config.job_id, proc_entry_count);

    let fifo_path = spec.workspace_dir.join("upload.fifo");
    joblet_upload::unpack_session(&fifo_path, &spec.workspace_dir).map_err(|e| format!("unpacking upload session failed: {e}"))?;

    exec_command(spec)
}

fn exec_command(spec: &LaunchSpec) -> Result<Never, String> {
    let program = CString::new(spec.command.as_bytes()).map_err(|e| format!("command contains a NUL byte: {e}"))?;
    let mut argv: Vec<CString> = Vec::with_capacity(spec.args.len() + 1);
    argv.push(program.clone());
    for arg in &spec.args {
        argv.push(CString::new(arg.as_bytes()).map_err(|e| format!("argument contains a NUL byte: {e}"))?);
    }

    let mut envp: Vec<CString> = Vec::with_capacity(spec.environment.len());
    for (k, v) in &spec.environment {
        envp.push(CString::new(format!("{k}={v}")).map_err(|e| format!("environment variable contains a NUL byte: {e}"))?);
    }

    nix::unistd::execvpe(&program, &argv, &envp).map_err(|e| format!("execvp({}) failed: {e}", spec.command))?;
    unreachable!("execvpe only returns on error")
}
