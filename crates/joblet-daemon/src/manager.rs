// SPDX-License-Identifier: MIT
//! Job Manager (§4.4): admission, isolated launch, output capture, and
//! termination. Mirrors the teacher's event-driven lifecycle shape, but
//! each job is its own short-lived worker set (output pump, exit waiter)
//! rather than events flowing through a single engine loop.

use crate::registry::{NetworkRegistry, RuntimeRegistry, VolumeRegistry};
use joblet_core::clock::Clock;
use joblet_core::error::JobletError;
use joblet_core::id::JobId;
use joblet_core::job::{Job, JobStatus, StartRequest};
use joblet_core::upload::validate_manifest;
use joblet_persist::PersistClient;
use joblet_scheduler::Scheduler;
use joblet_store::Store;
use joblet_upload::{prepare_session, write_session};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Grace period between SIGTERM and SIGKILL on `StopJob` (§4.4).
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Environment variable naming the job spec file passed to a re-exec'd
/// `jobletd --job-init` child (§4.4 admission step 5: "job spec passed via
/// environment" — the spec itself is written to a file inside the job's
/// state directory rather than serialized wholesale into env vars, which
/// would not survive uploads/environment maps of arbitrary size).
pub const JOB_ID_ENV: &str = "JOB_ID";
pub const JOB_SPEC_PATH_ENV: &str = "JOBLET_JOB_SPEC_PATH";

/// Everything the re-exec'd init process needs to isolate and launch the
/// user command (§4.3). Serialized to `jobs/<id>/spec.json`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LaunchSpec {
    pub job_id: String,
    pub command: String,
    pub args: Vec<String>,
    pub environment: HashMap<String, String>,
    pub runtime: String,
    pub volumes: Vec<String>,
    pub limits: joblet_core::limits::ResourceLimits,
    pub root_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub cgroup_path: PathBuf,
    pub runtime_mounts: Vec<joblet_core::platform::MountSpec>,
    pub volume_mounts: Vec<joblet_core::platform::MountSpec>,
    pub path_prepend: Vec<String>,
    pub gpu_devices: Vec<String>,
    pub workspace_device: String,
    pub builder_mode: bool,
    pub service_uid: u32,
    pub service_gid: u32,
}

struct RunningJob {
    pid: u32,
}

/// Everything the manager needs to place a job on disk and in a cgroup
/// before spawning it (§4.4 admission step 3).
pub struct JobManagerConfig {
    pub jobs_dir: PathBuf,
    pub volumes_dir: PathBuf,
    pub cgroup_root: PathBuf,
    pub service_uid: u32,
    pub service_gid: u32,
}

pub struct JobManager<C: Clock> {
    store: Store,
    volumes: Arc<VolumeRegistry>,
    networks: Arc<NetworkRegistry>,
    runtimes: Arc<RuntimeRegistry>,
    scheduler: Arc<Scheduler<C>>,
    persist: Option<Arc<PersistClient<C>>>,
    clock: C,
    config: JobManagerConfig,
    running: Mutex<HashMap<JobId, RunningJob>>,
}

impl<C: Clock> JobManager<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        volumes: Arc<VolumeRegistry>,
        networks: Arc<NetworkRegistry>,
        runtimes: Arc<RuntimeRegistry>,
        scheduler: Arc<Scheduler<C>>,
        persist: Option<Arc<PersistClient<C>>>,
        clock: C,
        config: JobManagerConfig,
    ) -> Arc<Self> {
        Arc::new(Self { store, volumes, networks, runtimes, scheduler, persist, clock, config, running: Mutex::new(HashMap::new()) })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn validate(&self, req: &StartRequest) -> Result<(), JobletError> {
        if req.command.trim().is_empty() {
            return Err(JobletError::validation("command", "command must not be empty"));
        }
        if !self.runtimes.exists(&req.runtime) {
            return Err(JobletError::validation(req.runtime.clone(), "unknown runtime"));
        }
        if !self.networks.exists(&req.network) {
            return Err(JobletError::validation(req.network.clone(), "unknown network"));
        }
        for volume in &req.volumes {
            if !self.volumes.exists(volume) {
                return Err(JobletError::validation(volume.clone(), "unknown volume"));
            }
        }
        validate_manifest(&req.uploads, req.limits.upload_quota_bytes())?;
        if let Some(schedule) = &req.schedule {
            joblet_scheduler::resolve_due_ms(schedule, self.clock.epoch_ms())?;
        }
        Ok(())
    }

    fn job_root(&self, id: &JobId) -> PathBuf {
        self.config.jobs_dir.join(id.as_str()).join("root")
    }

    fn job_workspace(&self, id: &JobId) -> PathBuf {
        self.job_root(id).join("workspace")
    }

    fn job_cgroup(&self, id: &JobId) -> PathBuf {
        self.config.cgroup_root.join(id.as_str())
    }

    /// `StartJob` (§4.4): validate, admit, and either enroll in the
    /// scheduler or launch immediately. Returns as soon as admission
    /// succeeds; execution proceeds asynchronously.
    pub async fn start_job(self: &Arc<Self>, req: StartRequest) -> Result<Job, JobletError> {
        self.validate(&req)?;

        let id = JobId::generate();
        let now_ms = self.clock.epoch_ms();
        let scheduled = req.schedule.is_some();
        let schedule_text = req.schedule.clone();

        let job = Job::new(id.clone(), req, scheduled, now_ms);
        self.store.create_job(job.clone())?;
        if let Some(persist) = &self.persist {
            persist.create(&job);
        }

        for volume in &job.volumes {
            self.volumes.acquire(volume);
        }

        if scheduled {
            let due_ms = joblet_scheduler::resolve_due_ms(
                schedule_text.as_deref().expect("scheduled jobs carry a schedule string"),
                now_ms,
            )?;
            self.scheduler.schedule(id, due_ms).await;
            return Ok(job);
        }

        self.reserve_resources(&id)?;
        let manager = Arc::clone(self);
        let launch_job = job.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.launch(launch_job).await {
                error!(error = %e, "job launch failed");
            }
        });
        Ok(job)
    }

    /// `ExecuteScheduledJob` (§4.4): called by the scheduler's due channel.
    /// Transitions `SCHEDULED -> PENDING -> RUNNING`.
    pub async fn execute_scheduled_job(self: &Arc<Self>, id: JobId) -> Result<(), JobletError> {
        let job = self.store.update_job(&id, |j| j.transition(JobStatus::Pending, self.clock.epoch_ms()))?;
        self.reserve_resources(&id)?;
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = manager.launch(job).await {
                error!(error = %e, "scheduled job launch failed");
            }
        });
        Ok(())
    }

    fn reserve_resources(&self, id: &JobId) -> Result<(), JobletError> {
        let workspace = self.job_workspace(id);
        std::fs::create_dir_all(&workspace)
            .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Filesystem, id.as_str(), "failed to create workspace", e))?;
        let cgroup = self.job_cgroup(id);
        std::fs::create_dir_all(&cgroup)
            .map_err(|e| JobletError::resource_exhausted(id.as_str(), format!("failed to create cgroup: {e}")))?;
        Ok(())
    }

    /// Build the bind-mount list for the job's runtime tree and declared
    /// volumes, relative to the job's fresh root (§4.3 step 2).
    fn resolve_mounts(&self, job: &Job, root_dir: &std::path::Path) -> (Vec<joblet_core::platform::MountSpec>, Vec<joblet_core::platform::MountSpec>, Vec<String>, HashMap<String, String>) {
        use joblet_core::platform::MountSpec;

        let runtime = self.runtimes.get(&job.runtime);
        let (runtime_mounts, path_prepend, runtime_env) = match &runtime {
            Some(rt) => {
                let mounts = rt
                    .mounts
                    .iter()
                    .map(|m| MountSpec {
                        source: m.host_path.clone(),
                        target: join_under_root(root_dir, &m.chroot_path),
                        read_only: !m.writable,
                    })
                    .collect();
                (mounts, rt.path_prepend.clone(), rt.env.iter().cloned().collect())
            }
            None => (Vec::new(), Vec::new(), HashMap::new()),
        };

        let volume_mounts = job
            .volumes
            .iter()
            .map(|name| MountSpec {
                source: self.config.volumes_dir.join(name),
                target: root_dir.join("volumes").join(name),
                read_only: false,
            })
            .collect();

        (runtime_mounts, volume_mounts, path_prepend, runtime_env)
    }

    async fn launch(self: Arc<Self>, job: Job) -> Result<(), JobletError> {
        let id = job.id.clone();
        let spec_path = self.config.jobs_dir.join(id.as_str()).join("spec.json");
        let builder_mode = matches!(job.job_type, joblet_core::job::JobType::RuntimeBuild);
        let root_dir = self.job_root(&id);
        let (runtime_mounts, volume_mounts, path_prepend, runtime_env) = self.resolve_mounts(&job, &root_dir);
        let environment = joblet_isolate::isolator::resolve_environment(&runtime_env, &job.environment, &path_prepend);
        let workspace_device = device_major_minor(&self.config.jobs_dir);

        let launch_spec = LaunchSpec {
            job_id: id.as_str().to_string(),
            command: job.command.clone(),
            args: job.args.clone(),
            environment,
            runtime: job.runtime.clone(),
            volumes: job.volumes.clone(),
            limits: job.limits.clone(),
            root_dir: root_dir.clone(),
            workspace_dir: self.job_workspace(&id),
            cgroup_path: self.job_cgroup(&id),
            runtime_mounts,
            volume_mounts,
            path_prepend,
            gpu_devices: Vec::new(),
            workspace_device,
            builder_mode,
            service_uid: self.config.service_uid,
            service_gid: self.config.service_gid,
        };
        let spec_json = serde_json::to_vec_pretty(&launch_spec)
            .map_err(|e| JobletError::internal(id.as_str(), format!("failed to serialize launch spec: {e}")))?;
        std::fs::write(&spec_path, spec_json)
            .map_err(|e| JobletError::filesystem(id.as_str(), format!("failed to write launch spec: {e}")))?;

        let upload_session = if job.uploads.is_empty() {
            None
        } else {
            Some(prepare_session(id.clone(), job.uploads.clone(), &job.limits, &self.job_workspace(&id))?)
        };

        let exe = std::env::current_exe()
            .map_err(|e| JobletError::internal(id.as_str(), format!("failed to resolve own executable: {e}")))?;

        let mut command = tokio::process::Command::new(exe);
        command
            .arg("--job-init")
            .env(JOB_ID_ENV, id.as_str())
            .env(JOB_SPEC_PATH_ENV, &spec_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // SAFETY: the closure only calls async-signal-safe libc APIs
        // (setsid) between fork and exec, as required by `pre_exec`'s
        // contract.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                self.store.update_job(&id, |j| j.transition(JobStatus::Failed, self.clock.epoch_ms()))?;
                return Err(JobletError::exec(id.as_str(), format!("failed to spawn job process: {e}")));
            }
        };

        let pid = child.id().ok_or_else(|| JobletError::exec(id.as_str(), "child exited before reporting a pid"))?;
        self.running.lock().insert(id.clone(), RunningJob { pid });
        self.store.update_job(&id, |j| {
            j.transition(JobStatus::Running, self.clock.epoch_ms())?;
            j.set_pid(pid);
            Ok(())
        })?;

        if let Some(session) = upload_session {
            let cancel = CancellationToken::new();
            tokio::spawn(async move {
                if let Err(e) = write_session(session, cancel).await {
                    warn!(error = %e, "upload session failed");
                }
            });
        }

        let stdout = child.stdout.take().expect("configured with Stdio::piped");
        let stderr = child.stderr.take().expect("configured with Stdio::piped");
        self.spawn_output_pump(id.clone(), stdout);
        self.spawn_output_pump(id.clone(), stderr);

        let manager = Arc::clone(&self);
        let wait_id = id.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            manager.running.lock().remove(&wait_id);
            let now_ms = manager.clock.epoch_ms();
            let outcome = match status {
                Ok(status) if status.success() => {
                    manager.store.update_job(&wait_id, |j| {
                        j.transition(JobStatus::Completed, now_ms)?;
                        j.set_exit_code(0);
                        Ok(())
                    })
                }
                Ok(status) => {
                    let code = std::os::unix::process::ExitStatusExt::signal(&status)
                        .map(|_| -1)
                        .unwrap_or_else(|| status.code().unwrap_or(-1));
                    manager.store.update_job(&wait_id, |j| {
                        j.transition(JobStatus::Failed, now_ms)?;
                        j.set_exit_code(code);
                        Ok(())
                    })
                }
                Err(e) => {
                    error!(error = %e, job_id = %wait_id, "failed to wait on job process");
                    manager.store.update_job(&wait_id, |j| j.transition(JobStatus::Failed, now_ms))
                }
            };
            if let (Ok(job), Some(persist)) = (outcome, &manager.persist) {
                persist.update(&job);
            }
            if let Ok(job) = manager.store.get_job(&wait_id) {
                for volume in &job.volumes {
                    manager.volumes.release(volume);
                }
            }
            manager.store.prune_closed_subscribers(&wait_id);
        });

        Ok(())
    }

    fn spawn_output_pump(self: &Arc<Self>, id: JobId, reader: impl tokio::io::AsyncRead + Unpin + Send + 'static) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Err(e) = manager.store.append_log(&id, &buf[..n]) {
                            warn!(error = %e, "append_log failed for exited/unknown job");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, job_id = %id, "output pump read error");
                        break;
                    }
                }
            }
        });
    }

    /// `StopJob` (§4.4): SIGTERM, then SIGKILL after the grace period.
    /// Idempotent for jobs already terminal.
    pub async fn stop_job(self: &Arc<Self>, id: &JobId) -> Result<Job, JobletError> {
        let job = self.store.get_job(id)?;
        if job.is_terminal() {
            return Ok(job);
        }
        let pid = self.running.lock().get(id).map(|r| r.pid);
        if let Some(pid) = pid {
            send_signal_to_group(pid, libc::SIGTERM);
            let manager = Arc::clone(self);
            let id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(STOP_GRACE).await;
                if let Some(pid) = manager.running.lock().get(&id).map(|r| r.pid) {
                    send_signal_to_group(pid, libc::SIGKILL);
                }
            });
        }
        self.store.update_job(id, |j| j.transition(JobStatus::Stopped, self.clock.epoch_ms()))
    }

    /// `DeleteJob` (§4.4): requires terminal state; removes workspace,
    /// cgroup, and store entry.
    pub fn delete_job(&self, id: &JobId) -> Result<(), JobletError> {
        let job = self.store.get_job(id)?;
        if !job.is_terminal() {
            return Err(JobletError::validation(id.as_str(), "job must be terminal before it can be deleted"));
        }
        let root = self.job_root(id);
        let _ = std::fs::remove_dir_all(&root);
        let cgroup = self.job_cgroup(id);
        let _ = std::fs::remove_dir(&cgroup);
        self.store.remove_job(id)
    }

    pub fn get_job(&self, id: &JobId) -> Result<Job, JobletError> {
        self.store.get_job(id)
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.store.list_jobs()
    }
}

/// Join an absolute in-container path onto a job's host-side root dir.
fn join_under_root(root_dir: &std::path::Path, chroot_path: &std::path::Path) -> PathBuf {
    match chroot_path.strip_prefix("/") {
        Ok(relative) => root_dir.join(relative),
        Err(_) => root_dir.join(chroot_path),
    }
}

/// Best-effort `major:minor` of the device backing `path`, for the
/// `io.max` cgroup controller (§4.3 step 6). Falls back to `"0:0"` when the
/// platform doesn't expose device numbers or the path doesn't exist yet.
fn device_major_minor(path: &std::path::Path) -> String {
    #[cfg(target_os = "linux")]
    {
        match nix::sys::stat::stat(path) {
            Ok(stat) => format!(
                "{}:{}",
                nix::sys::stat::major(stat.st_dev),
                nix::sys::stat::minor(stat.st_dev)
            ),
            Err(_) => "0:0".to_string(),
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = path;
        "0:0".to_string()
    }
}

fn send_signal_to_group(pid: u32, signal: libc::c_int) {
    // Negative pid targets the whole process group (setsid made the child
    // its own group leader at spawn time).
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pid, signal, error = %err, "failed to signal job process group");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joblet_core::clock::SystemClock;
    use joblet_core::runtime::Runtime;
    use tokio_util::sync::CancellationToken;

    fn manager(dir: &std::path::Path) -> Arc<JobManager<SystemClock>> {
        let runtimes = Arc::new(RuntimeRegistry::new());
        runtimes.register(Runtime {
            tag: "base:latest".into(),
            root_dir: dir.join("runtimes/base"),
            mounts: vec![],
            env: vec![],
            path_prepend: vec![],
        });
        let networks = Arc::new(NetworkRegistry::new());
        let volumes = Arc::new(VolumeRegistry::new());
        let (scheduler, _rx) = Scheduler::spawn(SystemClock, CancellationToken::new());
        JobManager::new(
            Store::new(),
            volumes,
            networks,
            runtimes,
            scheduler,
            None,
            SystemClock,
            JobManagerConfig {
                jobs_dir: dir.join("jobs"),
                volumes_dir: dir.join("volumes"),
                cgroup_root: dir.join("cgroups"),
                service_uid: 1000,
                service_gid: 1000,
            },
        )
    }

    fn req() -> StartRequest {
        StartRequest {
            command: "echo".into(),
            args: vec!["hi".into()],
            runtime: "base:latest".into(),
            network: "bridge".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_job_rejects_unknown_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let mut bad = req();
        bad.runtime = "nope:1".into();
        let err = manager.start_job(bad).await.unwrap_err();
        assert_eq!(err.kind(), joblet_core::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn start_job_rejects_unknown_network() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let mut bad = req();
        bad.network = "nope".into();
        let err = manager.start_job(bad).await.unwrap_err();
        assert_eq!(err.kind(), joblet_core::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn start_job_rejects_schedule_in_the_past() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let mut bad = req();
        bad.schedule = Some("2000-01-01T00:00:00Z".into());
        let err = manager.start_job(bad).await.unwrap_err();
        assert_eq!(err.kind(), joblet_core::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn scheduled_job_is_enrolled_without_launching() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let mut scheduled = req();
        scheduled.schedule = Some("1h".into());
        let job = manager.start_job(scheduled).await.unwrap();
        assert_eq!(job.status, JobStatus::Scheduled);
    }

    #[tokio::test]
    async fn delete_job_rejects_non_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let mut scheduled = req();
        scheduled.schedule = Some("1h".into());
        let job = manager.start_job(scheduled).await.unwrap();
        assert!(manager.delete_job(&job.id).is_err());
    }
}
