// SPDX-License-Identifier: MIT
//! Job domain type and status state machine (§3).

use crate::error::JobletError;
use crate::id::JobId;
use crate::limits::{GpuRequest, ResourceLimits};
use crate::upload::FileEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Job status enum (§3). Transitions are enforced by [`JobStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Stopped,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped | JobStatus::Canceled
        )
    }

    pub fn is_initial(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Scheduled)
    }

    /// The transition matrix of §3.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            Pending => matches!(to, Running | Failed | Canceled),
            Scheduled => matches!(to, Pending | Canceled),
            Running => matches!(to, Completed | Failed | Stopped),
            Completed | Failed | Stopped | Canceled => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Stopped => "STOPPED",
            JobStatus::Canceled => "CANCELED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = JobletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => JobStatus::Pending,
            "SCHEDULED" => JobStatus::Scheduled,
            "RUNNING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "STOPPED" => JobStatus::Stopped,
            "CANCELED" => JobStatus::Canceled,
            other => return Err(JobletError::validation("status", format!("unknown status '{other}'"))),
        })
    }
}

/// Sentinel exit code for jobs that never actually executed a child (§3).
pub const NO_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    Standard,
    RuntimeBuild,
    Init,
}

/// Parameters for starting a job, the input to `JobManager::start_job`
/// (§4.4). Kept distinct from [`Job`] because most fields here are
/// request-shaped (strings to be resolved/validated) rather than the
/// validated, UUID-bearing record the store holds.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub name: Option<String>,
    pub command: String,
    pub args: Vec<String>,
    pub runtime: String,
    pub environment: HashMap<String, String>,
    pub limits: ResourceLimits,
    pub volumes: Vec<String>,
    pub network: String,
    pub uploads: Vec<FileEntry>,
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: Option<String>,
    pub command: String,
    pub args: Vec<String>,
    pub runtime: String,
    pub environment: HashMap<String, String>,
    pub limits: ResourceLimits,
    pub gpu: GpuRequest,
    pub volumes: Vec<String>,
    pub network: String,
    pub uploads: Vec<FileEntry>,
    pub status: JobStatus,
    pub exit_code: i32,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
    pub scheduled_time_ms: Option<u64>,
    pub pid: Option<u32>,
    pub cgroup_path: Option<PathBuf>,
    pub workspace_dir: Option<PathBuf>,
    pub job_type: JobType,
}

impl Job {
    pub fn new(id: JobId, req: StartRequest, scheduled: bool, now_ms: u64) -> Self {
        let status = if scheduled { JobStatus::Scheduled } else { JobStatus::Pending };
        Self {
            id,
            name: req.name,
            command: req.command,
            args: req.args,
            runtime: req.runtime,
            environment: req.environment,
            limits: req.limits,
            gpu: GpuRequest::none(),
            volumes: req.volumes,
            network: req.network,
            uploads: req.uploads,
            status,
            exit_code: NO_EXIT_CODE,
            start_time_ms: None,
            end_time_ms: None,
            scheduled_time_ms: if scheduled { Some(now_ms) } else { None },
            pid: None,
            cgroup_path: None,
            workspace_dir: None,
            job_type: JobType::Standard,
        }
    }

    /// Attempt a status transition, enforcing the matrix of §3 and the
    /// invariant `Pid > 0 iff Status == RUNNING`.
    pub fn transition(&mut self, to: JobStatus, now_ms: u64) -> Result<(), JobletError> {
        if !self.status.can_transition_to(to) {
            return Err(JobletError::validation(
                self.id.as_str(),
                format!("invalid transition {} -> {to}", self.status),
            ));
        }

        match to {
            JobStatus::Running => {
                self.start_time_ms = Some(now_ms);
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped | JobStatus::Canceled => {
                self.end_time_ms = Some(now_ms);
                self.pid = None;
                self.cgroup_path = None;
            }
            _ => {}
        }
        self.status = to;
        Ok(())
    }

    pub fn set_pid(&mut self, pid: u32) {
        self.pid = Some(pid);
    }

    pub fn set_exit_code(&mut self, code: i32) {
        self.exit_code = code;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
