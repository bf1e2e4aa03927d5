// SPDX-License-Identifier: MIT
//! Workflow dispatch (§4.6): ready-set computation and status rollup. The
//! dispatcher is pure state — it does not itself talk to the Job Manager;
//! callers poll `ready_jobs()`, start those jobs, then feed state updates
//! back through `report_state()`.

use crate::expr;
use crate::model::{JobSpec, RequireEntry, Workflow};
use joblet_core::id::WorkflowId;
use joblet_core::job::JobStatus;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "PENDING",
            WorkflowStatus::Running => "RUNNING",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Failed => "FAILED",
            WorkflowStatus::Canceled => "CANCELED",
        };
        write!(f, "{s}")
    }
}

/// Whether every `requires` entry for `spec` currently holds, against the
/// last-known status snapshot.
fn requirement_satisfied(spec: &JobSpec, snapshot: &HashMap<String, JobStatus>) -> bool {
    spec.requires.iter().all(|req| match req {
        RequireEntry::OtherJob { job, status } => snapshot.get(job) == Some(status),
        RequireEntry::Expression { expression } => {
            expr::parse(expression).map(|parsed| expr::eval(&parsed, snapshot)).unwrap_or(false)
        }
    })
}

pub struct Dispatcher {
    pub id: WorkflowId,
    workflow: Workflow,
    states: HashMap<String, JobStatus>,
    started: HashSet<String>,
    canceled: bool,
}

impl Dispatcher {
    pub fn new(id: WorkflowId, workflow: Workflow) -> Self {
        Self {
            id,
            workflow,
            states: HashMap::new(),
            started: HashSet::new(),
            canceled: false,
        }
    }

    /// Jobs that have not yet been started and whose dependency predicate
    /// currently evaluates true (§4.6 "Dispatch").
    pub fn ready_jobs(&self) -> Vec<String> {
        if self.canceled {
            return Vec::new();
        }
        self.workflow
            .jobs
            .iter()
            .filter(|(name, _)| !self.started.contains(*name))
            .filter(|(_, spec)| requirement_satisfied(spec, &self.states))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn job_spec(&self, name: &str) -> Option<&JobSpec> {
        self.workflow.jobs.get(name)
    }

    pub fn mark_started(&mut self, name: &str) {
        self.started.insert(name.to_string());
    }

    /// Record a job's status. Returns `true` if this changed anything —
    /// delivering the same state twice for the same job is a no-op
    /// (§4.6 "tolerate job state arriving out of order ... idempotent").
    pub fn report_state(&mut self, name: &str, status: JobStatus) -> bool {
        if self.states.get(name) == Some(&status) {
            return false;
        }
        self.states.insert(name.to_string(), status);
        true
    }

    /// Cancel the workflow: `ready_jobs` stops offering new work. Callers
    /// are still responsible for canceling each non-terminal started job
    /// through the Job Manager (§4.6 "Canceling a workflow cancels
    /// non-terminal jobs").
    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    pub fn non_terminal_started_jobs(&self) -> Vec<String> {
        self.started
            .iter()
            .filter(|name| !self.states.get(*name).is_some_and(|s| s.is_terminal()))
            .cloned()
            .collect()
    }

    /// Roll up the whole-workflow status (§4.6 "Dispatch").
    ///
    /// A job that can never become ready — its dependency predicate will
    /// never hold because an upstream job already failed or was canceled —
    /// would otherwise block the workflow forever. Decided (see
    /// DESIGN.md): once nothing is running and nothing is ready but some
    /// job is still non-terminal, the workflow is stalled and rolls up to
    /// `FAILED` rather than hanging indefinitely.
    pub fn status(&self) -> WorkflowStatus {
        if self.canceled {
            return WorkflowStatus::Canceled;
        }

        let all_terminal = self
            .workflow
            .jobs
            .keys()
            .all(|name| self.states.get(name).is_some_and(|s| s.is_terminal()));

        if !all_terminal {
            let any_running = !self.non_terminal_started_jobs().is_empty();
            if !any_running && self.ready_jobs().is_empty() {
                return WorkflowStatus::Failed;
            }
            return if self.started.is_empty() { WorkflowStatus::Pending } else { WorkflowStatus::Running };
        }

        let any_bad = self
            .workflow
            .jobs
            .keys()
            .any(|name| matches!(self.states.get(name), Some(JobStatus::Failed) | Some(JobStatus::Canceled)));
        if any_bad {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        }
    }
}
