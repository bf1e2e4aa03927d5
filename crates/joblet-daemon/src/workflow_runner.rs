// SPDX-License-Identifier: MIT
//! Workflow coordination (§4.6): ties a [`Dispatcher`] to the [`JobManager`].
//!
//! The dispatcher itself is pure state with no I/O or task of its own; this
//! module is the thing that actually drives it. Rather than wire every Job
//! Manager transition into an event bus, each running workflow is polled on
//! a fixed interval: simpler to reason about than a fully event-driven
//! design, at the cost of up to one poll interval of added dispatch
//! latency. Noted as a deliberate simplification in the design ledger.

use crate::manager::JobManager;
use crate::registry::{RuntimeRegistry, VolumeRegistry};
use joblet_core::clock::Clock;
use joblet_core::error::JobletError;
use joblet_core::id::WorkflowId;
use joblet_core::job::StartRequest;
use joblet_workflow::dispatcher::{Dispatcher, WorkflowStatus};
use joblet_workflow::model::{Workflow, WorkflowIdGenerator};
use joblet_workflow::validate_workflow;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How often each active workflow is polled for newly ready jobs and state
/// changes (§4.6 leaves the cadence unspecified).
const POLL_INTERVAL: Duration = Duration::from_millis(500);

struct ActiveWorkflow {
    dispatcher: Mutex<Dispatcher>,
    /// workflow-local job name -> allocated `JobId`, so state reported
    /// back from the store can be matched to a dispatcher entry.
    job_ids: Mutex<HashMap<String, String>>,
}

pub struct WorkflowCoordinator<C: Clock> {
    manager: Arc<JobManager<C>>,
    ids: WorkflowIdGenerator,
    workflows: Mutex<HashMap<WorkflowId, Arc<ActiveWorkflow>>>,
}

impl<C: Clock> WorkflowCoordinator<C> {
    pub fn new(manager: Arc<JobManager<C>>) -> Arc<Self> {
        Arc::new(Self { manager, ids: WorkflowIdGenerator::new(), workflows: Mutex::new(HashMap::new()) })
    }

    pub fn submit(&self, workflow: Workflow) -> WorkflowId {
        let id = self.ids.next();
        let active = Arc::new(ActiveWorkflow {
            dispatcher: Mutex::new(Dispatcher::new(id.clone(), workflow)),
            job_ids: Mutex::new(HashMap::new()),
        });
        self.workflows.lock().insert(id.clone(), active);
        id
    }

    pub fn status(&self, id: &WorkflowId) -> Option<WorkflowStatus> {
        self.workflows.lock().get(id).map(|w| w.dispatcher.lock().status())
    }

    pub fn cancel(&self, id: &WorkflowId) {
        if let Some(active) = self.workflows.lock().get(id) {
            active.dispatcher.lock().cancel();
        }
    }

    /// Spawn the poll loop. One task drives every active workflow; a
    /// per-workflow task would just multiply idle wakeups for no benefit
    /// at the scale workflows run at (§4.6 Non-goals: no large fan-out).
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = cancel.cancelled() => return,
                }
                coordinator.tick().await;
            }
        });
    }

    async fn tick(self: &Arc<Self>) {
        let active_workflows: Vec<(WorkflowId, Arc<ActiveWorkflow>)> =
            self.workflows.lock().iter().map(|(id, w)| (id.clone(), Arc::clone(w))).collect();

        for (workflow_id, active) in active_workflows {
            self.sync_states(&active).await;
            self.dispatch_ready(&workflow_id, &active).await;
        }
    }

    async fn sync_states(&self, active: &ActiveWorkflow) {
        let job_ids = active.job_ids.lock().clone();
        for (name, job_id) in job_ids {
            let id = joblet_core::id::JobId::new(job_id);
            if let Ok(job) = self.manager.get_job(&id) {
                active.dispatcher.lock().report_state(&name, job.status);
            }
        }
    }

    async fn dispatch_ready(&self, workflow_id: &WorkflowId, active: &ActiveWorkflow) {
        let ready = active.dispatcher.lock().ready_jobs();
        for name in ready {
            let spec = match active.dispatcher.lock().job_spec(&name) {
                Some(spec) => spec.clone(),
                None => continue,
            };

            let request = StartRequest {
                name: Some(format!("{workflow_id}/{name}")),
                command: spec.command,
                args: spec.args,
                runtime: spec.runtime,
                environment: spec.environment,
                limits: spec.resources,
                volumes: spec.volumes,
                network: spec.network,
                uploads: spec.uploads,
                schedule: None,
            };

            match self.manager.start_job(request).await {
                Ok(job) => {
                    active.job_ids.lock().insert(name.clone(), job.id.as_str().to_string());
                    active.dispatcher.lock().mark_started(&name);
                    debug!(workflow_id = %workflow_id, job = %name, job_id = %job.id, "workflow job started");
                }
                Err(e) => {
                    warn!(workflow_id = %workflow_id, job = %name, error = %e, "failed to start workflow job");
                }
            }
        }

        if matches!(active.dispatcher.lock().status(), WorkflowStatus::Failed) {
            self.cancel_non_terminal(active).await;
        }
    }

    async fn cancel_non_terminal(&self, active: &ActiveWorkflow) {
        let non_terminal = active.dispatcher.lock().non_terminal_started_jobs();
        let job_ids = active.job_ids.lock().clone();
        for name in non_terminal {
            if let Some(job_id) = job_ids.get(&name) {
                let id = joblet_core::id::JobId::new(job_id.clone());
                if let Err(e) = self.manager.stop_job(&id).await {
                    warn!(job_id = %id, error = %e, "failed to stop job for stalled workflow");
                }
            }
        }
    }
}

/// Validate a workflow against the daemon's known runtimes/volumes before
/// it is accepted (§4.6 "Validation"), catching unknown references and
/// dependency cycles up front rather than mid-run.
pub fn validate_submission(workflow: &Workflow, runtimes: &RuntimeRegistry, volumes: &VolumeRegistry) -> Result<(), JobletError> {
    let known_runtimes: HashSet<String> = runtimes.list().into_iter().map(|r| r.tag).collect();
    let known_volumes: HashSet<String> = volumes.list().into_iter().map(|v| v.name).collect();
    validate_workflow(workflow, &known_volumes, &known_runtimes)
}
