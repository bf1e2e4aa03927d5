// SPDX-License-Identifier: MIT
//! The in-memory job store and log bus (§4.1): `CreateJob`, `UpdateJob`,
//! `GetJob`, `ListJobs`, `AppendLog`, `Subscribe`. Guarded by a `RwLock` over
//! the job map plus a per-job `Mutex` around the job record and log ring, so
//! operations on job A never block operations on job B (§5 concurrency).

use crate::ring::{LogRing, DEFAULT_RING_BYTES};
use crate::subscriber::{StreamEvent, Subscriber, SubscriberHandle};
use joblet_core::error::JobletError;
use joblet_core::id::JobId;
use joblet_core::job::Job;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

struct JobRecord {
    job: Mutex<Job>,
    ring: Mutex<LogRing>,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// The shared job table. Cheaply cloneable (`Arc` inside); every
/// coordinator task holds a clone.
#[derive(Clone)]
pub struct Store {
    jobs: Arc<RwLock<HashMap<JobId, Arc<JobRecord>>>>,
    ring_capacity: usize,
}

impl Store {
    pub fn new() -> Self {
        Self::with_ring_capacity(DEFAULT_RING_BYTES)
    }

    pub fn with_ring_capacity(ring_capacity: usize) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            ring_capacity,
        }
    }

    /// Insert a freshly constructed job. Errors with `AlreadyExists` if the
    /// ID is already present — should not happen given `JobId::generate`,
    /// but the sidecar `sync` reconciliation (§4.9) can replay IDs.
    pub fn create_job(&self, job: Job) -> Result<(), JobletError> {
        let id = job.id.clone();
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&id) {
            return Err(JobletError::already_exists(id.as_str()));
        }
        jobs.insert(
            id,
            Arc::new(JobRecord {
                job: Mutex::new(job),
                ring: Mutex::new(LogRing::new(self.ring_capacity)),
                subscribers: Mutex::new(Vec::new()),
            }),
        );
        Ok(())
    }

    pub fn get_job(&self, id: &JobId) -> Result<Job, JobletError> {
        self.record(id).map(|r| r.job.lock().clone())
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.jobs.read().values().map(|r| r.job.lock().clone()).collect()
    }

    fn record(&self, id: &JobId) -> Result<Arc<JobRecord>, JobletError> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| JobletError::not_found(id.as_str()))
    }

    /// Apply `mutate` to the job under its record lock and broadcast its
    /// resulting status to subscribers if it changed.
    pub fn update_job<F>(&self, id: &JobId, mutate: F) -> Result<Job, JobletError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobletError>,
    {
        let record = self.record(id)?;
        let (previous_status, new_status, updated) = {
            let mut job = record.job.lock();
            let previous_status = job.status;
            mutate(&mut job)?;
            (previous_status, job.status, job.clone())
        };

        if new_status != previous_status {
            let subs = record.subscribers.lock();
            for sub in subs.iter() {
                sub.send(StreamEvent::Status(new_status));
            }
            if new_status.is_terminal() {
                for sub in subs.iter() {
                    sub.send(StreamEvent::Closed);
                }
                debug!(job_id = %id, status = %new_status, "job reached terminal state");
            }
        }
        Ok(updated)
    }

    /// Append a chunk of output to a job's log ring and fan it out to
    /// subscribers. Non-blocking: a slow subscriber drops frames instead of
    /// stalling the writer (§4.1, §5).
    pub fn append_log(&self, id: &JobId, chunk: &[u8]) -> Result<(), JobletError> {
        let record = self.record(id)?;
        record.ring.lock().append(chunk);
        for sub in record.subscribers.lock().iter() {
            sub.send(StreamEvent::Log(chunk.to_vec()));
        }
        trace!(job_id = %id, bytes = chunk.len(), "appended log chunk");
        Ok(())
    }

    /// Subscribe to a job's log/status stream. The returned handle first
    /// replays the ring's surviving history as a single `Log` event, then
    /// streams live events — matching §4.1's replay-then-live semantics.
    pub fn subscribe(&self, id: &JobId) -> Result<SubscriberHandle, JobletError> {
        let record = self.record(id)?;

        let (sub, handle) = Subscriber::new();
        let backlog = record.ring.lock().snapshot();
        if !backlog.is_empty() {
            sub.send(StreamEvent::Log(backlog));
        }
        if record.job.lock().is_terminal() {
            sub.send(StreamEvent::Closed);
        } else {
            record.subscribers.lock().push(sub);
        }
        Ok(handle)
    }

    /// Drop closed subscriber handles so terminal jobs' subscriber lists
    /// don't grow unboundedly across long uptimes.
    pub fn prune_closed_subscribers(&self, id: &JobId) {
        if let Ok(record) = self.record(id) {
            record.subscribers.lock().retain(|s| !s.is_closed());
        }
    }

    /// Remove a job's record entirely. Requires terminal state (§4.4
    /// `DeleteJob`'s contract); callers are responsible for releasing the
    /// job's workspace and cgroup before or after this call.
    pub fn remove_job(&self, id: &JobId) -> Result<(), JobletError> {
        let record = self.record(id)?;
        if !record.job.lock().is_terminal() {
            return Err(JobletError::validation(id.as_str(), "cannot delete a job that has not reached a terminal state"));
        }
        self.jobs.write().remove(id);
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
