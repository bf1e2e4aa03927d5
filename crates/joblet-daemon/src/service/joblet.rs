// SPDX-License-Identifier: MIT
//! `JobletService` (§4.8): job lifecycle RPCs plus the two streaming
//! endpoints (`StreamJobs`, `GetJobLogs`).

use crate::auth::{self, Operation};
use crate::error_map::to_status;
use crate::manager::JobManager;
use crate::pb::joblet_service_server::JobletService;
use crate::pb::{
    Job, JobEvent, JobIdRequest, JobList, ListJobsRequest, LogChunk, RunJobRequest, RunJobResponse,
    StopJobResponse,
};
use joblet_core::clock::Clock;
use joblet_core::id::JobId;
use joblet_store::subscriber::StreamEvent;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};

/// Bounded capacity for the channels backing the streaming RPCs below; a
/// slow reader applies backpressure to the forwarding task rather than
/// growing memory without limit.
const STREAM_CHANNEL_CAPACITY: usize = 64;

pub struct JobletServiceImpl<C: Clock> {
    manager: Arc<JobManager<C>>,
}

impl<C: Clock> JobletServiceImpl<C> {
    pub fn new(manager: Arc<JobManager<C>>) -> Self {
        Self { manager }
    }
}

#[tonic::async_trait]
impl<C: Clock> JobletService for JobletServiceImpl<C> {
    async fn run_job(&self, request: Request<RunJobRequest>) -> Result<Response<RunJobResponse>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Write).map_err(to_status)?;
        let start_request = request.into_inner().try_into().map_err(to_status)?;
        let job = self.manager.start_job(start_request).await.map_err(to_status)?;
        Ok(Response::new((&job).into()))
    }

    async fn get_job_status(&self, request: Request<JobIdRequest>) -> Result<Response<Job>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        let id = JobId::new(request.into_inner().id);
        let job = self.manager.get_job(&id).map_err(to_status)?;
        Ok(Response::new((&job).into()))
    }

    async fn stop_job(&self, request: Request<JobIdRequest>) -> Result<Response<StopJobResponse>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Write).map_err(to_status)?;
        let id = JobId::new(request.into_inner().id);
        let job = self.manager.stop_job(&id).await.map_err(to_status)?;
        Ok(Response::new((&job).into()))
    }

    async fn list_jobs(&self, request: Request<ListJobsRequest>) -> Result<Response<JobList>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        let jobs = self.manager.list_jobs().iter().map(Job::from).collect();
        Ok(Response::new(JobList { jobs }))
    }

    type StreamJobsStream = Pin<Box<dyn Stream<Item = Result<JobEvent, Status>> + Send + 'static>>;

    /// No dedicated fan-out exists for "every job changed" (§4.8 leaves the
    /// polling cadence unspecified); a short poll over `ListJobs` is simple
    /// and bounded, unlike per-job subscription which would need one
    /// `Store::subscribe` per job the caller doesn't yet know about.
    async fn stream_jobs(
        &self,
        request: Request<ListJobsRequest>,
    ) -> Result<Response<Self::StreamJobsStream>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        let manager = Arc::clone(&self.manager);
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                for job in manager.list_jobs() {
                    let event = JobEvent { job: Some((&job).into()) };
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
            }
        });
        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    type GetJobLogsStream = Pin<Box<dyn Stream<Item = Result<LogChunk, Status>> + Send + 'static>>;

    async fn get_job_logs(
        &self,
        request: Request<JobIdRequest>,
    ) -> Result<Response<Self::GetJobLogsStream>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        let id = JobId::new(request.into_inner().id);
        let mut handle = self.manager.store().subscribe(&id).map_err(to_status)?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(event) = handle.rx.recv().await {
                let chunk = match event {
                    StreamEvent::Log(data) => LogChunk { data },
                    StreamEvent::Status(_) => continue,
                    StreamEvent::Closed => break,
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    break;
                }
            }
        });
        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}
