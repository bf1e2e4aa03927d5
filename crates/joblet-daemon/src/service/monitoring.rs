// SPDX-License-Identifier: MIT
//! `MonitoringService` (§4.8): a single liveness/uptime/job-count probe.

use crate::auth::{self, Operation};
use crate::error_map::to_status;
use crate::manager::JobManager;
use crate::pb::monitoring_service_server::MonitoringService;
use crate::pb::{Empty, HealthResponse};
use joblet_core::clock::Clock;
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};

pub struct MonitoringServiceImpl<C: Clock> {
    manager: Arc<JobManager<C>>,
    started_at: Instant,
}

impl<C: Clock> MonitoringServiceImpl<C> {
    pub fn new(manager: Arc<JobManager<C>>) -> Self {
        Self { manager, started_at: Instant::now() }
    }
}

#[tonic::async_trait]
impl<C: Clock> MonitoringService for MonitoringServiceImpl<C> {
    async fn get_health(&self, request: Request<Empty>) -> Result<Response<HealthResponse>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        Ok(Response::new(HealthResponse {
            ok: true,
            uptime_s: self.started_at.elapsed().as_secs(),
            job_count: self.manager.list_jobs().len() as u32,
        }))
    }
}
