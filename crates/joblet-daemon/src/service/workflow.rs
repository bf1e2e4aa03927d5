// SPDX-License-Identifier: MIT
//! `WorkflowService` (§4.6, §8 scenario 5): submit, poll, and cancel
//! YAML-defined job DAGs. Not enumerated in spec.md §6's prose list of
//! RPCs, but named directly by its `RunWorkflow` scenario — the proto is
//! the authoritative surface (see DESIGN.md).

use crate::auth::{self, Operation};
use crate::error_map::to_status;
use crate::pb::workflow_service_server::WorkflowService;
use crate::pb::{Empty, RunWorkflowRequest, RunWorkflowResponse, WorkflowIdRequest, WorkflowStatusResponse};
use crate::registry::{RuntimeRegistry, VolumeRegistry};
use crate::workflow_runner::{validate_submission, WorkflowCoordinator};
use joblet_core::clock::Clock;
use joblet_core::error::JobletError;
use joblet_core::id::WorkflowId;
use joblet_workflow::model::parse_workflow_yaml;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct WorkflowServiceImpl<C: Clock> {
    coordinator: Arc<WorkflowCoordinator<C>>,
    runtimes: Arc<RuntimeRegistry>,
    volumes: Arc<VolumeRegistry>,
}

impl<C: Clock> WorkflowServiceImpl<C> {
    pub fn new(coordinator: Arc<WorkflowCoordinator<C>>, runtimes: Arc<RuntimeRegistry>, volumes: Arc<VolumeRegistry>) -> Self {
        Self { coordinator, runtimes, volumes }
    }
}

#[tonic::async_trait]
impl<C: Clock> WorkflowService for WorkflowServiceImpl<C> {
    async fn run_workflow(&self, request: Request<RunWorkflowRequest>) -> Result<Response<RunWorkflowResponse>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Write).map_err(to_status)?;
        let yaml = request.into_inner().yaml;
        let workflow = parse_workflow_yaml(&yaml).map_err(to_status)?;
        validate_submission(&workflow, &self.runtimes, &self.volumes).map_err(to_status)?;

        let id = self.coordinator.submit(workflow);
        let status = self.coordinator.status(&id).ok_or_else(|| JobletError::internal(id.as_str(), "workflow vanished immediately after submission")).map_err(to_status)?;
        Ok(Response::new(RunWorkflowResponse { id: id.as_str().to_string(), status: status.to_string() }))
    }

    async fn get_workflow_status(&self, request: Request<WorkflowIdRequest>) -> Result<Response<WorkflowStatusResponse>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        let id = WorkflowId::new(request.into_inner().id);
        let status = self.coordinator.status(&id).ok_or_else(|| JobletError::not_found(id.as_str())).map_err(to_status)?;
        Ok(Response::new(WorkflowStatusResponse { id: id.as_str().to_string(), status: status.to_string() }))
    }

    async fn cancel_workflow(&self, request: Request<WorkflowIdRequest>) -> Result<Response<Empty>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Write).map_err(to_status)?;
        let id = WorkflowId::new(request.into_inner().id);
        self.coordinator.status(&id).ok_or_else(|| JobletError::not_found(id.as_str())).map_err(to_status)?;
        self.coordinator.cancel(&id);
        Ok(Response::new(Empty {}))
    }
}
