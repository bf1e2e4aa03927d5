// SPDX-License-Identifier: MIT
//! `RuntimeService` (§3, §4.8): list/info/test over registered runtimes.
//! Runtime trees are prepared out-of-band (image pulling is a non-goal);
//! this service only reports on what has already been registered.

use crate::auth::{self, Operation};
use crate::error_map::to_status;
use crate::pb::runtime_service_server::RuntimeService;
use crate::pb::{Empty, NameRequest, Runtime, RuntimeList, TestRuntimeResponse};
use crate::registry::RuntimeRegistry;
use joblet_core::error::JobletError;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct RuntimeServiceImpl {
    runtimes: Arc<RuntimeRegistry>,
}

impl RuntimeServiceImpl {
    pub fn new(runtimes: Arc<RuntimeRegistry>) -> Self {
        Self { runtimes }
    }
}

#[tonic::async_trait]
impl RuntimeService for RuntimeServiceImpl {
    async fn list_runtimes(&self, request: Request<Empty>) -> Result<Response<RuntimeList>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        let runtimes = self.runtimes.list().iter().map(Runtime::from).collect();
        Ok(Response::new(RuntimeList { runtimes }))
    }

    async fn get_runtime_info(&self, request: Request<NameRequest>) -> Result<Response<Runtime>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        let tag = request.into_inner().name;
        let runtime = self.runtimes.get(&tag).ok_or_else(|| JobletError::not_found(tag)).map_err(to_status)?;
        Ok(Response::new((&runtime).into()))
    }

    /// Confirms the registered tree is still present on disk; image
    /// integrity and toolchain sanity checks are out of scope (§1 non-goal:
    /// container image pulling).
    async fn test_runtime(&self, request: Request<NameRequest>) -> Result<Response<TestRuntimeResponse>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        let tag = request.into_inner().name;
        let runtime = self.runtimes.get(&tag).ok_or_else(|| JobletError::not_found(tag.clone())).map_err(to_status)?;

        let response = match std::fs::metadata(&runtime.root_dir) {
            Ok(meta) if meta.is_dir() => {
                TestRuntimeResponse { ok: true, message: format!("{} is ready at {}", tag, runtime.root_dir.display()) }
            }
            Ok(_) => TestRuntimeResponse { ok: false, message: format!("{} is not a directory", runtime.root_dir.display()) },
            Err(e) => TestRuntimeResponse { ok: false, message: format!("{} is unreachable: {e}", runtime.root_dir.display()) },
        };
        Ok(Response::new(response))
    }
}
