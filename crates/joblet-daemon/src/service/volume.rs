// SPDX-License-Identifier: MIT
//! `VolumeService` (§3, §4.8): create/list/remove volumes.

use crate::auth::{self, Operation};
use crate::convert::parse_volume_kind;
use crate::error_map::to_status;
use crate::pb::volume_service_server::VolumeService;
use crate::pb::{CreateVolumeRequest, Empty, NameRequest, Volume, VolumeList};
use crate::registry::VolumeRegistry;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct VolumeServiceImpl {
    volumes: Arc<VolumeRegistry>,
}

impl VolumeServiceImpl {
    pub fn new(volumes: Arc<VolumeRegistry>) -> Self {
        Self { volumes }
    }
}

#[tonic::async_trait]
impl VolumeService for VolumeServiceImpl {
    async fn create_volume(&self, request: Request<CreateVolumeRequest>) -> Result<Response<Volume>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Write).map_err(to_status)?;
        let req = request.into_inner();
        let kind = parse_volume_kind(&req.kind);
        let volume = self.volumes.create(&req.name, req.size_bytes, kind).map_err(to_status)?;
        Ok(Response::new((&volume).into()))
    }

    async fn list_volumes(&self, request: Request<Empty>) -> Result<Response<VolumeList>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        let volumes = self.volumes.list().iter().map(Volume::from).collect();
        Ok(Response::new(VolumeList { volumes }))
    }

    async fn remove_volume(&self, request: Request<NameRequest>) -> Result<Response<Empty>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Write).map_err(to_status)?;
        self.volumes.remove(&request.into_inner().name).map_err(to_status)?;
        Ok(Response::new(Empty {}))
    }
}
