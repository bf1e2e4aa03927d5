// SPDX-License-Identifier: MIT
//! `NetworkService` (§3, §4.8): create/list/remove networks.

use crate::auth::{self, Operation};
use crate::convert::parse_network_kind;
use crate::error_map::to_status;
use crate::pb::network_service_server::NetworkService;
use crate::pb::{CreateNetworkRequest, Empty, Network, NetworkList, NameRequest};
use crate::registry::NetworkRegistry;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct NetworkServiceImpl {
    networks: Arc<NetworkRegistry>,
}

impl NetworkServiceImpl {
    pub fn new(networks: Arc<NetworkRegistry>) -> Self {
        Self { networks }
    }
}

#[tonic::async_trait]
impl NetworkService for NetworkServiceImpl {
    async fn create_network(&self, request: Request<CreateNetworkRequest>) -> Result<Response<Network>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Write).map_err(to_status)?;
        let req = request.into_inner();
        let kind = parse_network_kind(&req.kind);
        let network = self.networks.create(&req.name, kind).map_err(to_status)?;
        Ok(Response::new((&network).into()))
    }

    async fn list_networks(&self, request: Request<Empty>) -> Result<Response<NetworkList>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Read).map_err(to_status)?;
        let networks = self.networks.list().iter().map(Network::from).collect();
        Ok(Response::new(NetworkList { networks }))
    }

    async fn remove_network(&self, request: Request<NameRequest>) -> Result<Response<Empty>, Status> {
        auth::authorize(auth::extract_role(&request)?, Operation::Write).map_err(to_status)?;
        self.networks.remove(&request.into_inner().name).map_err(to_status)?;
        Ok(Response::new(Empty {}))
    }
}
