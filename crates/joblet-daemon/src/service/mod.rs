// SPDX-License-Identifier: MIT
//! gRPC service implementations (§4.8): one module per proto service,
//! each a thin wrapper over [`crate::manager::JobManager`] and the
//! registries that checks authorization first and converts wire types
//! via [`crate::convert`].

mod joblet;
mod monitoring;
mod network;
mod runtime;
mod volume;
mod workflow;

pub use joblet::JobletServiceImpl;
pub use monitoring::MonitoringServiceImpl;
pub use network::NetworkServiceImpl;
pub use runtime::RuntimeServiceImpl;
pub use volume::VolumeServiceImpl;
pub use workflow::WorkflowServiceImpl;
