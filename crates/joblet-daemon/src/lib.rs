// SPDX-License-Identifier: MIT
//! `jobletd` library crate: admission and isolated execution of jobs
//! (§4.4), workflow coordination (§4.6), and the gRPC surface (§4.8) that
//! fronts them. The binary at `src/main.rs` is a thin wire-up over this.

pub mod auth;
pub mod config;
pub mod convert;
pub mod error_map;
pub mod init;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod service;
pub mod workflow_runner;

/// Generated protobuf/gRPC types (§6, `proto/joblet.proto`).
pub mod pb {
    tonic::include_proto!("joblet.v1");
}
