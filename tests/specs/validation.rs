//! Admission validation (§4.4): unknown runtime/network/volume references
//! are rejected before anything is placed on disk or scheduled.

use crate::prelude::*;
use joblet_daemon::pb::RunJobRequest;
use tonic::Code;

#[tokio::test]
async fn unknown_runtime_is_rejected() {
    let daemon = TestDaemon::start().await;
    let mut admin = daemon.admin_jobs().await;

    let err = admin
        .run_job(RunJobRequest {
            command: "echo".to_string(),
            runtime: "does-not-exist:1".to_string(),
            network: "bridge".to_string(),
            ..Default::default()
        })
        .await
        .expect_err("unknown runtime should be rejected");
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn unknown_network_is_rejected() {
    let daemon = TestDaemon::start().await;
    let mut admin = daemon.admin_jobs().await;

    let err = admin
        .run_job(RunJobRequest {
            command: "echo".to_string(),
            runtime: "base:latest".to_string(),
            network: "does-not-exist".to_string(),
            ..Default::default()
        })
        .await
        .expect_err("unknown network should be rejected");
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn unknown_volume_is_rejected() {
    let daemon = TestDaemon::start().await;
    let mut admin = daemon.admin_jobs().await;

    let err = admin
        .run_job(RunJobRequest {
            command: "echo".to_string(),
            runtime: "base:latest".to_string(),
            network: "bridge".to_string(),
            volumes: vec!["does-not-exist".to_string()],
            ..Default::default()
        })
        .await
        .expect_err("unknown volume should be rejected");
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let daemon = TestDaemon::start().await;
    let mut admin = daemon.admin_jobs().await;

    let err = admin
        .run_job(RunJobRequest {
            command: String::new(),
            runtime: "base:latest".to_string(),
            network: "bridge".to_string(),
            ..Default::default()
        })
        .await
        .expect_err("empty command should be rejected");
    assert_eq!(err.code(), Code::InvalidArgument);
}
