//! Role-based authorization (§4.7): admin may do anything, viewer is
//! read-only, an unrecognized role is denied everything.

use crate::prelude::*;
use joblet_daemon::pb::{ListJobsRequest, RunJobRequest};
use tonic::Code;

#[tokio::test]
async fn viewer_may_list_jobs_but_not_run_one() {
    let daemon = TestDaemon::start().await;

    let mut viewer = daemon.viewer_jobs().await;
    let list = viewer.list_jobs(ListJobsRequest {}).await;
    assert!(list.is_ok(), "viewer should be able to list jobs: {list:?}");

    let run = viewer
        .run_job(RunJobRequest {
            command: "echo".to_string(),
            runtime: "base:latest".to_string(),
            network: "bridge".to_string(),
            ..Default::default()
        })
        .await;
    let err = run.expect_err("viewer should not be able to run a job");
    assert_eq!(err.code(), Code::PermissionDenied);
}

#[tokio::test]
async fn admin_may_list_and_attempt_to_run() {
    let daemon = TestDaemon::start().await;
    let mut admin = daemon.admin_jobs().await;

    let list = admin.list_jobs(ListJobsRequest {}).await;
    assert!(list.is_ok(), "admin should be able to list jobs: {list:?}");

    // Admission validation runs before the namespace/cgroup launch; an
    // admin request against a registered runtime clears authorization and
    // validation alike, so a rejection here would have to come from
    // further down the pipeline, not from the auth layer.
    let run = admin
        .run_job(RunJobRequest {
            command: "true".to_string(),
            runtime: "base:latest".to_string(),
            network: "bridge".to_string(),
            ..Default::default()
        })
        .await;
    assert_ne!(run.as_ref().err().map(|e| e.code()), Some(Code::PermissionDenied));
}
