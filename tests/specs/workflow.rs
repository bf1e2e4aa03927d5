//! Workflow submission (§4.6, §8 scenario 5): a cyclic DAG is rejected at
//! `RunWorkflow` with `INVALID_ARGUMENT`, an acyclic one is accepted and
//! can be polled and canceled.

use crate::prelude::*;
use joblet_daemon::pb::{RunWorkflowRequest, WorkflowIdRequest};
use tonic::Code;

const CYCLIC_WORKFLOW: &str = r#"
jobs:
  a:
    command: echo
    runtime: base:latest
    requires:
      - b: COMPLETED
  b:
    command: echo
    runtime: base:latest
    requires:
      - a: COMPLETED
"#;

const ACYCLIC_WORKFLOW: &str = r#"
jobs:
  a:
    command: echo
    runtime: base:latest
  b:
    command: echo
    runtime: base:latest
    requires:
      - a: COMPLETED
"#;

const UNKNOWN_RUNTIME_WORKFLOW: &str = r#"
jobs:
  a:
    command: echo
    runtime: missing:1
"#;

#[tokio::test]
async fn circular_dependency_is_rejected() {
    let daemon = TestDaemon::start().await;
    let mut workflows = daemon.admin_workflows().await;

    let err = workflows
        .run_workflow(RunWorkflowRequest { yaml: CYCLIC_WORKFLOW.to_string() })
        .await
        .expect_err("a cyclic workflow should be rejected");
    assert_eq!(err.code(), Code::InvalidArgument);
    assert!(err.message().contains("circular"), "message should name the cycle: {}", err.message());
}

#[tokio::test]
async fn unknown_runtime_reference_is_rejected() {
    let daemon = TestDaemon::start().await;
    let mut workflows = daemon.admin_workflows().await;

    let err = workflows
        .run_workflow(RunWorkflowRequest { yaml: UNKNOWN_RUNTIME_WORKFLOW.to_string() })
        .await
        .expect_err("an unknown runtime reference should be rejected");
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn acyclic_workflow_is_accepted_and_can_be_queried_and_canceled() {
    let daemon = TestDaemon::start().await;
    let mut workflows = daemon.admin_workflows().await;

    let submitted = workflows
        .run_workflow(RunWorkflowRequest { yaml: ACYCLIC_WORKFLOW.to_string() })
        .await
        .expect("an acyclic workflow should be accepted")
        .into_inner();
    assert!(!submitted.id.is_empty());

    let status = workflows
        .get_workflow_status(WorkflowIdRequest { id: submitted.id.clone() })
        .await
        .expect("status should be queryable")
        .into_inner();
    assert_eq!(status.id, submitted.id);
    assert!(!status.status.is_empty());

    workflows
        .cancel_workflow(WorkflowIdRequest { id: submitted.id.clone() })
        .await
        .expect("a just-submitted workflow should be cancelable");

    let after_cancel = workflows
        .get_workflow_status(WorkflowIdRequest { id: submitted.id })
        .await
        .expect("status should still be queryable after cancel")
        .into_inner();
    assert_eq!(after_cancel.status, "CANCELED");
}

#[tokio::test]
async fn unknown_workflow_id_is_not_found() {
    let daemon = TestDaemon::start().await;
    let mut workflows = daemon.admin_workflows().await;

    let err = workflows
        .get_workflow_status(WorkflowIdRequest { id: "does-not-exist".to_string() })
        .await
        .expect_err("an unknown workflow id should be rejected");
    assert_eq!(err.code(), Code::NotFound);
}
