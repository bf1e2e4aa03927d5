//! `MonitoringService` (§4.8): liveness/uptime/job-count probe.

use crate::prelude::*;
use joblet_daemon::pb::Empty;

#[tokio::test]
async fn health_reports_ok_and_starts_with_no_jobs() {
    let daemon = TestDaemon::start().await;
    let mut monitoring = daemon.admin_monitoring().await;

    let health = monitoring.get_health(Empty {}).await.expect("health check should succeed").into_inner();
    assert!(health.ok);
    assert_eq!(health.job_count, 0);
}
