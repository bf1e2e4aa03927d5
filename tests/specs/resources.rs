//! `NetworkService`, `VolumeService`, `RuntimeService` (§3, §4.8): create,
//! list, and remove resource definitions.

use crate::prelude::*;
use joblet_daemon::pb::{CreateNetworkRequest, CreateVolumeRequest, Empty, NameRequest};
use tonic::Code;

#[tokio::test]
async fn builtin_networks_are_present_and_cannot_be_removed() {
    let daemon = TestDaemon::start().await;
    let mut networks = daemon.admin_networks().await;

    let list = networks.list_networks(Empty {}).await.unwrap().into_inner().networks;
    let names: Vec<_> = list.iter().map(|n| n.name.as_str()).collect();
    assert!(names.contains(&"bridge"));
    assert!(names.contains(&"isolated"));
    assert!(names.contains(&"none"));

    let err = networks
        .remove_network(NameRequest { name: "bridge".to_string() })
        .await
        .expect_err("a built-in network should not be removable");
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn custom_network_can_be_created_listed_and_removed() {
    let daemon = TestDaemon::start().await;
    let mut networks = daemon.admin_networks().await;

    let created = networks
        .create_network(CreateNetworkRequest { name: "staging".to_string(), kind: "10.0.0.0/24".to_string() })
        .await
        .expect("a new network name should be creatable")
        .into_inner();
    assert_eq!(created.name, "staging");

    let dup = networks.create_network(CreateNetworkRequest { name: "staging".to_string(), kind: "bridge".to_string() }).await;
    assert_eq!(dup.expect_err("duplicate create should fail").code(), Code::AlreadyExists);

    networks.remove_network(NameRequest { name: "staging".to_string() }).await.expect("custom network should be removable");
    let after = networks.list_networks(Empty {}).await.unwrap().into_inner().networks;
    assert!(!after.iter().any(|n| n.name == "staging"));
}

#[tokio::test]
async fn volume_lifecycle_create_list_remove() {
    let daemon = TestDaemon::start().await;
    let mut volumes = daemon.admin_volumes().await;

    let created = volumes
        .create_volume(CreateVolumeRequest { name: "data".to_string(), size_bytes: 1024 * 1024, kind: "filesystem".to_string() })
        .await
        .expect("a new volume should be creatable")
        .into_inner();
    assert_eq!(created.name, "data");
    assert_eq!(created.ref_count, 0);

    let list = volumes.list_volumes(Empty {}).await.unwrap().into_inner().volumes;
    assert!(list.iter().any(|v| v.name == "data"));

    volumes.remove_volume(NameRequest { name: "data".to_string() }).await.expect("an unreferenced volume should be removable");
    let err = volumes.remove_volume(NameRequest { name: "data".to_string() }).await.expect_err("removing twice should fail");
    assert_eq!(err.code(), Code::NotFound);
}

#[tokio::test]
async fn registered_runtime_reports_ready_and_unknown_tag_is_not_found() {
    let daemon = TestDaemon::start().await;
    let mut runtimes = daemon.admin_runtimes().await;

    let list = runtimes.list_runtimes(Empty {}).await.unwrap().into_inner().runtimes;
    assert!(list.iter().any(|r| r.tag == "base:latest"));

    let info = runtimes.get_runtime_info(NameRequest { name: "base:latest".to_string() }).await.expect("known tag should resolve").into_inner();
    assert_eq!(info.tag, "base:latest");

    let test = runtimes.test_runtime(NameRequest { name: "base:latest".to_string() }).await.expect("test_runtime should succeed").into_inner();
    assert!(test.ok, "registered runtime's root_dir exists on disk: {}", test.message);

    let err = runtimes.get_runtime_info(NameRequest { name: "missing:1".to_string() }).await.expect_err("unknown tag should be rejected");
    assert_eq!(err.code(), Code::NotFound);
}
