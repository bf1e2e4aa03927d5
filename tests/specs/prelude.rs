//! Test helpers for behavioral specifications.
//!
//! Spawns the real `jobletd` binary against a temporary base directory and
//! a pair of mTLS certificates (admin + viewer), then drives it purely
//! over gRPC — no in-process shortcuts, same black-box posture as the
//! rest of this suite.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use joblet_daemon::pb::joblet_service_client::JobletServiceClient;
use joblet_daemon::pb::monitoring_service_client::MonitoringServiceClient;
use joblet_daemon::pb::network_service_client::NetworkServiceClient;
use joblet_daemon::pb::runtime_service_client::RuntimeServiceClient;
use joblet_daemon::pb::volume_service_client::VolumeServiceClient;
use joblet_daemon::pb::workflow_service_client::WorkflowServiceClient;
use joblet_daemon::pb::Empty;
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};

pub const SPEC_WAIT_MAX_MS: u64 = 5_000;
const SPEC_POLL_INTERVAL_MS: u64 = 20;

/// Poll a condition until it returns true or the timeout elapses.
pub async fn wait_for<F, Fut>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS)).await;
    }
    false
}

fn jobletd_binary() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let standard = manifest_dir.join("target/debug/jobletd");
    if standard.exists() {
        return standard;
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join("jobletd");
            if fallback.exists() {
                return fallback;
            }
        }
    }
    standard
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

/// A minimal certificate authority, kept around only long enough to sign
/// the server and client leaf certs a test needs.
struct CaMaterial {
    cert: rcgen::Certificate,
    key: KeyPair,
}

fn make_ca() -> CaMaterial {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "joblet-specs-ca");
    params.distinguished_name = dn;
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    CaMaterial { cert, key }
}

/// A leaf cert signed by `ca`, carrying `ou` as its first Organizational
/// Unit when set (§4.7's role marker).
fn sign_leaf(ca: &CaMaterial, ou: Option<&str>, sans: Vec<String>) -> (String, String) {
    let mut params = CertificateParams::new(sans).unwrap();
    let mut dn = DistinguishedName::new();
    if let Some(ou) = ou {
        dn.push(DnType::OrganizationalUnitName, ou);
    }
    dn.push(DnType::CommonName, "joblet-specs-leaf");
    params.distinguished_name = dn;
    let key = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, &ca.cert, &ca.key).unwrap();
    (cert.pem(), key.serialize_pem())
}

/// A runtime tree with a `runtime.json` manifest, registered under
/// `base_dir/runtimes/<name>/<version>/` (§6 filesystem layout).
fn seed_runtime(base_dir: &Path, name: &str, version: &str) {
    let dir = base_dir.join("runtimes").join(name).join(version);
    std::fs::create_dir_all(&dir).unwrap();
    let root_dir = dir.join("root");
    std::fs::create_dir_all(&root_dir).unwrap();
    let runtime = joblet_core::runtime::Runtime {
        tag: format!("{name}:{version}"),
        root_dir,
        mounts: Vec::new(),
        env: Vec::new(),
        path_prepend: Vec::new(),
    };
    std::fs::write(dir.join("runtime.json"), serde_json::to_vec(&runtime).unwrap()).unwrap();
}

/// A running `jobletd`, its CA root, and one admin + one viewer client
/// identity. Kills the daemon on drop.
pub struct TestDaemon {
    child: Child,
    addr: String,
    ca_pem: String,
    admin_cert_pem: String,
    admin_key_pem: String,
    viewer_cert_pem: String,
    viewer_key_pem: String,
    pub base_dir: PathBuf,
    _base: tempfile::TempDir,
}

impl TestDaemon {
    /// Start `jobletd` against a fresh base directory with the `base:latest`
    /// runtime pre-registered (most scenarios need at least one runtime).
    pub async fn start() -> Self {
        let base = tempfile::tempdir().unwrap();
        seed_runtime(base.path(), "base", "latest");

        let ca = make_ca();
        let ca_cert_pem = ca.cert.pem();
        let (server_cert_pem, server_key_pem) =
            sign_leaf(&ca, None, vec!["localhost".to_string(), "127.0.0.1".to_string()]);
        let (admin_cert_pem, admin_key_pem) = sign_leaf(&ca, Some("admin"), vec!["localhost".to_string()]);
        let (viewer_cert_pem, viewer_key_pem) = sign_leaf(&ca, Some("viewer"), vec!["localhost".to_string()]);

        let port = free_port();
        let addr = format!("127.0.0.1:{port}");

        let config_path = base.path().join("joblet-config.yml");
        let config_yaml = format!(
            r#"
server:
  listen_addr: "{addr}"
  base_dir: "{base_dir}"
logging:
  level: "debug"
  file: "{base_dir}/logs/jobletd.log"
security:
  server_cert_pem: |
{server_cert}
  server_key_pem: |
{server_key}
  ca_cert_pem: |
{ca_cert}
persist:
  socket_path: "{base_dir}/run/persist.sock"
state:
  log_ring_bytes: 65536
"#,
            addr = addr,
            base_dir = base.path().display(),
            server_cert = indent_pem(&server_cert_pem),
            server_key = indent_pem(&server_key_pem),
            ca_cert = indent_pem(&ca_cert_pem),
        );
        std::fs::write(&config_path, config_yaml).unwrap();

        let child = Command::new(jobletd_binary())
            .arg("--config")
            .arg(&config_path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("jobletd should spawn");

        let daemon = Self {
            child,
            addr,
            ca_pem: ca_cert_pem,
            admin_cert_pem,
            admin_key_pem,
            viewer_cert_pem,
            viewer_key_pem,
            base_dir: base.path().to_path_buf(),
            _base: base,
        };

        let ready = wait_for(SPEC_WAIT_MAX_MS, || async {
            match daemon.try_admin_channel().await {
                Ok(mut client) => client.get_health(Empty {}).await.is_ok(),
                Err(_) => false,
            }
        })
        .await;
        assert!(ready, "jobletd did not become ready in time");
        daemon
    }

    async fn channel(&self, cert_pem: &str, key_pem: &str) -> Result<Channel, tonic::transport::Error> {
        let ca = Certificate::from_pem(&self.ca_pem);
        let identity = Identity::from_pem(cert_pem, key_pem);
        let tls = ClientTlsConfig::new().domain_name("localhost").ca_certificate(ca).identity(identity);
        Channel::from_shared(format!("https://{}", self.addr)).unwrap().tls_config(tls)?.connect().await
    }

    async fn try_admin_channel(&self) -> Result<MonitoringServiceClient<Channel>, tonic::transport::Error> {
        let channel = self.channel(&self.admin_cert_pem, &self.admin_key_pem).await?;
        Ok(MonitoringServiceClient::new(channel))
    }

    pub async fn admin_jobs(&self) -> JobletServiceClient<Channel> {
        JobletServiceClient::new(self.channel(&self.admin_cert_pem, &self.admin_key_pem).await.unwrap())
    }

    pub async fn viewer_jobs(&self) -> JobletServiceClient<Channel> {
        JobletServiceClient::new(self.channel(&self.viewer_cert_pem, &self.viewer_key_pem).await.unwrap())
    }

    pub async fn admin_workflows(&self) -> WorkflowServiceClient<Channel> {
        WorkflowServiceClient::new(self.channel(&self.admin_cert_pem, &self.admin_key_pem).await.unwrap())
    }

    pub async fn admin_networks(&self) -> NetworkServiceClient<Channel> {
        NetworkServiceClient::new(self.channel(&self.admin_cert_pem, &self.admin_key_pem).await.unwrap())
    }

    pub async fn admin_volumes(&self) -> VolumeServiceClient<Channel> {
        VolumeServiceClient::new(self.channel(&self.admin_cert_pem, &self.admin_key_pem).await.unwrap())
    }

    pub async fn admin_runtimes(&self) -> RuntimeServiceClient<Channel> {
        RuntimeServiceClient::new(self.channel(&self.admin_cert_pem, &self.admin_key_pem).await.unwrap())
    }

    pub async fn admin_monitoring(&self) -> MonitoringServiceClient<Channel> {
        MonitoringServiceClient::new(self.channel(&self.admin_cert_pem, &self.admin_key_pem).await.unwrap())
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Indent a PEM blob by 4 spaces so it nests under a YAML block scalar
/// (`|`).
fn indent_pem(pem: &str) -> String {
    pem.lines().map(|l| format!("    {l}")).collect::<Vec<_>>().join("\n")
}
