// SPDX-License-Identifier: MIT
//! `jobletd`: the Joblet daemon binary (§4.4, §4.8, §6).
//!
//! Two entry points live behind one binary: the normal daemon startup
//! path below, and `--job-init`, entered only by a re-exec'd child right
//! after `fork`+`setsid` to finish isolating itself before `exec`ing the
//! user's command (see [`joblet_daemon::init`]).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use joblet_core::clock::SystemClock;
use joblet_daemon::config::Config;
use joblet_daemon::manager::{JobManager, JobManagerConfig};
use joblet_daemon::registry::{NetworkRegistry, RuntimeRegistry, VolumeRegistry};
use joblet_daemon::service::{
    JobletServiceImpl, MonitoringServiceImpl, NetworkServiceImpl, RuntimeServiceImpl, VolumeServiceImpl,
    WorkflowServiceImpl,
};
use joblet_daemon::workflow_runner::WorkflowCoordinator;
use joblet_daemon::{init, logging};
use joblet_persist::PersistClient;
use joblet_scheduler::Scheduler;
use joblet_store::Store;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tracing::{error, info};

/// Frequency at which idle streams receive an HTTP/2 keepalive ping
/// (§4.8: "keepalive frames sent on idle streams every 30 s").
const HTTP2_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

const DEFAULT_CONFIG_PATH: &str = "/opt/joblet/config/joblet-config.yml";

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    if let Some(arg) = args.next() {
        match arg.as_str() {
            "--job-init" => init::run(),
            "--version" | "-v" => {
                println!("jobletd {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" | "-h" => {
                print_help();
                return;
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: jobletd [--config PATH | --help | --version]");
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = run().await {
        eprintln!("jobletd failed: {e}");
        std::process::exit(1);
    }
}

fn print_help() {
    println!("jobletd {}", env!("CARGO_PKG_VERSION"));
    println!("Joblet daemon — isolated job execution over mutual-TLS gRPC");
    println!();
    println!("USAGE:");
    println!("    jobletd [--config PATH]");
    println!();
    println!("OPTIONS:");
    println!("    --config PATH    Path to joblet-config.yml (default: {DEFAULT_CONFIG_PATH})");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

fn config_path() -> PathBuf {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        }
    }
    std::env::var("JOBLET_CONFIG").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&config_path())?;
    let _lock = config.acquire_lock()?;
    let _log_guard = logging::setup_logging(&config.logging)?;

    info!("starting jobletd");

    let clock = SystemClock;
    let store = Store::with_ring_capacity(config.state.log_ring_bytes);
    let volumes = Arc::new(VolumeRegistry::new());
    let networks = Arc::new(NetworkRegistry::new());
    let runtimes = Arc::new(RuntimeRegistry::new());
    load_runtimes(&runtimes, &config.runtimes_dir());

    let shutdown = CancellationToken::new();
    let (scheduler, mut due_jobs) = Scheduler::spawn(clock, shutdown.clone());
    let persist = Some(PersistClient::spawn(config.persist.socket_path.clone(), clock, shutdown.clone()));

    let manager = JobManager::new(
        store,
        Arc::clone(&volumes),
        Arc::clone(&networks),
        Arc::clone(&runtimes),
        Arc::clone(&scheduler),
        persist.clone(),
        clock,
        JobManagerConfig {
            jobs_dir: config.jobs_dir(),
            volumes_dir: config.volumes_dir(),
            cgroup_root: config.cgroup_root(),
            service_uid: 1000,
            service_gid: 1000,
        },
    );

    {
        let manager = Arc::clone(&manager);
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(job_id) = due_jobs.recv() => {
                        if let Err(e) = manager.execute_scheduled_job(job_id).await {
                            error!(error = %e, "failed to execute scheduled job");
                        }
                    }
                    _ = cancel.cancelled() => return,
                    else => return,
                }
            }
        });
    }

    let coordinator = WorkflowCoordinator::new(Arc::clone(&manager));
    coordinator.spawn(shutdown.clone());

    let identity = Identity::from_pem(&config.security.server_cert_pem, &config.security.server_key_pem);
    let ca_cert = Certificate::from_pem(&config.security.ca_cert_pem);
    let tls = ServerTlsConfig::new().identity(identity).client_ca_root(ca_cert);

    let addr: SocketAddr = config.server.listen_addr.parse()?;

    let joblet_service = JobletServiceImpl::new(Arc::clone(&manager));
    let network_service = NetworkServiceImpl::new(Arc::clone(&networks));
    let volume_service = VolumeServiceImpl::new(Arc::clone(&volumes));
    let runtime_service = RuntimeServiceImpl::new(Arc::clone(&runtimes));
    let monitoring_service = MonitoringServiceImpl::new(Arc::clone(&manager));
    let workflow_service = WorkflowServiceImpl::new(Arc::clone(&coordinator), Arc::clone(&runtimes), Arc::clone(&volumes));

    let server = Server::builder()
        .tls_config(tls)?
        .http2_keepalive_interval(Some(HTTP2_KEEPALIVE_INTERVAL))
        .add_service(joblet_daemon::pb::joblet_service_server::JobletServiceServer::new(joblet_service))
        .add_service(joblet_daemon::pb::network_service_server::NetworkServiceServer::new(network_service))
        .add_service(joblet_daemon::pb::volume_service_server::VolumeServiceServer::new(volume_service))
        .add_service(joblet_daemon::pb::runtime_service_server::RuntimeServiceServer::new(runtime_service))
        .add_service(joblet_daemon::pb::monitoring_service_server::MonitoringServiceServer::new(monitoring_service))
        .add_service(joblet_daemon::pb::workflow_service_server::WorkflowServiceServer::new(workflow_service));

    info!(addr = %addr, "jobletd ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let serve = server.serve_with_shutdown(addr, async {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
    });

    if let Err(e) = serve.await {
        error!(error = %e, "server exited with error");
    }

    shutdown.cancel();
    info!("jobletd stopped");
    Ok(())
}

/// Populate the runtime registry from `runtimes_dir`'s `name/version/`
/// layout (§6 filesystem layout), skipping trees that don't carry a
/// manifest — runtime preparation itself is out of scope (§1 non-goal).
fn load_runtimes(registry: &RuntimeRegistry, runtimes_dir: &std::path::Path) {
    let Ok(names) = std::fs::read_dir(runtimes_dir) else {
        return;
    };
    for name_entry in names.flatten() {
        let Ok(name_file_type) = name_entry.file_type() else { continue };
        if !name_file_type.is_dir() {
            continue;
        }
        let name = name_entry.file_name().to_string_lossy().to_string();
        let Ok(versions) = std::fs::read_dir(name_entry.path()) else { continue };
        for version_entry in versions.flatten() {
            let Ok(version_file_type) = version_entry.file_type() else { continue };
            if !version_file_type.is_dir() {
                continue;
            }
            let version = version_entry.file_name().to_string_lossy().to_string();
            let manifest_path = version_entry.path().join("runtime.json");
            let Ok(manifest_bytes) = std::fs::read(&manifest_path) else { continue };
            match serde_json::from_slice::<joblet_core::runtime::Runtime>(&manifest_bytes) {
                Ok(mut runtime) => {
                    runtime.tag = format!("{name}:{version}");
                    registry.register(runtime);
                }
                Err(e) => error!(path = %manifest_path.display(), error = %e, "failed to parse runtime manifest"),
            }
        }
    }
}
