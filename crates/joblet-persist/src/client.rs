// SPDX-License-Identifier: MIT
//! Persistence sidecar client (§4.9): fire-and-forget writes over a Unix
//! stream socket, newline-terminated JSON, automatic reconnect with
//! exponential backoff. Transient failures are logged, never surfaced to
//! the caller — the daemon's own job state is authoritative, the sidecar
//! is best-effort durability.

use crate::message::{Op, Request};
use joblet_core::clock::Clock;
use joblet_core::job::Job;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Per-write deadline (§4.9 "5 s deadline").
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const BACKOFF_INITIAL: Duration = Duration::from_millis(200);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Outbound queue depth. A full queue means the sidecar is unreachable for
/// a while; new writes are dropped with a warning rather than applying
/// backpressure to the caller (fire-and-forget).
const QUEUE_CAPACITY: usize = 4096;

pub struct PersistClient<C: Clock> {
    tx: mpsc::Sender<String>,
    clock: C,
    next_request_id: AtomicU64,
}

impl<C: Clock> PersistClient<C> {
    /// Spawn the background connection-owning task and return a handle.
    pub fn spawn(socket_path: PathBuf, clock: C, cancel: CancellationToken) -> std::sync::Arc<Self> {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_connection(socket_path, rx, cancel));
        std::sync::Arc::new(Self { tx, clock, next_request_id: AtomicU64::new(0) })
    }

    fn request_id(&self) -> String {
        format!("req-{}", self.next_request_id.fetch_add(1, Ordering::Relaxed))
    }

    fn enqueue(&self, request: Request) {
        let line = match serde_json::to_string(&request) {
            Ok(mut s) => {
                s.push('\n');
                s
            }
            Err(e) => {
                error!(error = %e, "failed to serialize persistence request");
                return;
            }
        };
        if self.tx.try_send(line).is_err() {
            warn!(op = ?request.op, "persistence queue full, dropping write");
        }
    }

    pub fn create(&self, job: &Job) {
        let mut req = Request::new(Op::Create, self.request_id(), self.clock.epoch_ms());
        req.job_id = Some(job.id.as_str().to_string());
        req.job = Some(job.clone());
        self.enqueue(req);
    }

    pub fn update(&self, job: &Job) {
        let mut req = Request::new(Op::Update, self.request_id(), self.clock.epoch_ms());
        req.job_id = Some(job.id.as_str().to_string());
        req.job = Some(job.clone());
        self.enqueue(req);
    }

    pub fn delete(&self, job_id: &str) {
        let mut req = Request::new(Op::Delete, self.request_id(), self.clock.epoch_ms());
        req.job_id = Some(job_id.to_string());
        self.enqueue(req);
    }

    /// Reconcile state with the sidecar on daemon startup (§4.9).
    pub fn sync(&self, jobs: Vec<Job>) {
        let mut req = Request::new(Op::Sync, self.request_id(), self.clock.epoch_ms());
        req.jobs = Some(jobs);
        self.enqueue(req);
    }

    pub fn ping(&self) {
        self.enqueue(Request::new(Op::Ping, self.request_id(), self.clock.epoch_ms()));
    }
}

async fn run_connection(socket_path: PathBuf, mut rx: mpsc::Receiver<String>, cancel: CancellationToken) {
    let mut backoff = BACKOFF_INITIAL;

    'reconnect: loop {
        if cancel.is_cancelled() {
            return;
        }
        let mut stream = match UnixStream::connect(&socket_path).await {
            Ok(s) => {
                debug!(path = %socket_path.display(), "connected to persistence sidecar");
                backoff = BACKOFF_INITIAL;
                s
            }
            Err(e) => {
                warn!(path = %socket_path.display(), error = %e, backoff_ms = backoff.as_millis(), "persistence sidecar unreachable, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => return,
                }
                backoff = (backoff * 2).min(BACKOFF_CAP);
                continue 'reconnect;
            }
        };

        loop {
            let line = tokio::select! {
                line = rx.recv() => line,
                _ = cancel.cancelled() => return,
            };
            let Some(line) = line else { return };

            let write = tokio::time::timeout(WRITE_TIMEOUT, stream.write_all(line.as_bytes())).await;
            match write {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "persistence write failed, reconnecting");
                    continue 'reconnect;
                }
                Err(_) => {
                    warn!("persistence write exceeded its 5s deadline, reconnecting");
                    continue 'reconnect;
                }
            }
        }
    }
}
