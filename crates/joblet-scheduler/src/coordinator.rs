// SPDX-License-Identifier: MIT
//! Scheduler coordinator (§4.5): a single task that sleeps until the
//! earliest due time or until woken by a newly scheduled earlier entry,
//! then emits due job IDs for `ExecuteScheduledJob` to pick up.
//!
//! On restart, a job whose scheduled time has already passed fires on the
//! coordinator's very first wake — `DueQueue::pop_if_due` only compares
//! `due_ms` against the current time, so a stale entry is simply always
//! due. This is a deliberate resolution of §9(a)'s open question: fire
//! immediately rather than fail the job outright.

use crate::queue::DueQueue;
use joblet_core::clock::Clock;
use joblet_core::id::JobId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Safety cap on how long the coordinator sleeps between due-time checks
/// when the queue is empty, so a `schedule()` call racing the loop is
/// never missed for more than this long.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Generic over the clock source (`Clock` is `Clone`-bound and so isn't
/// object-safe) so production code uses `Scheduler<SystemClock>` while
/// tests can drive a `Scheduler<FakeClock>`.
pub struct Scheduler<C: Clock> {
    queue: Arc<DueQueue>,
    notify: Arc<Notify>,
    clock: C,
}

impl<C: Clock> Scheduler<C> {
    /// Construct a scheduler and spawn its coordinator loop. Returns the
    /// handle plus a channel that yields job IDs as they come due.
    pub fn spawn(clock: C, cancel: CancellationToken) -> (Arc<Self>, mpsc::Receiver<JobId>) {
        let scheduler = Arc::new(Self {
            queue: Arc::new(DueQueue::new()),
            notify: Arc::new(Notify::new()),
            clock,
        });
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(scheduler.clone().run(tx, cancel));
        (scheduler, rx)
    }

    pub async fn schedule(&self, job_id: JobId, due_ms: u64) {
        self.queue.push(job_id, due_ms).await;
        self.notify.notify_one();
    }

    pub async fn cancel(&self, job_id: &JobId) -> bool {
        self.queue.cancel(job_id).await
    }

    async fn run(self: Arc<Self>, tx: mpsc::Sender<JobId>, cancel: CancellationToken) {
        loop {
            let now_ms = self.clock.epoch_ms();
            if let Some(job_id) = self.queue.pop_if_due(now_ms).await {
                debug!(job_id = %job_id, "scheduled job fired");
                if tx.send(job_id).await.is_err() {
                    return;
                }
                continue;
            }

            let sleep_for = match self.queue.peek_due_ms().await {
                Some(due_ms) => Duration::from_millis(due_ms.saturating_sub(now_ms)),
                None => IDLE_POLL_INTERVAL,
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.notify.notified() => {}
                _ = cancel.cancelled() => {
                    info!("scheduler coordinator shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joblet_core::clock::SystemClock;

    #[tokio::test]
    async fn fires_job_already_due_immediately() {
        let cancel = CancellationToken::new();
        let now = SystemClock.epoch_ms();
        let (scheduler, mut rx) = Scheduler::spawn(SystemClock, cancel.clone());
        let id = JobId::generate();
        scheduler.schedule(id.clone(), now.saturating_sub(5_000)).await;

        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(fired, Some(id));
        cancel.cancel();
    }

    #[tokio::test]
    async fn cancel_before_due_prevents_firing() {
        let cancel = CancellationToken::new();
        let (scheduler, mut rx) = Scheduler::spawn(SystemClock, cancel.clone());
        let id = JobId::generate();
        let due = SystemClock.epoch_ms() + 60_000;
        scheduler.schedule(id.clone(), due).await;
        assert!(scheduler.cancel(&id).await);

        let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err(), "canceled job must not fire");
        cancel.cancel();
    }
}
