// SPDX-License-Identifier: MIT
//! Subscriber fan-out (§4.1): log chunks and status transitions delivered
//! on the same channel, in monotonic order, via a non-blocking bounded
//! send so a slow subscriber never blocks the producer (§5).

use joblet_core::job::JobStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One item delivered to a subscriber: either a chunk of log bytes or a
/// status transition. Both flow over the same channel so per-subscriber
/// ordering is total (§4.1 "Ordering guarantees").
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Log(Vec<u8>),
    Status(JobStatus),
    /// The job reached a terminal state and the ring has fully drained;
    /// no further events will be sent.
    Closed,
}

/// Bounded capacity for a subscriber's channel. Sends beyond this drop
/// (§4.1: "slow subscribers ... receive a drop counter incremented").
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Subscriber {
    tx: mpsc::Sender<StreamEvent>,
    dropped: Arc<AtomicU64>,
}

pub struct SubscriberHandle {
    pub rx: mpsc::Receiver<StreamEvent>,
    pub dropped: Arc<AtomicU64>,
}

impl Subscriber {
    pub fn new() -> (Self, SubscriberHandle) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        (
            Self { tx, dropped: Arc::clone(&dropped) },
            SubscriberHandle { rx, dropped },
        )
    }

    /// Non-blocking send; increments the drop counter instead of blocking
    /// the caller when the subscriber's channel is full (§4.1 `AppendLog`).
    pub fn send(&self, event: StreamEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order() {
        let (sub, mut handle) = Subscriber::new();
        sub.send(StreamEvent::Log(b"a".to_vec()));
        sub.send(StreamEvent::Status(JobStatus::Running));
        sub.send(StreamEvent::Log(b"b".to_vec()));

        assert!(matches!(handle.rx.recv().await, Some(StreamEvent::Log(b)) if b == b"a"));
        assert!(matches!(
            handle.rx.recv().await,
            Some(StreamEvent::Status(JobStatus::Running))
        ));
        assert!(matches!(handle.rx.recv().await, Some(StreamEvent::Log(b)) if b == b"b"));
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (sub, _handle) = Subscriber::new();
        for _ in 0..(SUBSCRIBER_CHANNEL_CAPACITY + 10) {
            sub.send(StreamEvent::Log(vec![0]));
        }
        assert!(sub.dropped_count() > 0);
    }
}
