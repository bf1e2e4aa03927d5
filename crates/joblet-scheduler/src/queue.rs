// SPDX-License-Identifier: MIT
//! Time-ordered deferred-job queue (§4.5): a priority queue keyed on
//! absolute due time, protected by a mutex.

use joblet_core::id::JobId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Eq, PartialEq)]
struct Entry {
    due_ms: u64,
    job_id: JobId,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so `BinaryHeap` (a max-heap) pops the *earliest* due time.
        other.due_ms.cmp(&self.due_ms).then_with(|| other.job_id.cmp(&self.job_id))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The mutex-protected heap itself, split out from the coordinator loop so
/// `schedule`/`cancel` can be called independently of the wake logic.
#[derive(Default)]
pub struct DueQueue {
    heap: Mutex<BinaryHeap<Entry>>,
}

impl DueQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, job_id: JobId, due_ms: u64) {
        self.heap.lock().await.push(Entry { due_ms, job_id });
    }

    /// Remove every queued entry for `job_id`. Returns whether anything was
    /// removed.
    pub async fn cancel(&self, job_id: &JobId) -> bool {
        let mut heap = self.heap.lock().await;
        let before = heap.len();
        let remaining: BinaryHeap<Entry> = heap.drain().filter(|e| &e.job_id != job_id).collect();
        *heap = remaining;
        heap.len() != before
    }

    /// The due time of the earliest entry, if any.
    pub async fn peek_due_ms(&self) -> Option<u64> {
        self.heap.lock().await.peek().map(|e| e.due_ms)
    }

    /// Pop the earliest entry if it's due at or before `now_ms`.
    pub async fn pop_if_due(&self, now_ms: u64) -> Option<JobId> {
        let mut heap = self.heap.lock().await;
        if heap.peek().is_some_and(|e| e.due_ms <= now_ms) {
            heap.pop().map(|e| e.job_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_in_due_order() {
        let queue = DueQueue::new();
        let a = JobId::generate();
        let b = JobId::generate();
        queue.push(a.clone(), 200).await;
        queue.push(b.clone(), 100).await;

        assert_eq!(queue.pop_if_due(1_000).await, Some(b));
        assert_eq!(queue.pop_if_due(1_000).await, Some(a));
        assert_eq!(queue.pop_if_due(1_000).await, None);
    }

    #[tokio::test]
    async fn pop_if_due_respects_now() {
        let queue = DueQueue::new();
        let id = JobId::generate();
        queue.push(id.clone(), 500).await;
        assert_eq!(queue.pop_if_due(100).await, None);
        assert_eq!(queue.pop_if_due(500).await, Some(id));
    }

    #[tokio::test]
    async fn cancel_removes_matching_entry() {
        let queue = DueQueue::new();
        let id = JobId::generate();
        queue.push(id.clone(), 100).await;
        assert!(queue.cancel(&id).await);
        assert_eq!(queue.peek_due_ms().await, None);
        assert!(!queue.cancel(&id).await);
    }
}
