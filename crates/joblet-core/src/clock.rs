// SPDX-License-Identifier: MIT
//! Clock abstraction so timing-sensitive code (the scheduler, step
//! timestamps) can be tested without sleeping.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A source of "now", injectable for deterministic tests.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant, used for scheduling and elapsed-time math.
    fn now(&self) -> Instant;

    /// Wall-clock time in milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;
}

/// Production clock backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A clock whose `now()`/`epoch_ms()` are advanced manually by tests.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockState>>,
}

struct FakeClockState {
    base_instant: Instant,
    elapsed: Duration,
    epoch_ms: u64,
}

impl FakeClock {
    pub fn new(epoch_ms: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockState {
                base_instant: Instant::now(),
                elapsed: Duration::ZERO,
                epoch_ms,
            })),
        }
    }

    /// Advance both the monotonic and wall clocks by `d`.
    pub fn advance(&self, d: Duration) {
        let mut state = self.inner.lock();
        state.elapsed += d;
        state.epoch_ms += d.as_millis() as u64;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        let state = self.inner.lock();
        state.base_instant + state.elapsed
    }

    fn epoch_ms(&self) -> u64 {
        self.inner.lock().epoch_ms
    }
}
