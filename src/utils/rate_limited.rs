//! Rate-limited diagnostics.
//!
//! Under a sustained fault (pool overflow, a flapping sink) the same message
//! would otherwise be emitted once per event. `RateLimitedLogger` emits at
//! most once per interval and reports how many occurrences were suppressed.

use std::fmt::Display;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Mutex;

pub struct RateLimitedLogger {
    min_interval: Duration,
    last_emit: Mutex<Option<Instant>>,
    pending: AtomicU64,
    total: AtomicU64,
}

impl RateLimitedLogger {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Counts one occurrence and emits an `error!` when the interval allows.
    ///
    /// Returns whether the message was emitted.
    pub fn error(
        &self,
        message: &str,
        detail: &dyn Display,
    ) -> bool {
        if !self.record() {
            return false;
        }
        let suppressed = self.pending.swap(0, Ordering::Relaxed).saturating_sub(1);
        let total = self.total.load(Ordering::Relaxed);
        tracing::error!(%detail, suppressed, total, "{}", message);
        true
    }

    /// Same as [`error`](Self::error) at warn level.
    pub fn warn(
        &self,
        message: &str,
        detail: &dyn Display,
    ) -> bool {
        if !self.record() {
            return false;
        }
        let suppressed = self.pending.swap(0, Ordering::Relaxed).saturating_sub(1);
        let total = self.total.load(Ordering::Relaxed);
        tracing::warn!(%detail, suppressed, total, "{}", message);
        true
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn record(&self) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut last = self.last_emit.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
