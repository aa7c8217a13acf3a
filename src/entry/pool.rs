//! Lock-free pool of reusable, reference-counted log records.
//!
//! A record leaves the pool through [`EntryPool::acquire`] as an [`EntryMut`]
//! (unique and mutable), becomes a shareable [`PooledEntry`] with
//! [`EntryMut::freeze`], and goes back to the pool when the last
//! `PooledEntry` is dropped. Cloning a `PooledEntry` is the retain operation,
//! dropping it is the release operation.
//!
//! The pool has two levels: a single fast slot that serves the common
//! "release one, acquire one" rhythm without touching the queue, and an idle
//! queue. Past the soft capacity the queue keeps accepting records and the
//! capacity doubles with a warning; past the hard maximum returned records are
//! abandoned and a rate-limited error is emitted.

use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use crossbeam::queue::SegQueue;
use lazy_static::lazy_static;
use tracing::warn;

use super::LogRecord;
use crate::config::PoolConfig;
use crate::constants::DEFAULT_POOL_CAPACITY;
use crate::constants::DEFAULT_POOL_MAX_CAPACITY;
use crate::constants::DIAGNOSTIC_INTERVAL;
use crate::metrics::POOL_DROPPED_ENTRIES;
use crate::utils::rate_limited::RateLimitedLogger;

lazy_static! {
    static ref SHARED_POOL: EntryPool = EntryPool::new(DEFAULT_POOL_CAPACITY, DEFAULT_POOL_MAX_CAPACITY);
}

struct EntrySlot {
    refs: AtomicUsize,
    record: LogRecord,
}

impl EntrySlot {
    fn new() -> Self {
        Self {
            refs: AtomicUsize::new(1),
            record: LogRecord::default(),
        }
    }
}

// Only used by `Arc::make_mut` when a recycled slot is still briefly shared
// with a handle that is finishing its own drop.
impl Clone for EntrySlot {
    fn clone(&self) -> Self {
        Self {
            refs: AtomicUsize::new(1),
            record: self.record.clone(),
        }
    }
}

struct PoolShared {
    fast_slot: ArrayQueue<Arc<EntrySlot>>,
    idle: SegQueue<Arc<EntrySlot>>,
    idle_count: AtomicUsize,
    alive: AtomicUsize,
    capacity: AtomicUsize,
    max_capacity: usize,
    allocated: AtomicU64,
    dropped: AtomicU64,
    double_releases: AtomicU64,
    overflow_logger: RateLimitedLogger,
    release_logger: RateLimitedLogger,
}

impl PoolShared {
    fn recycle(
        &self,
        mut slot: Arc<EntrySlot>,
    ) {
        self.alive.fetch_sub(1, Ordering::AcqRel);

        if let Some(s) = Arc::get_mut(&mut slot) {
            s.record.reset();
        }

        let slot = match self.fast_slot.push(slot) {
            Ok(()) => return,
            Err(slot) => slot,
        };

        let idle = self.idle_count.fetch_add(1, Ordering::AcqRel);
        if idle >= self.max_capacity {
            self.idle_count.fetch_sub(1, Ordering::AcqRel);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            POOL_DROPPED_ENTRIES.inc();
            self.overflow_logger.error(
                "entry pool exceeded its hard capacity, records are abandoned (unbalanced retain/release?)",
                &self.max_capacity,
            );
            return;
        }

        let capacity = self.capacity.load(Ordering::Acquire);
        if idle >= capacity {
            let grown = capacity.saturating_mul(2).min(self.max_capacity);
            if self
                .capacity
                .compare_exchange(capacity, grown, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                warn!(
                    previous = capacity,
                    capacity = grown,
                    max_capacity = self.max_capacity,
                    "entry pool soft capacity exceeded, growing"
                );
            }
        }
        self.idle.push(slot);
    }

    fn report_double_release(&self) {
        self.double_releases.fetch_add(1, Ordering::Relaxed);
        self.release_logger
            .error("pooled entry released more times than retained", &"refcount already zero");
    }
}

/// Point-in-time view of the pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Records currently checked out
    pub alive: usize,
    /// Records waiting for reuse (fast slot included)
    pub idle: usize,
    /// Current soft capacity
    pub capacity: usize,
    /// Records ever allocated by this pool
    pub allocated: u64,
    /// Records abandoned because the hard maximum was reached
    pub dropped: u64,
    /// Releases observed on an already-zero reference count
    pub double_releases: u64,
}

/// Handle to a pool; cheap to clone, all clones share the same records.
#[derive(Clone)]
pub struct EntryPool {
    shared: Arc<PoolShared>,
}

impl EntryPool {
    pub fn new(
        capacity: usize,
        max_capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        let max_capacity = max_capacity.max(capacity);
        Self {
            shared: Arc::new(PoolShared {
                fast_slot: ArrayQueue::new(1),
                idle: SegQueue::new(),
                idle_count: AtomicUsize::new(0),
                alive: AtomicUsize::new(0),
                capacity: AtomicUsize::new(capacity),
                max_capacity,
                allocated: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                double_releases: AtomicU64::new(0),
                overflow_logger: RateLimitedLogger::new(DIAGNOSTIC_INTERVAL),
                release_logger: RateLimitedLogger::new(DIAGNOSTIC_INTERVAL),
            }),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.capacity, config.max_capacity)
    }

    /// Process-wide default pool.
    pub fn shared() -> EntryPool {
        SHARED_POOL.clone()
    }

    /// Checks out a cleared record with a reference count of 1.
    ///
    /// Never blocks; allocates only when both pool levels are empty.
    pub fn acquire(&self) -> EntryMut {
        let shared = &self.shared;
        let pooled = shared.fast_slot.pop().or_else(|| {
            let slot = shared.idle.pop();
            if slot.is_some() {
                shared.idle_count.fetch_sub(1, Ordering::AcqRel);
            }
            slot
        });

        let mut slot = match pooled {
            Some(slot) => slot,
            None => {
                shared.allocated.fetch_add(1, Ordering::Relaxed);
                Arc::new(EntrySlot::new())
            }
        };

        {
            let s = Arc::make_mut(&mut slot);
            s.record.reset();
            *s.refs.get_mut() = 1;
        }
        shared.alive.fetch_add(1, Ordering::AcqRel);

        EntryMut {
            entry: PooledEntry {
                slot: Some(slot),
                pool: Arc::clone(shared),
            },
        }
    }

    /// Checks out a record initialized as a copy of `record`.
    pub fn acquire_from(
        &self,
        record: &LogRecord,
    ) -> PooledEntry {
        let mut entry = self.acquire();
        entry.assign(record);
        entry.freeze()
    }

    pub fn alive(&self) -> usize {
        self.shared.alive.load(Ordering::Acquire)
    }

    pub fn idle(&self) -> usize {
        self.shared.idle_count.load(Ordering::Acquire) + self.shared.fast_slot.len()
    }

    pub fn stats(&self) -> PoolStats {
        let s = &self.shared;
        PoolStats {
            alive: self.alive(),
            idle: self.idle(),
            capacity: s.capacity.load(Ordering::Acquire),
            allocated: s.allocated.load(Ordering::Relaxed),
            dropped: s.dropped.load(Ordering::Relaxed),
            double_releases: s.double_releases.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for EntryPool {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EntryPool").field("stats", &self.stats()).finish()
    }
}

/// A checked-out record still owned by its producer.
pub struct EntryMut {
    entry: PooledEntry,
}

impl EntryMut {
    /// Publishes the record; it can no longer be mutated.
    pub fn freeze(self) -> PooledEntry {
        self.entry
    }
}

impl Deref for EntryMut {
    type Target = LogRecord;

    fn deref(&self) -> &LogRecord {
        &self.entry.slot().record
    }
}

impl DerefMut for EntryMut {
    fn deref_mut(&mut self) -> &mut LogRecord {
        let slot = self.entry.slot.as_mut().expect("pooled slot is only taken on drop");
        &mut Arc::make_mut(slot).record
    }
}

/// Shared, read-only handle on a pooled record.
///
/// `clone` retains the record, `drop` releases it.
pub struct PooledEntry {
    /// Always `Some` until the handle is dropped.
    slot: Option<Arc<EntrySlot>>,
    pool: Arc<PoolShared>,
}

impl PooledEntry {
    /// Current number of handles on this record.
    pub fn ref_count(&self) -> usize {
        self.slot().refs.load(Ordering::Acquire)
    }

    pub fn record(&self) -> &LogRecord {
        &self.slot().record
    }

    fn slot(&self) -> &Arc<EntrySlot> {
        self.slot.as_ref().expect("pooled slot is only taken on drop")
    }
}

impl Deref for PooledEntry {
    type Target = LogRecord;

    fn deref(&self) -> &LogRecord {
        &self.slot().record
    }
}

impl Clone for PooledEntry {
    fn clone(&self) -> Self {
        let slot = self.slot();
        slot.refs.fetch_add(1, Ordering::AcqRel);
        PooledEntry {
            slot: Some(Arc::clone(slot)),
            pool: Arc::clone(&self.pool),
        }
    }
}

impl Drop for PooledEntry {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        match slot.refs.fetch_sub(1, Ordering::AcqRel) {
            1 => self.pool.recycle(slot),
            0 => {
                slot.refs.store(0, Ordering::Release);
                self.pool.report_double_release();
            }
            _ => {}
        }
    }
}

impl std::fmt::Debug for PooledEntry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PooledEntry")
            .field("refs", &self.ref_count())
            .field("record", self.record())
            .finish()
    }
}
