//! In-memory handler, used to observe the pipeline from tests and tools.
//!
//! Handlers with the same name share one [`MemoryCollector`], which outlives
//! them: a collector can be inspected after its handler is gone.

use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::LogHandler;
use crate::config::HandlerConfig;
use crate::config::MemoryConfig;
use crate::entry::PooledEntry;
use crate::Result;

lazy_static! {
    static ref COLLECTORS: DashMap<String, Arc<MemoryCollector>> = DashMap::new();
}

/// Returns the collector registered under `name`, creating it if needed.
pub fn collector(name: &str) -> Arc<MemoryCollector> {
    COLLECTORS
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(MemoryCollector::new(name)))
        .clone()
}

/// Forgets the collector registered under `name`; entries it holds are
/// released once the last reference is gone.
pub fn remove_collector(name: &str) -> Option<Arc<MemoryCollector>> {
    COLLECTORS.remove(name).map(|(_, c)| c)
}

#[derive(Debug)]
pub struct MemoryCollector {
    name: String,
    entries: Mutex<VecDeque<PooledEntry>>,
    max_entries: AtomicUsize,
    received: AtomicU64,
    activations: AtomicU64,
    deactivations: AtomicU64,
    changed: Notify,
}

impl MemoryCollector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(VecDeque::new()),
            max_entries: AtomicUsize::new(0),
            received: AtomicU64::new(0),
            activations: AtomicU64::new(0),
            deactivations: AtomicU64::new(0),
            changed: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 0 keeps everything.
    pub fn set_max_entries(
        &self,
        max_entries: usize,
    ) {
        self.max_entries.store(max_entries, Ordering::Release);
        let mut entries = self.entries.lock();
        Self::evict(&mut entries, max_entries);
    }

    pub fn push(
        &self,
        entry: PooledEntry,
    ) {
        {
            let mut entries = self.entries.lock();
            entries.push_back(entry);
            Self::evict(&mut entries, self.max_entries.load(Ordering::Acquire));
        }
        self.received.fetch_add(1, Ordering::AcqRel);
        self.changed.notify_waiters();
    }

    fn evict(
        entries: &mut VecDeque<PooledEntry>,
        max_entries: usize,
    ) {
        if max_entries == 0 {
            return;
        }
        while entries.len() > max_entries {
            entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries ever pushed, evicted ones included.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }

    pub fn entries(&self) -> Vec<PooledEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|e| e.text_or_empty().to_string())
            .collect()
    }

    /// Releases the held entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn activations(&self) -> u64 {
        self.activations.load(Ordering::Acquire)
    }

    pub fn deactivations(&self) -> u64 {
        self.deactivations.load(Ordering::Acquire)
    }

    /// Waits until at least `count` entries were received; false on timeout.
    pub async fn wait_for_received(
        &self,
        count: u64,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            if self.received() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.received() >= count;
            }
        }
    }
}

/// Keeps (retains) every entry it receives in its collector.
#[derive(Debug)]
pub struct MemoryHandler {
    config: MemoryConfig,
    collector: Arc<MemoryCollector>,
}

impl MemoryHandler {
    pub fn new(config: MemoryConfig) -> Self {
        let collector = collector(&config.name);
        collector.set_max_entries(config.max_entries);
        Self { config, collector }
    }

    /// Handler on a collector that is not in the shared registry.
    pub fn detached(collector: Arc<MemoryCollector>) -> Self {
        Self {
            config: MemoryConfig::new(collector.name()),
            collector,
        }
    }

    pub fn collector(&self) -> &Arc<MemoryCollector> {
        &self.collector
    }
}

#[async_trait]
impl LogHandler for MemoryHandler {
    async fn activate(&mut self) -> bool {
        self.collector.activations.fetch_add(1, Ordering::AcqRel);
        true
    }

    async fn apply_configuration(
        &mut self,
        config: &HandlerConfig,
    ) -> Result<bool> {
        match config {
            HandlerConfig::Memory(c) if c.name == self.config.name => {
                self.collector.set_max_entries(c.max_entries);
                self.config = c.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn handle(
        &mut self,
        entry: &PooledEntry,
    ) -> Result<()> {
        self.collector.push(entry.clone());
        Ok(())
    }

    async fn on_timer(
        &mut self,
        _elapsed: Duration,
    ) -> Result<()> {
        Ok(())
    }

    async fn deactivate(&mut self) {
        self.collector.deactivations.fetch_add(1, Ordering::AcqRel);
    }
}
