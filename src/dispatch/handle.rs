use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::engine::ConfigSnapshot;
use super::engine::DispatchEngine;
use super::engine::ExternalCallback;
use super::event::DispatchEvent;
use super::FilterAuthority;
use super::SourceMonitor;
use crate::config::DispatcherConfig;
use crate::config::Settings;
use crate::constants::DIAGNOSTIC_INTERVAL;
use crate::entry::EntryPool;
use crate::entry::PooledEntry;
use crate::handlers::HandlerContext;
use crate::handlers::LogHandler;
use crate::sender::ReadinessPredicate;
use crate::utils::rate_limited::RateLimitedLogger;
use crate::DispatchError;
use crate::Result;

const PIPELINE_ID_LENGTH: usize = 21;

struct DispatcherInner {
    events_tx: mpsc::UnboundedSender<DispatchEvent>,
    config_tx: watch::Sender<ConfigSnapshot>,
    applied_rx: watch::Receiver<u64>,
    closed: AtomicBool,
    force: Arc<AtomicBool>,
    rejected: AtomicU64,
    invalid: RateLimitedLogger,
    loop_handle: Mutex<Option<JoinHandle<()>>>,

    pool: EntryPool,
    filter: FilterAuthority,
    pipeline_id: String,
    stopping: CancellationToken,
}

/// Producer side of the pipeline. Cheap to clone; every clone feeds the
/// same dispatch loop.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn builder(config: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    /// Enqueues `entry`; never blocks. After shutdown, or when the entry
    /// breaks the record invariants, the entry is released and `false` is
    /// returned.
    pub fn send(
        &self,
        entry: PooledEntry,
    ) -> bool {
        if self.inner.closed.load(Ordering::Acquire) {
            self.inner.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if let Err(reason) = entry.validate() {
            self.inner.invalid.warn("invalid entry refused by the dispatcher", &reason);
            return false;
        }
        self.inner.events_tx.send(DispatchEvent::Entry(entry)).is_ok()
    }

    /// Publishes a new configuration snapshot and returns its version.
    ///
    /// Snapshots published faster than the loop applies them are skipped:
    /// only the latest one is applied.
    pub fn apply_configuration(
        &self,
        config: DispatcherConfig,
    ) -> u64 {
        let config = Arc::new(config);
        let mut version = 0;
        self.inner.config_tx.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot.config = config;
            version = snapshot.version;
        });
        if !self.inner.closed.load(Ordering::Acquire) {
            let _ = self.inner.events_tx.send(DispatchEvent::Reconfigure);
        }
        debug!(version, "configuration published");
        version
    }

    /// Same as [`apply_configuration`](Self::apply_configuration), then waits
    /// until the loop applied this snapshot (or a later one).
    pub async fn apply_configuration_and_wait(
        &self,
        config: DispatcherConfig,
        timeout: Duration,
    ) -> bool {
        let version = self.apply_configuration(config);
        self.wait_for_configuration(version, timeout).await
    }

    pub async fn wait_for_configuration(
        &self,
        version: u64,
        timeout: Duration,
    ) -> bool {
        let mut applied = self.inner.applied_rx.clone();
        let reached = matches!(
            tokio::time::timeout(timeout, applied.wait_for(|v| *v >= version)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// Last configuration version applied by the loop.
    pub fn applied_version(&self) -> u64 {
        *self.inner.applied_rx.borrow()
    }

    /// Adds a handler outside of the configuration; it is kept across
    /// reconfigurations until unregistered. `false` when the key is taken,
    /// the handler rejects activation or the dispatcher is closed.
    pub async fn register_handler(
        &self,
        key: impl Into<String>,
        handler: Box<dyn LogHandler>,
    ) -> bool {
        let (reply, response) = oneshot::channel();
        let event = DispatchEvent::RegisterHandler {
            key: key.into(),
            handler,
            reply,
        };
        if self.inner.closed.load(Ordering::Acquire) || self.inner.events_tx.send(event).is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }

    pub async fn unregister_handler(
        &self,
        key: impl Into<String>,
    ) -> bool {
        let (reply, response) = oneshot::channel();
        let event = DispatchEvent::UnregisterHandler { key: key.into(), reply };
        if self.inner.closed.load(Ordering::Acquire) || self.inner.events_tx.send(event).is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }

    pub fn create_monitor(
        &self,
        source_id: impl Into<String>,
    ) -> SourceMonitor {
        SourceMonitor::new(self.clone(), source_id)
    }

    pub fn pool(&self) -> &EntryPool {
        &self.inner.pool
    }

    pub fn filter(&self) -> &FilterAuthority {
        &self.inner.filter
    }

    pub fn pipeline_id(&self) -> &str {
        &self.inner.pipeline_id
    }

    /// Cancelled as soon as shutdown starts.
    pub fn stopping_token(&self) -> CancellationToken {
        self.inner.stopping.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Entries refused because they were sent after shutdown.
    pub fn rejected(&self) -> u64 {
        self.inner.rejected.load(Ordering::Relaxed)
    }

    /// Entries refused because they broke the record invariants.
    pub fn invalid(&self) -> u64 {
        self.inner.invalid.total()
    }

    /// Soft stop: everything sent before this call is delivered. When the loop
    /// does not finish within `grace`, it is forced to stop; queued entries
    /// are then released without delivery. A loop still stuck in a handler
    /// call `grace` later is aborted, skipping handler deactivation.
    ///
    /// Calling it again after the first call returns immediately.
    pub async fn shutdown(
        &self,
        grace: Duration,
    ) -> Result<()> {
        self.inner.stopping.cancel();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _ = self.inner.events_tx.send(DispatchEvent::Close);
        info!(pipeline = %self.inner.pipeline_id, "dispatcher shutting down");

        let handle = self.inner.loop_handle.lock().take();
        let Some(mut handle) = handle else {
            return Ok(());
        };
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(joined) => joined.map_err(DispatchError::LoopFailed)?,
            Err(_) => {
                warn!(?grace, "dispatch loop did not drain within the grace period, forcing stop");
                self.inner.force.store(true, Ordering::Release);
                if tokio::time::timeout(grace, &mut handle).await.is_err() {
                    // a handler call is stuck: dropping the task releases queued entries
                    error!(?grace, "dispatch loop still busy after forcing stop, aborting it");
                    handle.abort();
                }
                match handle.await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => return Err(DispatchError::LoopFailed(e).into()),
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pipeline_id", &self.inner.pipeline_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Assembles a [`Dispatcher`] and spawns its loop.
///
/// ```ignore
/// let dispatcher = DispatcherBuilder::new(config)
///     .log_root("/var/log/app")
///     .on_external_timer(|| broadcast_identity())
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    log_root: PathBuf,
    pool: Option<EntryPool>,
    filter: Option<FilterAuthority>,
    readiness: Option<ReadinessPredicate>,
    external_callback: Option<ExternalCallback>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            log_root: PathBuf::from("."),
            pool: None,
            filter: None,
            readiness: None,
            external_callback: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.dispatcher.clone())
            .log_root(settings.log_root.clone())
            .pool(EntryPool::from_config(&settings.pool))
    }

    pub fn log_root(
        mut self,
        log_root: impl Into<PathBuf>,
    ) -> Self {
        self.log_root = log_root.into();
        self
    }

    /// Defaults to the process-wide pool.
    pub fn pool(
        mut self,
        pool: EntryPool,
    ) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn filter(
        mut self,
        filter: FilterAuthority,
    ) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Readiness predicate given to the buffered senders.
    pub fn readiness(
        mut self,
        readiness: ReadinessPredicate,
    ) -> Self {
        self.readiness = Some(readiness);
        self
    }

    pub fn on_external_timer(
        mut self,
        callback: impl FnMut() + Send + 'static,
    ) -> Self {
        self.external_callback = Some(Box::new(callback));
        self
    }

    /// Validates the configuration and spawns the loop on the current tokio
    /// runtime.
    pub fn build(self) -> Result<Dispatcher> {
        self.config.validate()?;

        let pool = self.pool.unwrap_or_else(EntryPool::shared);
        let filter = self.filter.unwrap_or_default();
        filter.apply_config(&self.config);
        let mut context = HandlerContext::new(self.log_root);
        if let Some(readiness) = self.readiness {
            context = context.with_readiness(readiness);
        }
        let pipeline_id = nanoid::nanoid!(PIPELINE_ID_LENGTH);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (config_tx, config_rx) = watch::channel(ConfigSnapshot {
            version: 1,
            config: Arc::new(self.config),
        });
        let (applied_tx, applied_rx) = watch::channel(0);
        let force = Arc::new(AtomicBool::new(false));

        let engine = DispatchEngine::new(
            events_rx,
            config_rx,
            applied_tx,
            force.clone(),
            context,
            pool.clone(),
            filter.clone(),
            pipeline_id.clone(),
            self.external_callback,
        );
        let loop_handle = tokio::spawn(engine.run());
        debug!(%pipeline_id, "dispatch loop spawned");

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                events_tx,
                config_tx,
                applied_rx,
                closed: AtomicBool::new(false),
                force,
                rejected: AtomicU64::new(0),
                invalid: RateLimitedLogger::new(DIAGNOSTIC_INTERVAL),
                loop_handle: Mutex::new(Some(loop_handle)),
                pool,
                filter,
                pipeline_id,
                stopping: CancellationToken::new(),
            }),
        })
    }
}
