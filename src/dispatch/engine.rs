//! The single consumer of the pipeline.
//!
//! One tokio task owns every handler. Producers only enqueue
//! [`DispatchEvent`]s; configuration snapshots travel on a `watch` channel so
//! that the loop always applies the latest one and skips superseded ones.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::event::DispatchEvent;
use super::timer::DispatchTimer;
use super::FilterAuthority;
use crate::config::DispatcherConfig;
use crate::config::HandlerConfig;
use crate::constants::PIPELINE_SOURCE_ID;
use crate::entry::DateTimeStamp;
use crate::entry::EntryPool;
use crate::entry::ExceptionData;
use crate::entry::LogLevel;
use crate::entry::LogRecord;
use crate::entry::PooledEntry;
use crate::handlers::Handler;
use crate::handlers::HandlerContext;
use crate::handlers::LogHandler;
use crate::metrics::CONFIGURATIONS_APPLIED;
use crate::metrics::DISPATCHED_ENTRIES;
use crate::metrics::HANDLER_FAULTS;
use crate::Error;

/// Called from the loop every external timer interval.
pub type ExternalCallback = Box<dyn FnMut() + Send>;

/// Versioned configuration snapshot, as published on the watch channel.
#[derive(Debug, Clone)]
pub(crate) struct ConfigSnapshot {
    pub(crate) version: u64,
    pub(crate) config: Arc<DispatcherConfig>,
}

struct HandlerSlot {
    /// Registration key for dynamic handlers, `kind:key` otherwise
    name: String,
    handler: Handler,
    fault: Option<String>,
}

impl HandlerSlot {
    fn configured(
        config: &HandlerConfig,
        handler: Handler,
    ) -> Self {
        Self {
            name: configured_name(config),
            handler,
            fault: None,
        }
    }
}

fn configured_name(config: &HandlerConfig) -> String {
    format!("{}:{}", config.kind(), config.key())
}

pub(crate) struct DispatchEngine {
    events_rx: mpsc::UnboundedReceiver<DispatchEvent>,
    config_rx: watch::Receiver<ConfigSnapshot>,
    applied_tx: watch::Sender<u64>,
    force: Arc<AtomicBool>,

    handlers: Vec<HandlerSlot>,
    backlog: VecDeque<PooledEntry>,
    timer: DispatchTimer,
    external_callback: Option<ExternalCallback>,

    context: HandlerContext,
    pool: EntryPool,
    filter: FilterAuthority,
    pipeline_id: String,
}

impl DispatchEngine {
    pub(crate) fn new(
        events_rx: mpsc::UnboundedReceiver<DispatchEvent>,
        config_rx: watch::Receiver<ConfigSnapshot>,
        applied_tx: watch::Sender<u64>,
        force: Arc<AtomicBool>,
        context: HandlerContext,
        pool: EntryPool,
        filter: FilterAuthority,
        pipeline_id: String,
        external_callback: Option<ExternalCallback>,
    ) -> Self {
        let timer = {
            let snapshot = config_rx.borrow();
            DispatchTimer::new(
                snapshot.config.timer_duration(),
                snapshot.config.external_timer_duration(),
            )
        };
        Self {
            events_rx,
            config_rx,
            applied_tx,
            force,
            handlers: Vec::new(),
            backlog: VecDeque::new(),
            timer,
            external_callback,
            context,
            pool,
            filter,
            pipeline_id,
        }
    }

    pub(crate) async fn run(mut self) {
        let initial = self.config_rx.borrow_and_update().clone();
        self.apply_snapshot(initial).await;
        info!(pipeline = %self.pipeline_id, "dispatch loop started");

        loop {
            if self.force.load(Ordering::Acquire) {
                warn!(pipeline = %self.pipeline_id, "dispatch loop forced to stop");
                break;
            }

            let event = match self.backlog.pop_front() {
                Some(entry) => Some(DispatchEvent::Entry(entry)),
                None => {
                    let tick = sleep_until(self.timer.next_deadline());
                    tokio::select! {
                        biased;
                        event = self.events_rx.recv() => match event {
                            Some(event) => Some(event),
                            None => {
                                debug!("every producer handle is gone");
                                break;
                            }
                        },
                        _ = tick => {
                            trace!("dispatch tick");
                            None
                        }
                    }
                }
            };

            self.apply_pending_configuration().await;

            if let Some(event) = event {
                match event {
                    DispatchEvent::Entry(entry) => self.dispatch(&entry).await,
                    DispatchEvent::Reconfigure => {}
                    DispatchEvent::RegisterHandler { key, handler, reply } => {
                        let added = self.register(key, handler).await;
                        let _ = reply.send(added);
                    }
                    DispatchEvent::UnregisterHandler { key, reply } => {
                        let removed = self.unregister(&key).await;
                        let _ = reply.send(removed);
                    }
                    DispatchEvent::Close => {
                        debug!("close sentinel received");
                        break;
                    }
                }
            }

            self.run_timers().await;
            self.remove_faulty().await;
        }

        self.stop().await;
    }

    async fn dispatch(
        &mut self,
        entry: &PooledEntry,
    ) {
        DISPATCHED_ENTRIES.inc();
        for slot in self.handlers.iter_mut().filter(|s| s.fault.is_none()) {
            if let Err(e) = slot.handler.handle(entry).await {
                error!(handler = %slot.name, error = %e, "handler failed to handle an entry");
                slot.fault = Some(e.to_string());
            }
        }
    }

    async fn run_timers(&mut self) {
        let now = Instant::now();
        if !self.timer.is_tick_expired(now) {
            return;
        }
        self.timer.reset_tick(now);

        let interval = self.timer.tick_interval();
        for slot in self.handlers.iter_mut().filter(|s| s.fault.is_none()) {
            if let Err(e) = slot.handler.on_timer(interval).await {
                error!(handler = %slot.name, error = %e, "handler timer failed");
                slot.fault = Some(e.to_string());
            }
        }

        if self.timer.is_external_expired(now) {
            self.timer.reset_external(now);
            if let Some(callback) = self.external_callback.as_mut() {
                callback();
            }
        }
    }

    /// Deactivates and drops the handlers that failed during this iteration;
    /// each failure becomes an error entry for the remaining handlers.
    async fn remove_faulty(&mut self) {
        if self.handlers.iter().all(|s| s.fault.is_none()) {
            return;
        }
        let (faulty, healthy): (Vec<_>, Vec<_>) = std::mem::take(&mut self.handlers)
            .into_iter()
            .partition(|s| s.fault.is_some());
        self.handlers = healthy;

        for mut slot in faulty {
            slot.handler.deactivate().await;
            let reason = slot.fault.take().unwrap_or_default();
            self.report_fault(&slot, reason);
        }
    }

    fn report_fault(
        &mut self,
        slot: &HandlerSlot,
        reason: String,
    ) {
        let kind = slot
            .handler
            .kind()
            .map(|k| k.name())
            .unwrap_or("Dynamic");
        HANDLER_FAULTS.with_label_values(&[kind]).inc();
        warn!(handler = %slot.name, %reason, "faulty handler removed");

        let error = Error::Fatal(format!("handler {} removed: {}", slot.name, reason));
        let record = LogRecord::line(
            LogLevel::Error,
            DateTimeStamp::now(),
            format!("Handler '{}' failed and has been removed.", slot.name),
        )
        .with_exception(ExceptionData::from_error(&error))
        .with_source(PIPELINE_SOURCE_ID, 0)
        .with_multicast(self.pipeline_id.clone(), None);
        self.backlog.push_back(self.pool.acquire_from(&record));
    }

    async fn apply_pending_configuration(&mut self) {
        if !matches!(self.config_rx.has_changed(), Ok(true)) {
            return;
        }
        let snapshot = self.config_rx.borrow_and_update().clone();
        self.apply_snapshot(snapshot).await;
    }

    /// Reuses every existing handler that accepts one of the new
    /// configurations, replaces the others. Dynamic handlers are kept as is.
    async fn apply_snapshot(
        &mut self,
        snapshot: ConfigSnapshot,
    ) {
        let config = snapshot.config;
        let (dynamic, mut existing): (Vec<_>, Vec<_>) = std::mem::take(&mut self.handlers)
            .into_iter()
            .partition(|s| s.handler.is_dynamic());

        let mut matched: Vec<Option<HandlerSlot>> = config.handlers.iter().map(|_| None).collect();
        for (i, handler_config) in config.handlers.iter().enumerate() {
            let mut j = 0;
            while j < existing.len() {
                let slot = &mut existing[j];
                if slot.fault.is_some() {
                    j += 1;
                    continue;
                }
                match slot.handler.apply_configuration(handler_config).await {
                    Ok(true) => {
                        let mut slot = existing.remove(j);
                        slot.name = configured_name(handler_config);
                        matched[i] = Some(slot);
                        break;
                    }
                    Ok(false) => j += 1,
                    Err(e) => {
                        error!(handler = %slot.name, error = %e, "handler failed to apply a configuration");
                        slot.fault = Some(e.to_string());
                        j += 1;
                    }
                }
            }
        }

        for mut slot in existing {
            slot.handler.deactivate().await;
            match slot.fault.take() {
                Some(reason) => self.report_fault(&slot, reason),
                None => debug!(handler = %slot.name, "handler replaced or removed"),
            }
        }

        let mut handlers = Vec::with_capacity(matched.len() + dynamic.len());
        for (handler_config, reused) in config.handlers.iter().zip(matched) {
            if let Some(slot) = reused {
                handlers.push(slot);
                continue;
            }
            let mut handler = Handler::from_config(handler_config, &self.context);
            if handler.activate().await {
                info!(kind = %handler_config.kind(), key = %handler_config.key(), "handler activated");
                handlers.push(HandlerSlot::configured(handler_config, handler));
            } else {
                warn!(kind = %handler_config.kind(), key = %handler_config.key(), "handler rejected its activation");
            }
        }
        handlers.extend(dynamic);
        self.handlers = handlers;

        self.filter.apply_config(&config);
        self.timer
            .set_intervals(config.timer_duration(), config.external_timer_duration());
        let _ = self.applied_tx.send(snapshot.version);
        CONFIGURATIONS_APPLIED.inc();
        info!(
            version = snapshot.version,
            handlers = self.handlers.len(),
            "configuration applied"
        );
    }

    async fn register(
        &mut self,
        key: String,
        handler: Box<dyn LogHandler>,
    ) -> bool {
        if self.handlers.iter().any(|s| s.handler.is_dynamic() && s.name == key) {
            warn!(%key, "a dynamic handler is already registered under this key");
            return false;
        }
        let mut handler = Handler::Dynamic(handler);
        if !handler.activate().await {
            warn!(%key, "dynamic handler rejected its activation");
            return false;
        }
        debug!(%key, "dynamic handler registered");
        self.handlers.push(HandlerSlot {
            name: key,
            handler,
            fault: None,
        });
        true
    }

    async fn unregister(
        &mut self,
        key: &str,
    ) -> bool {
        let position = self
            .handlers
            .iter()
            .position(|s| s.handler.is_dynamic() && s.name == key);
        match position {
            Some(i) => {
                let mut slot = self.handlers.remove(i);
                slot.handler.deactivate().await;
                debug!(%key, "dynamic handler unregistered");
                true
            }
            None => false,
        }
    }

    /// Releases whatever is still queued and deactivates every handler.
    async fn stop(&mut self) {
        self.events_rx.close();
        let mut released = self.backlog.len();
        self.backlog.clear();
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                DispatchEvent::Entry(_) => released += 1,
                DispatchEvent::RegisterHandler { reply, .. } => {
                    let _ = reply.send(false);
                }
                DispatchEvent::UnregisterHandler { reply, .. } => {
                    let _ = reply.send(false);
                }
                DispatchEvent::Reconfigure | DispatchEvent::Close => {}
            }
        }
        if released > 0 {
            debug!(released, "queued entries released without delivery");
        }

        for mut slot in std::mem::take(&mut self.handlers) {
            slot.handler.deactivate().await;
        }
        info!(pipeline = %self.pipeline_id, "dispatch loop stopped");
    }
}
