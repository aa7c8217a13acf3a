use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::FifoBuffer;
use super::SenderSink;
use super::SinkFactory;
use crate::entry::PooledEntry;
use crate::identity;
use crate::metrics::SENDER_LOST_ENTRIES;
use crate::SenderError;

/// Decides when a sender may start delivering.
pub type ReadinessPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Readiness used when none is given: the application identity is known.
pub fn default_readiness() -> ReadinessPredicate {
    Arc::new(identity::is_initialized)
}

/// Delivers entries to a sink, buffering them while the sink is not ready or
/// not connected.
///
/// Buffered entries are always delivered, in order, before a newer one. The
/// buffer starts at `initial_capacity`; after the first successful delivery it
/// shrinks to `steady_capacity`.
pub struct BufferedSender<F: SinkFactory> {
    factory: F,
    sink: Option<F::Sink>,
    buffer: FifoBuffer<PooledEntry>,
    steady_capacity: usize,
    steady: bool,
    ready: ReadinessPredicate,
    reported_losses: u64,
    delivered: u64,
}

impl<F: SinkFactory> BufferedSender<F> {
    pub fn new(
        factory: F,
        initial_capacity: usize,
        steady_capacity: usize,
        ready: ReadinessPredicate,
    ) -> Self {
        Self {
            factory,
            sink: None,
            buffer: FifoBuffer::new(initial_capacity),
            steady_capacity,
            steady: false,
            ready,
            reported_losses: 0,
            delivered: 0,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Losses already reported (counted once the buffer drained).
    pub fn reported_losses(&self) -> u64 {
        self.reported_losses
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Takes effect at the next transition to steady state, or now if
    /// already there.
    pub fn set_steady_capacity(
        &mut self,
        steady_capacity: usize,
    ) {
        self.steady_capacity = steady_capacity;
        if self.steady {
            self.buffer.set_capacity(steady_capacity);
        }
    }

    /// Sends `entry` after whatever is buffered, or buffers it.
    ///
    /// Only a persistent sink creation failure is an error.
    pub async fn send(
        &mut self,
        entry: &PooledEntry,
    ) -> Result<(), SenderError> {
        if !self.ensure_sink().await? || !self.flush().await {
            self.buffer.push(entry.clone());
            return Ok(());
        }

        let sent = match self.sink.as_mut() {
            Some(sink) => sink.try_send(entry).await,
            None => false,
        };
        if sent {
            self.on_delivered(1);
        } else {
            debug!(sink = %self.factory.name(), "send failed, buffering");
            self.buffer.push(entry.clone());
        }
        Ok(())
    }

    /// Reconnection probe and buffer flush.
    pub async fn on_timer(&mut self) -> Result<(), SenderError> {
        if self.ensure_sink().await? {
            self.flush().await;
        }
        Ok(())
    }

    /// Disposes the sink; undelivered entries are released.
    pub async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.dispose().await;
        }
        if !self.buffer.is_empty() {
            warn!(
                sink = %self.factory.name(),
                undelivered = self.buffer.len(),
                "sender closed with buffered entries"
            );
        }
        self.buffer.clear();
    }

    /// True when ready, created and connected.
    async fn ensure_sink(&mut self) -> Result<bool, SenderError> {
        if !(self.ready)() {
            return Ok(false);
        }
        if self.sink.is_none() {
            let sink = self.factory.create_sink().await?;
            info!(sink = %self.factory.name(), "sink created");
            self.sink = Some(sink);
        }
        match self.sink.as_mut() {
            Some(sink) if sink.is_connected() => Ok(true),
            Some(sink) => Ok(sink.reconnect().await),
            None => Ok(false),
        }
    }

    /// Sends buffered entries in order; false at the first failure.
    async fn flush(&mut self) -> bool {
        let mut sent = 0;
        let mut complete = true;
        if let Some(sink) = self.sink.as_mut() {
            while let Some(front) = self.buffer.front() {
                if !sink.try_send(front).await {
                    complete = false;
                    break;
                }
                self.buffer.pop_front();
                sent += 1;
            }
        }
        if sent > 0 {
            self.on_delivered(sent);
        }
        if complete {
            self.report_losses();
        }
        complete
    }

    fn on_delivered(
        &mut self,
        count: u64,
    ) {
        self.delivered += count;
        if !self.steady && self.buffer.is_empty() {
            self.steady = true;
            self.buffer.set_capacity(self.steady_capacity);
            debug!(
                sink = %self.factory.name(),
                capacity = self.steady_capacity,
                "sender reached steady state"
            );
        }
    }

    fn report_losses(&mut self) {
        let lost = self.buffer.take_lost();
        if lost == 0 {
            return;
        }
        let name = self.factory.name();
        warn!(sink = %name, lost, "entries were lost while the sink was unavailable");
        SENDER_LOST_ENTRIES.with_label_values(&[&name]).inc_by(lost);
        self.reported_losses += lost;
    }
}
