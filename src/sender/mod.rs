//! Buffered delivery to sinks that are not always reachable.
//!
//! [`BufferedSender`] owns a sink built by a [`SinkFactory`] and a
//! [`FifoBuffer`] of retained entries. Connectivity problems are absorbed by
//! the buffer; only a failure to build the sink at all surfaces as an error.

mod buffered;
mod fifo;
mod tcp;

pub use buffered::*;
pub use fifo::*;
pub use tcp::*;


use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::entry::LogRecord;
use crate::SenderError;

/// Destination of a [`BufferedSender`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SenderSink: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    /// Delivers one record; `false` leaves it to the caller to retry later.
    async fn try_send(
        &mut self,
        record: &LogRecord,
    ) -> bool;

    /// Reconnection probe; returns whether the sink is now connected.
    async fn reconnect(&mut self) -> bool;

    async fn dispose(&mut self);
}

/// Builds sinks. An error here is persistent (bad configuration) and is
/// never retried.
#[cfg_attr(test, automock(type Sink = MockSenderSink;))]
#[async_trait]
pub trait SinkFactory: Send + Sync + 'static {
    type Sink: SenderSink;

    /// Label used in diagnostics and metrics
    fn name(&self) -> String;

    async fn create_sink(&self) -> Result<Self::Sink, SenderError>;
}
