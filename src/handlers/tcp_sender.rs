use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::LogHandler;
use crate::config::HandlerConfig;
use crate::config::TcpSenderConfig;
use crate::entry::PooledEntry;
use crate::sender::BufferedSender;
use crate::sender::ReadinessPredicate;
use crate::sender::TcpSinkFactory;
use crate::Result;

/// Streams entries to a remote collector as a `.ckmon` stream over TCP,
/// buffering while the collector is unreachable.
pub struct TcpSenderHandler {
    config: TcpSenderConfig,
    sender: BufferedSender<TcpSinkFactory>,
}

impl TcpSenderHandler {
    pub fn new(
        config: TcpSenderConfig,
        readiness: ReadinessPredicate,
    ) -> Self {
        let factory = TcpSinkFactory::new(config.address.clone(), config.backoff);
        let sender = BufferedSender::new(
            factory,
            config.initial_buffer_size,
            config.steady_buffer_size,
            readiness,
        );
        Self { config, sender }
    }

    pub fn sender(&self) -> &BufferedSender<TcpSinkFactory> {
        &self.sender
    }
}

#[async_trait]
impl LogHandler for TcpSenderHandler {
    async fn activate(&mut self) -> bool {
        info!(address = %self.config.address, "tcp sender activated");
        true
    }

    async fn apply_configuration(
        &mut self,
        config: &HandlerConfig,
    ) -> Result<bool> {
        match config {
            HandlerConfig::TcpSender(c) if c.address == self.config.address => {
                self.sender.set_steady_capacity(c.steady_buffer_size);
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
        self.sender.send(entry).await?;
        Ok(())
    }

    async fn on_timer(
        &mut self,
        _elapsed: Duration,
    ) -> Result<()> {
        self.sender.on_timer().await?;
        Ok(())
    }

    async fn deactivate(&mut self) {
        self.sender.close().await;
    }
}

impl std::fmt::Debug for TcpSenderHandler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TcpSenderHandler")
            .field("address", &self.config.address)
            .field("buffered", &self.sender.buffered())
            .finish()
    }
}
