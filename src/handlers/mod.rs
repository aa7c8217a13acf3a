//! Output handlers.
//!
//! Every handler implements the [`LogHandler`] lifecycle. The engine owns
//! them as the closed [`Handler`] enum: one variant per configured output
//! kind, plus [`Handler::Dynamic`] for handlers registered at runtime
//! through the dispatcher.

mod console;
mod file;
mod format;
mod memory;
mod rotating_file;
mod tcp_sender;

pub use console::*;
pub use file::*;
pub use format::*;
pub use memory::*;
pub use rotating_file::*;
pub use tcp_sender::*;


use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::config::HandlerConfig;
use crate::config::HandlerKind;
use crate::entry::PooledEntry;
use crate::sender::default_readiness;
use crate::sender::ReadinessPredicate;
use crate::Result;

/// Lifecycle of an output handler.
///
/// The dispatch loop is the only caller: calls never overlap, and
/// `deactivate` is called at most once per successful `activate`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LogHandler: Send + 'static {
    /// Prepares resources; `false` means "do not add me".
    async fn activate(&mut self) -> bool;

    /// `Ok(true)` when `config` describes this same handler with new
    /// parameters, which are then applied in place.
    async fn apply_configuration(
        &mut self,
        config: &HandlerConfig,
    ) -> Result<bool>;

    async fn handle(
        &mut self,
        entry: &PooledEntry,
    ) -> Result<()>;

    /// Periodic housekeeping.
    async fn on_timer(
        &mut self,
        elapsed: Duration,
    ) -> Result<()>;

    async fn deactivate(&mut self);
}

/// What configured handlers need from their environment.
#[derive(Clone)]
pub struct HandlerContext {
    pub log_root: PathBuf,
    pub readiness: ReadinessPredicate,
}

impl HandlerContext {
    pub fn new(log_root: impl Into<PathBuf>) -> Self {
        Self {
            log_root: log_root.into(),
            readiness: default_readiness(),
        }
    }

    pub fn with_readiness(
        mut self,
        readiness: ReadinessPredicate,
    ) -> Self {
        self.readiness = readiness;
        self
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("HandlerContext").field("log_root", &self.log_root).finish()
    }
}

pub enum Handler {
    BinaryFile(FileHandler),
    TextFile(FileHandler),
    Console(ConsoleHandler),
    TcpSender(TcpSenderHandler),
    Memory(MemoryHandler),
    Dynamic(Box<dyn LogHandler>),
}

impl Handler {
    /// Instantiates the handler a configuration describes (not activated).
    pub fn from_config(
        config: &HandlerConfig,
        context: &HandlerContext,
    ) -> Handler {
        match config {
            HandlerConfig::BinaryFile(c) => Handler::BinaryFile(FileHandler::binary(&context.log_root, c.clone())),
            HandlerConfig::TextFile(c) => Handler::TextFile(FileHandler::text(&context.log_root, c.clone())),
            HandlerConfig::Console(c) => Handler::Console(ConsoleHandler::new(c.clone())),
            HandlerConfig::TcpSender(c) => Handler::TcpSender(TcpSenderHandler::new(c.clone(), context.readiness.clone())),
            HandlerConfig::Memory(c) => Handler::Memory(MemoryHandler::new(c.clone())),
        }
    }

    pub fn kind(&self) -> Option<HandlerKind> {
        match self {
            Handler::BinaryFile(_) => Some(HandlerKind::BinaryFile),
            Handler::TextFile(_) => Some(HandlerKind::TextFile),
            Handler::Console(_) => Some(HandlerKind::Console),
            Handler::TcpSender(_) => Some(HandlerKind::TcpSender),
            Handler::Memory(_) => Some(HandlerKind::Memory),
            Handler::Dynamic(_) => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Handler::Dynamic(_))
    }

    fn as_dyn(&mut self) -> &mut dyn LogHandler {
        match self {
            Handler::BinaryFile(h) | Handler::TextFile(h) => h,
            Handler::Console(h) => h,
            Handler::TcpSender(h) => h,
            Handler::Memory(h) => h,
            Handler::Dynamic(h) => h.as_mut(),
        }
    }
}

#[async_trait]
impl LogHandler for Handler {
    async fn activate(&mut self) -> bool {
        self.as_dyn().activate().await
    }

    async fn apply_configuration(
        &mut self,
        config: &HandlerConfig,
    ) -> Result<bool> {
        self.as_dyn().apply_configuration(config).await
    }

    async fn handle(
        &mut self,
        entry: &PooledEntry,
    ) -> Result<()> {
        self.as_dyn().handle(entry).await
    }

    async fn on_timer(
        &mut self,
        elapsed: Duration,
    ) -> Result<()> {
        self.as_dyn().on_timer(elapsed).await
    }

    async fn deactivate(&mut self) {
        self.as_dyn().deactivate().await
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "Handler::{kind}"),
            None => f.write_str("Handler::Dynamic"),
        }
    }
}
