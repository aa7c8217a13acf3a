//! `ckmon`: a structured log-event pipeline.
//!
//! Producers build pooled [`LogRecord`]s (directly or through a
//! [`SourceMonitor`]) and hand them to a [`Dispatcher`]. A single loop task
//! delivers them to the configured output handlers: rotating binary
//! (`.ckmon`) and text files, console, a buffered TCP sender and in-memory
//! collectors. `.ckmon` streams are read back with [`StreamReader`].

pub mod codec;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod entry;
mod errors;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod reader;
pub mod sender;
pub mod utils;

pub use config::Settings;
pub use dispatch::Dispatcher;
pub use dispatch::DispatcherBuilder;
pub use dispatch::SourceMonitor;
pub use entry::EntryPool;
pub use entry::LogLevel;
pub use entry::LogRecord;
pub use entry::PooledEntry;
pub use errors::*;
pub use reader::StreamReader;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
