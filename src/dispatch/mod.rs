//! Single-consumer dispatch of log entries to the output handlers.
//!
//! Producers hold a [`Dispatcher`] (or a [`SourceMonitor`] built from it) and
//! only ever enqueue. One loop task delivers entries, runs the periodic
//! housekeeping and applies configuration snapshots.

mod engine;
mod event;
mod filter;
mod handle;
mod monitor;
mod timer;

pub use engine::ExternalCallback;
pub use filter::*;
pub use handle::*;
pub use monitor::*;

#[cfg(test)]
mod engine_test;
