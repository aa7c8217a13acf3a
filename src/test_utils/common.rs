use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::config::DispatcherConfig;
use crate::config::HandlerConfig;
use crate::config::MemoryConfig;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Generous bound for waits that should complete almost immediately.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn memory_config(name: &str) -> HandlerConfig {
    HandlerConfig::Memory(MemoryConfig::new(name))
}

/// Dispatcher configuration with one memory collector per name.
pub fn memory_dispatcher_config(names: &[&str]) -> DispatcherConfig {
    names
        .iter()
        .fold(DispatcherConfig::default(), |config, name| config.with_handler(memory_config(name)))
}
