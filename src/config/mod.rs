//! Configuration for the log pipeline.
//!
//! Sources are merged in order, later ones winning:
//! 1. Code defaults
//! 2. File named by the `CONFIG_PATH` environment variable (if set)
//! 3. Environment variables prefixed with `CKMON__`, `__` separating levels
//!    (e.g. `CKMON__DISPATCHER__TIMER_DURATION_MS=250`)
//!
//! Handler sections are resolved by name, see [`HandlerKind::resolve`].

mod dispatcher;
mod handlers;
mod pool;
mod retry;
pub use dispatcher::*;
pub use handlers::*;
pub use pool::*;
pub use retry::*;


use std::env;
use std::path::PathBuf;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

const ENV_PREFIX: &str = "CKMON";

/// Root configuration of a `ckmon` process.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Directory under which file handlers create their folders
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
    /// Entry pool sizing
    #[serde(default)]
    pub pool: PoolConfig,
    /// Initial dispatcher configuration (handlers, timers, filters)
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    /// Shutdown behaviour
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_root: default_log_root(),
            pool: PoolConfig::default(),
            dispatcher: DispatcherConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

fn default_log_root() -> PathBuf {
    PathBuf::from("./logs")
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

impl Settings {
    /// Loads defaults, `CONFIG_PATH` and environment overrides.
    ///
    /// Not validated: call [`validate`](Self::validate) once every override
    /// has been applied.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        let settings: Self = builder.add_source(environment()).build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Merges the file at `path` over the current values, then the
    /// environment again.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn validate(self) -> Result<Self> {
        if self.log_root.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("log_root cannot be empty".into()));
        }
        self.pool.validate()?;
        self.dispatcher.validate()?;
        self.shutdown.validate()?;
        Ok(self)
    }
}
