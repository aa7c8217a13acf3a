use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::HandlerConfig;
use crate::entry::LogFilter;
use crate::entry::TagSet;
use crate::Error;
use crate::Result;

/// Filter applied instead of the minimal filter to entries carrying `tags`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TagFilter {
    /// `a|b` form; an entry matches when it carries all of them
    pub tags: String,
    #[serde(default)]
    pub filter: LogFilter,
}

impl TagFilter {
    pub fn tag_set(&self) -> TagSet {
        TagSet::parse(&self.tags)
    }
}

/// One immutable dispatcher configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Output handlers, in delivery order
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,

    /// Interval of the `on_timer` housekeeping calls (unit: milliseconds)
    ///
    /// Default: 500
    #[serde(default = "default_timer_duration_ms")]
    pub timer_duration_ms: u64,

    /// Interval of the external callback (unit: milliseconds)
    ///
    /// Default: 60000
    #[serde(default = "default_external_timer_duration_ms")]
    pub external_timer_duration_ms: u64,

    /// Filter used when no tag filter matches
    #[serde(default)]
    pub minimal_filter: LogFilter,

    /// Tag-based overrides, first match wins
    #[serde(default)]
    pub tag_filters: Vec<TagFilter>,
}

fn default_timer_duration_ms() -> u64 {
    500
}

fn default_external_timer_duration_ms() -> u64 {
    60_000
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            timer_duration_ms: default_timer_duration_ms(),
            external_timer_duration_ms: default_external_timer_duration_ms(),
            minimal_filter: LogFilter::default(),
            tag_filters: Vec::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn with_handler(
        mut self,
        handler: HandlerConfig,
    ) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn timer_duration(&self) -> Duration {
        Duration::from_millis(self.timer_duration_ms)
    }

    pub fn external_timer_duration(&self) -> Duration {
        Duration::from_millis(self.external_timer_duration_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timer_duration_ms < 10 {
            return Err(Error::InvalidConfig(format!(
                "dispatcher.timer_duration_ms must be >= 10 (got {})",
                self.timer_duration_ms
            )));
        }
        if self.external_timer_duration_ms < self.timer_duration_ms {
            return Err(Error::InvalidConfig(format!(
                "dispatcher.external_timer_duration_ms ({}) must be >= timer_duration_ms ({})",
                self.external_timer_duration_ms, self.timer_duration_ms
            )));
        }

        let mut keys = HashSet::new();
        for handler in &self.handlers {
            handler.validate()?;
            if !keys.insert((handler.kind(), handler.key())) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate {} handler '{}'",
                    handler.kind(),
                    handler.key()
                )));
            }
        }
        for tag_filter in &self.tag_filters {
            if tag_filter.tag_set().is_empty() {
                return Err(Error::InvalidConfig("tag filter without tags".into()));
            }
        }
        Ok(())
    }
}

/// Shutdown behaviour of the dispatcher.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownConfig {
    /// Time given to the loop to drain before it is forced to stop
    /// (unit: milliseconds)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

fn default_grace_period_ms() -> u64 {
    5_000
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.grace_period_ms == 0 {
            return Err(Error::InvalidConfig("shutdown.grace_period_ms must be greater than 0".into()));
        }
        Ok(())
    }
}
