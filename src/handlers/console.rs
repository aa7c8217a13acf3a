use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;

use super::LogHandler;
use super::TextFormatter;
use crate::config::ConsoleConfig;
use crate::config::HandlerConfig;
use crate::entry::PooledEntry;
use crate::utils::file_io::run_blocking;
use crate::HandlerError;
use crate::Result;

/// Writes the text rendering of each entry to stdout or stderr.
#[derive(Debug, Default)]
pub struct ConsoleHandler {
    config: ConsoleConfig,
    formatter: TextFormatter,
}

impl ConsoleHandler {
    pub fn new(config: ConsoleConfig) -> Self {
        Self {
            config,
            formatter: TextFormatter::default(),
        }
    }

    fn write_text(
        &self,
        text: &str,
    ) -> std::io::Result<()> {
        if self.config.use_stderr {
            std::io::stderr().lock().write_all(text.as_bytes())
        } else {
            std::io::stdout().lock().write_all(text.as_bytes())
        }
    }
}

#[async_trait]
impl LogHandler for ConsoleHandler {
    async fn activate(&mut self) -> bool {
        true
    }

    async fn apply_configuration(
        &mut self,
        config: &HandlerConfig,
    ) -> Result<bool> {
        Ok(matches!(config, HandlerConfig::Console(c) if c.use_stderr == self.config.use_stderr))
    }

    async fn handle(
        &mut self,
        entry: &PooledEntry,
    ) -> Result<()> {
        let text = self.formatter.format(entry);
        run_blocking(|| self.write_text(&text)).map_err(HandlerError::Write)?;
        Ok(())
    }

    async fn on_timer(
        &mut self,
        _elapsed: Duration,
    ) -> Result<()> {
        let use_stderr = self.config.use_stderr;
        run_blocking(|| {
            if use_stderr {
                std::io::stderr().flush()
            } else {
                std::io::stdout().flush()
            }
        })
        .map_err(HandlerError::Write)?;
        Ok(())
    }

    async fn deactivate(&mut self) {}
}
