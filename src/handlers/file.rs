use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::FileFormat;
use super::LogHandler;
use super::RotatingFile;
use crate::config::FileConfig;
use crate::config::HandlerConfig;
use crate::entry::PooledEntry;
use crate::utils::file_io::run_blocking;
use crate::Result;

/// Writes entries to rotating `.ckmon` or `.log` files.
///
/// File I/O is synchronous; it goes through [`run_blocking`] so that the
/// dispatch task does not stall a runtime worker.
#[derive(Debug)]
pub struct FileHandler {
    file: RotatingFile,
}

impl FileHandler {
    pub fn binary(
        log_root: &Path,
        config: FileConfig,
    ) -> Self {
        Self {
            file: RotatingFile::new(FileFormat::Binary, log_root, config),
        }
    }

    pub fn text(
        log_root: &Path,
        config: FileConfig,
    ) -> Self {
        Self {
            file: RotatingFile::new(FileFormat::Text, log_root, config),
        }
    }

    pub fn file(&self) -> &RotatingFile {
        &self.file
    }

    fn same_handler<'a>(
        &self,
        config: &'a HandlerConfig,
    ) -> Option<&'a FileConfig> {
        let candidate = match (self.file.format(), config) {
            (FileFormat::Binary, HandlerConfig::BinaryFile(c)) => c,
            (FileFormat::Text, HandlerConfig::TextFile(c)) => c,
            _ => return None,
        };
        (candidate.path == self.file.config().path).then_some(candidate)
    }
}

#[async_trait]
impl LogHandler for FileHandler {
    async fn activate(&mut self) -> bool {
        match self.file.prepare() {
            Ok(()) => {
                info!(directory = ?self.file.directory(), format = ?self.file.format(), "file handler activated");
                true
            }
            Err(e) => {
                error!(error = %e, "file handler cannot use its directory");
                false
            }
        }
    }

    async fn apply_configuration(
        &mut self,
        config: &HandlerConfig,
    ) -> Result<bool> {
        match self.same_handler(config) {
            Some(c) => {
                let file = &mut self.file;
                run_blocking(|| file.apply(c.clone()))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn handle(
        &mut self,
        entry: &PooledEntry,
    ) -> Result<()> {
        let file = &mut self.file;
        run_blocking(|| file.write(entry))?;
        Ok(())
    }

    async fn on_timer(
        &mut self,
        _elapsed: Duration,
    ) -> Result<()> {
        let file = &mut self.file;
        run_blocking(|| file.on_timer())?;
        Ok(())
    }

    async fn deactivate(&mut self) {
        let file = &mut self.file;
        if let Err(e) = run_blocking(|| file.close()) {
            warn!(directory = ?self.file.directory(), error = %e, "closing log file failed");
        }
    }
}
