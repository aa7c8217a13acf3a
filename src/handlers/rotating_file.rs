//! Size-bounded output files shared by the binary and text handlers.
//!
//! Files are created lazily in `<log_root>/<path>/` under a temporary name
//! (`.tmp` suffix), closed after `max_count_per_file` entries and renamed to
//! their final name (`.gz` appended when compressed). Housekeeping deletes
//! the oldest closed files once the folder grows past its size limit.

use std::fs::File;
use std::io::BufWriter;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::TextFormatter;
use crate::codec::CkmonWriter;
use crate::config::FileConfig;
use crate::constants::BINARY_FILE_EXTENSION;
use crate::constants::OPEN_FILE_SUFFIX;
use crate::constants::TEXT_FILE_EXTENSION;
use crate::entry::LogRecord;
use crate::utils::file_io::create_dir_if_not_exist;
use crate::utils::file_io::create_new_file;
use crate::utils::file_io::list_closed_files;
use crate::utils::file_io::rename_file;
use crate::HandlerError;

const GZIP_SUFFIX: &str = ".gz";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Binary,
    Text,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Binary => BINARY_FILE_EXTENSION,
            FileFormat::Text => TEXT_FILE_EXTENSION,
        }
    }
}

/// Physical writer of one file, compressed or not.
enum OutputWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputWriter {
    fn new(
        file: File,
        gzip: bool,
    ) -> Self {
        let buffered = BufWriter::new(file);
        if gzip {
            OutputWriter::Gzip(GzEncoder::new(buffered, Compression::default()))
        } else {
            OutputWriter::Plain(buffered)
        }
    }

    fn close(self) -> std::io::Result<()> {
        let mut buffered = match self {
            OutputWriter::Plain(w) => w,
            OutputWriter::Gzip(w) => w.finish()?,
        };
        buffered.flush()?;
        buffered.get_ref().sync_all()
    }
}

impl Write for OutputWriter {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> std::io::Result<usize> {
        match self {
            OutputWriter::Plain(w) => w.write(buf),
            OutputWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutputWriter::Plain(w) => w.flush(),
            OutputWriter::Gzip(w) => w.flush(),
        }
    }
}

enum FileWriter {
    Binary(CkmonWriter<OutputWriter>),
    Text(OutputWriter),
}

struct OpenFile {
    writer: FileWriter,
    temp_path: PathBuf,
    final_path: PathBuf,
    count: u32,
}

pub struct RotatingFile {
    format: FileFormat,
    directory: PathBuf,
    config: FileConfig,
    formatter: TextFormatter,
    current: Option<OpenFile>,
    ticks: u32,
    closed_files: u64,
}

impl RotatingFile {
    pub fn new(
        format: FileFormat,
        log_root: &Path,
        config: FileConfig,
    ) -> Self {
        Self {
            format,
            directory: log_root.join(&config.path),
            config,
            formatter: TextFormatter::default(),
            current: None,
            ticks: 0,
            closed_files: 0,
        }
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Files closed (and renamed) since creation.
    pub fn closed_files(&self) -> u64 {
        self.closed_files
    }

    /// Checks that the output folder can be used.
    pub fn prepare(&self) -> Result<(), HandlerError> {
        create_dir_if_not_exist(&self.directory)
    }

    /// Appends `record`; a record breaking the entry invariants is skipped
    /// with a warning.
    pub fn write(
        &mut self,
        record: &LogRecord,
    ) -> Result<(), HandlerError> {
        if let Err(reason) = record.validate() {
            warn!(directory = ?self.directory, reason, "skipping invalid record");
            return Ok(());
        }
        if self.current.is_none() {
            self.current = Some(self.open()?);
        }
        let max_count = self.config.max_count_per_file;
        let rotate = match self.current.as_mut() {
            Some(file) => {
                match &mut file.writer {
                    FileWriter::Binary(w) => w.write(record)?,
                    FileWriter::Text(w) => w.write_all(self.formatter.format(record).as_bytes())?,
                }
                file.count += 1;
                file.count >= max_count
            }
            None => false,
        };
        if rotate {
            self.close()?;
        }
        Ok(())
    }

    /// Flushes the open file and runs housekeeping every
    /// `housekeeping_rate` calls.
    pub fn on_timer(&mut self) -> Result<(), HandlerError> {
        if let Some(file) = self.current.as_mut() {
            match &mut file.writer {
                FileWriter::Binary(w) => w.flush()?,
                FileWriter::Text(w) => w.flush()?,
            }
        }
        self.ticks = self.ticks.wrapping_add(1);
        if self.config.housekeeping_rate > 0 && self.ticks % self.config.housekeeping_rate == 0 {
            self.run_housekeeping()?;
        }
        Ok(())
    }

    /// Takes the new parameters; the open file is closed when its
    /// compression changes or it already holds enough entries.
    pub fn apply(
        &mut self,
        config: FileConfig,
    ) -> Result<(), HandlerError> {
        let must_close = config.use_gzip_compression != self.config.use_gzip_compression
            || self
                .current
                .as_ref()
                .map(|f| f.count >= config.max_count_per_file)
                .unwrap_or(false);
        self.config = config;
        if must_close {
            self.close()?;
        }
        Ok(())
    }

    /// Ends the open file, if any, and gives it its final name.
    pub fn close(&mut self) -> Result<(), HandlerError> {
        let file = match self.current.take() {
            Some(f) => f,
            None => return Ok(()),
        };
        let output = match file.writer {
            FileWriter::Binary(w) => w.finish()?,
            FileWriter::Text(w) => w,
        };
        output.close().map_err(|e| HandlerError::FileIo {
            path: file.temp_path.clone(),
            source: e,
        })?;
        rename_file(&file.temp_path, &file.final_path)?;
        self.closed_files += 1;
        debug!(path = ?file.final_path, entries = file.count, "log file closed");
        Ok(())
    }

    /// Deletes the oldest closed files while the folder exceeds
    /// `maximum_total_kb_to_keep`, never touching files younger than
    /// `minimum_days_to_keep`. Returns the number of deleted files.
    pub fn run_housekeeping(&self) -> Result<usize, HandlerError> {
        let max_bytes = self.config.maximum_total_kb_to_keep.saturating_mul(1024);
        if max_bytes == 0 {
            return Ok(0);
        }
        let files = list_closed_files(&self.directory, self.format.extension(), OPEN_FILE_SUFFIX)?;
        let mut total: u64 = files.iter().map(|f| f.len).sum();
        let min_age = Duration::from_secs(u64::from(self.config.minimum_days_to_keep) * SECONDS_PER_DAY);
        let now = SystemTime::now();

        let mut deleted = 0;
        for file in files {
            if total <= max_bytes {
                break;
            }
            let age = now.duration_since(file.modified).unwrap_or_default();
            if age < min_age {
                break;
            }
            match std::fs::remove_file(&file.path) {
                Ok(()) => {
                    total -= file.len;
                    deleted += 1;
                }
                Err(e) => warn!(path = ?file.path, error = %e, "housekeeping could not delete file"),
            }
        }
        if deleted > 0 {
            info!(directory = ?self.directory, deleted, remaining_bytes = total, "housekeeping done");
        }
        Ok(deleted)
    }

    fn open(&self) -> Result<OpenFile, HandlerError> {
        create_dir_if_not_exist(&self.directory)?;
        let base = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let extension = self.format.extension();
        let gzip = self.config.use_gzip_compression;

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{base}{extension}")
            } else {
                format!("{base}-{attempt}{extension}")
            };
            let temp_path = self.directory.join(format!("{name}{OPEN_FILE_SUFFIX}"));
            let final_path = if gzip {
                self.directory.join(format!("{name}{GZIP_SUFFIX}"))
            } else {
                self.directory.join(&name)
            };
            attempt += 1;
            if final_path.exists() {
                continue;
            }

            let file = match create_new_file(&temp_path) {
                Ok(f) => f,
                Err(HandlerError::FileIo { source, .. }) if source.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            };
            let output = OutputWriter::new(file, gzip);
            let writer = match self.format {
                FileFormat::Binary => FileWriter::Binary(CkmonWriter::new(output)?),
                FileFormat::Text => FileWriter::Text(output),
            };
            debug!(path = ?temp_path, "log file opened");
            return Ok(OpenFile {
                writer,
                temp_path,
                final_path,
                count: 0,
            });
        }
    }
}

impl Drop for RotatingFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(directory = ?self.directory, error = %e, "log file could not be closed");
        }
    }
}

impl std::fmt::Debug for RotatingFile {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RotatingFile")
            .field("format", &self.format)
            .field("directory", &self.directory)
            .field("open", &self.is_open())
            .field("closed_files", &self.closed_files)
            .finish()
    }
}
