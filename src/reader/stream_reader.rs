use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tracing::debug;
use tracing::warn;

use crate::codec::decoder_for;
use crate::codec::read_header;
use crate::codec::DecodeFn;
use crate::constants::GZIP_MAGIC;
use crate::entry::LogRecord;
use crate::CodecError;
use crate::Result;

/// Restricts a reader to the multicast records of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilter {
    pub source_id: String,
    /// Offset of the last record known for this source; reading stops once a
    /// record starts after it.
    pub known_last_offset: u64,
}

impl SourceFilter {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            known_last_offset: u64::MAX,
        }
    }

    pub fn until(
        mut self,
        known_last_offset: u64,
    ) -> Self {
        self.known_last_offset = known_last_offset;
        self
    }
}

struct CountingReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

/// Forward-only reader of a `.ckmon` stream, plain or gzip-compressed.
///
/// Decode failures do not surface as errors from [`advance`](Self::advance):
/// they end the enumeration and are kept in [`read_error`](Self::read_error),
/// a truncated stream sets [`bad_end_of_file`](Self::bad_end_of_file).
/// Offsets are positions in the uncompressed stream.
pub struct StreamReader {
    input: CountingReader<Box<dyn Read + Send>>,
    version: u32,
    decode: DecodeFn,
    filter: Option<SourceFilter>,
    current: Option<LogRecord>,
    current_offset: u64,
    bad_end_of_file: bool,
    read_error: Option<CodecError>,
    finished: bool,
}

impl StreamReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!("opening log stream {:?}", path.as_ref());
        Ok(Self::from_reader(file)?)
    }

    /// Reads and checks the stream header; gzip is detected from the first
    /// two bytes.
    pub fn from_reader<R>(reader: R) -> std::result::Result<Self, CodecError>
    where
        R: Read + Send + 'static,
    {
        let mut buffered = BufReader::new(reader);
        let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
        let inner: Box<dyn Read + Send> = if is_gzip {
            Box::new(MultiGzDecoder::new(buffered))
        } else {
            Box::new(buffered)
        };

        let mut input = CountingReader { inner, offset: 0 };
        let version = read_header(&mut input)?;
        let decode = decoder_for(version).ok_or(CodecError::UnsupportedVersion(version as i32))?;

        Ok(Self {
            input,
            version,
            decode,
            filter: None,
            current: None,
            current_offset: 0,
            bad_end_of_file: false,
            read_error: None,
            finished: false,
        })
    }

    pub fn with_filter(
        mut self,
        filter: SourceFilter,
    ) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Moves to the next record; false once the stream is over, for whatever
    /// reason.
    pub fn advance(&mut self) -> bool {
        if self.finished {
            return false;
        }
        loop {
            let start = self.input.offset;
            if let Some(filter) = &self.filter {
                if start > filter.known_last_offset {
                    return self.stop();
                }
            }

            match (self.decode)(&mut self.input) {
                Ok(Some(record)) => {
                    if let Some(filter) = &self.filter {
                        if !record.is_multicast() || record.source_id != filter.source_id {
                            continue;
                        }
                    }
                    self.current = Some(record);
                    self.current_offset = start;
                    return true;
                }
                Ok(None) => return self.stop(),
                Err(CodecError::UnexpectedEof) => {
                    warn!(offset = start, "log stream ended without its end marker");
                    self.bad_end_of_file = true;
                    return self.stop();
                }
                Err(e) => {
                    warn!(offset = start, "log stream decode failed: {}", e);
                    self.read_error = Some(e);
                    return self.stop();
                }
            }
        }
    }

    fn stop(&mut self) -> bool {
        self.finished = true;
        self.current = None;
        false
    }

    pub fn current(&self) -> Option<&LogRecord> {
        self.current.as_ref()
    }

    /// Start offset of the current record.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    pub fn stream_version(&self) -> u32 {
        self.version
    }

    pub fn bad_end_of_file(&self) -> bool {
        self.bad_end_of_file
    }

    pub fn read_error(&self) -> Option<&CodecError> {
        self.read_error.as_ref()
    }
}

/// Yields owned records; the reader's `current()` is consumed in the process.
impl Iterator for StreamReader {
    type Item = LogRecord;

    fn next(&mut self) -> Option<LogRecord> {
        if self.advance() {
            self.current.take()
        } else {
            None
        }
    }
}
