use std::io::Read;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use super::encode::encode_record;
use super::flags::END_OF_STREAM;
use super::primitives::read_i32;
use super::primitives::write_i32;
use crate::constants::CURRENT_STREAM_VERSION;
use crate::constants::MIN_STREAM_VERSION;
use crate::constants::STREAM_MAGIC;
use crate::entry::LogRecord;
use crate::CodecError;

pub fn write_header<W: Write + ?Sized>(
    w: &mut W,
    version: u32,
) -> Result<(), CodecError> {
    w.write_all(STREAM_MAGIC)?;
    write_i32(w, version as i32)
}

/// Reads `CKMON` + version and checks the version is decodable.
pub fn read_header<R: Read + ?Sized>(r: &mut R) -> Result<u32, CodecError> {
    let mut magic = [0u8; 5];
    r.read_exact(&mut magic)?;
    if &magic != STREAM_MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let version = read_i32(r)?;
    match u32::try_from(version) {
        Ok(v) if (MIN_STREAM_VERSION..=CURRENT_STREAM_VERSION).contains(&v) => Ok(v),
        _ => Err(CodecError::UnsupportedVersion(version)),
    }
}

/// Writes a complete `.ckmon` stream: header on creation, one record per
/// [`write`](CkmonWriter::write), end marker on [`finish`](CkmonWriter::finish).
pub struct CkmonWriter<W: Write> {
    inner: W,
    records: u64,
}

impl<W: Write> CkmonWriter<W> {
    pub fn new(mut inner: W) -> Result<Self, CodecError> {
        write_header(&mut inner, CURRENT_STREAM_VERSION)?;
        Ok(Self { inner, records: 0 })
    }

    pub fn write(
        &mut self,
        record: &LogRecord,
    ) -> Result<(), CodecError> {
        encode_record(&mut self.inner, record)?;
        self.records += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> Result<(), CodecError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Writes the end marker and returns the underlying writer, flushed.
    pub fn finish(mut self) -> Result<W, CodecError> {
        self.inner.write_all(&[END_OF_STREAM])?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    /// Returns the underlying writer without the end marker; readers will
    /// report a bad end of file for this stream.
    pub fn abandon(self) -> W {
        self.inner
    }
}

impl<W: Write> CkmonWriter<GzEncoder<W>> {
    /// Same stream, gzip-compressed as a whole.
    pub fn gzip(inner: W) -> Result<Self, CodecError> {
        Self::new(GzEncoder::new(inner, Compression::default()))
    }

    /// Ends the stream and the gzip member.
    pub fn finish_gzip(self) -> Result<W, CodecError> {
        let encoder = self.finish()?;
        Ok(encoder.finish()?)
    }
}
