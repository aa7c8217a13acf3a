//! `.ckmon` binary codec.
//!
//! A stream is `CKMON`, an i32 LE version, a sequence of records and a single
//! `0x00` end marker. Records are written in the current version only; the
//! decoders in [`decode`] read every version from 5 on.

pub mod decode;
pub mod encode;
pub mod flags;
pub mod primitives;
mod stream;

pub use decode::decoder_for;
pub use decode::DecodeFn;
pub use encode::encode_record;
pub use stream::*;

use crate::entry::LogRecord;
use crate::CodecError;

/// Encodes a single record, without stream framing.
pub fn encode_to_vec(record: &LogRecord) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(64);
    encode_record(&mut buf, record)?;
    Ok(buf)
}

/// Decodes a single record of the current version from `bytes`.
pub fn decode_from_slice(mut bytes: &[u8]) -> Result<Option<LogRecord>, CodecError> {
    let decode = decoder_for(crate::constants::CURRENT_STREAM_VERSION)
        .ok_or(CodecError::UnsupportedVersion(crate::constants::CURRENT_STREAM_VERSION as i32))?;
    decode(&mut bytes)
}

#[cfg(test)]
mod codec_test;
