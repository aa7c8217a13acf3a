//! Version-keyed record decoders.
//!
//! Each supported stream version maps to one decode function. The functions
//! only differ by the [`Layout`] they pass to the shared body, so every
//! version difference is visible in the layout constants below.

use std::io::Read;

use super::flags::*;
use super::primitives::*;
use crate::constants::MAX_COLLECTION_LENGTH;
use crate::entry::Conclusion;
use crate::entry::DateTimeStamp;
use crate::entry::EntryKind;
use crate::entry::ExceptionData;
use crate::entry::LogLevel;
use crate::entry::LogRecord;
use crate::entry::MulticastInfo;
use crate::entry::PreviousEntry;
use crate::entry::TagSet;
use crate::CodecError;

/// Decodes the next record; `Ok(None)` on the end-of-stream marker.
pub type DecodeFn = fn(&mut dyn Read) -> Result<Option<LogRecord>, CodecError>;

#[derive(Debug, Clone, Copy)]
struct Layout {
    /// Line numbers, counts and depth as 7-bit varints (else i32 LE)
    varint_numbers: bool,
    /// Source id as a string (else a 16-byte identifier)
    string_source_id: bool,
    /// Multicast trailer carries the pipeline id
    pipeline_id: bool,
}

const LAYOUT_V5: Layout = Layout {
    varint_numbers: false,
    string_source_id: false,
    pipeline_id: false,
};

const LAYOUT_V6: Layout = Layout {
    varint_numbers: true,
    string_source_id: false,
    pipeline_id: false,
};

const LAYOUT_V8: Layout = Layout {
    varint_numbers: true,
    string_source_id: true,
    pipeline_id: false,
};

const LAYOUT_V9: Layout = Layout {
    varint_numbers: true,
    string_source_id: true,
    pipeline_id: true,
};

fn decode_v5(r: &mut dyn Read) -> Result<Option<LogRecord>, CodecError> {
    decode_with(r, &LAYOUT_V5)
}

fn decode_v6(r: &mut dyn Read) -> Result<Option<LogRecord>, CodecError> {
    decode_with(r, &LAYOUT_V6)
}

fn decode_v8(r: &mut dyn Read) -> Result<Option<LogRecord>, CodecError> {
    decode_with(r, &LAYOUT_V8)
}

fn decode_v9(r: &mut dyn Read) -> Result<Option<LogRecord>, CodecError> {
    decode_with(r, &LAYOUT_V9)
}

const DECODERS: [(u32, DecodeFn); 5] = [
    (5, decode_v5),
    (6, decode_v6),
    (7, decode_v6),
    (8, decode_v8),
    (9, decode_v9),
];

/// Decoder for `version`, if supported.
pub fn decoder_for(version: u32) -> Option<DecodeFn> {
    DECODERS.iter().find(|(v, _)| *v == version).map(|(_, f)| *f)
}

pub fn supported_versions() -> impl Iterator<Item = u32> {
    DECODERS.iter().map(|(v, _)| *v)
}

fn read_number(
    r: &mut dyn Read,
    layout: &Layout,
    field: &'static str,
) -> Result<u64, CodecError> {
    if layout.varint_numbers {
        read_varint(r)
    } else {
        let value = read_i32(r)?;
        u64::try_from(value).map_err(|_| CodecError::InvalidLength {
            field,
            length: value as u64,
        })
    }
}

fn read_count(
    r: &mut dyn Read,
    layout: &Layout,
    field: &'static str,
) -> Result<usize, CodecError> {
    let length = read_number(r, layout, field)?;
    if length > MAX_COLLECTION_LENGTH {
        return Err(CodecError::InvalidLength { field, length });
    }
    Ok(length as usize)
}

fn read_time(r: &mut dyn Read) -> Result<i64, CodecError> {
    let ticks = read_i64(r)?;
    if !DateTimeStamp::is_valid_ticks(ticks) {
        return Err(CodecError::OutOfRangeYear(ticks));
    }
    Ok(ticks)
}

fn decode_with(
    r: &mut dyn Read,
    layout: &Layout,
) -> Result<Option<LogRecord>, CodecError> {
    let level = read_u8(r)?;
    if level == END_OF_STREAM {
        return Ok(None);
    }
    let header = EntryHeader {
        level,
        flags: read_u8(r)?,
    };
    let invalid = || CodecError::InvalidHeader {
        level: header.level,
        flags: header.flags,
    };

    let log_level = LogLevel::from_u8(header.level_bits()).ok_or_else(invalid)?;
    let kind = EntryKind::from_u8(header.kind_bits()).ok_or(CodecError::InvalidKind(header.kind_bits()))?;

    let text_in_exception = header.has_level(LEVEL_TEXT_IS_EXCEPTION_MESSAGE);
    let previous_known = header.has_level(LEVEL_PREVIOUS_KNOWN);
    let consistent = match kind {
        EntryKind::CloseGroup => {
            !text_in_exception && !header.has(FLAG_HAS_FILE) && !header.has(FLAG_HAS_EXCEPTION)
        }
        _ => !header.has(FLAG_HAS_CONCLUSIONS) && (!text_in_exception || header.has(FLAG_HAS_EXCEPTION)),
    };
    if !consistent || (previous_known && !header.has(FLAG_MULTICAST)) {
        return Err(invalid());
    }

    let ticks = read_time(r)?;
    let uniquifier = if header.has(FLAG_HAS_UNIQUIFIER) { read_u8(r)? } else { 0 };

    let mut record = LogRecord {
        kind,
        level: log_level,
        time: DateTimeStamp::new(ticks, uniquifier),
        ..Default::default()
    };

    if header.has(FLAG_HAS_TAGS) {
        record.tags = TagSet::parse(&read_string(r, "tags")?);
    }
    if header.has(FLAG_HAS_FILE) {
        record.file_name = Some(read_string(r, "file name")?);
        record.line_number = read_number(r, layout, "line number")? as u32 as i32;
    }
    if header.has(FLAG_HAS_EXCEPTION) {
        record.exception = Some(decode_exception(r, layout, 0)?);
    }

    if kind == EntryKind::CloseGroup {
        if header.has(FLAG_HAS_CONCLUSIONS) {
            let count = read_count(r, layout, "conclusions")?;
            let mut conclusions = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                let tag = read_string(r, "conclusion tag")?;
                let text = read_string(r, "conclusion text")?;
                conclusions.push(Conclusion { tag, text });
            }
            record.conclusions = conclusions;
        }
    } else if text_in_exception {
        record.text = record.exception.as_ref().map(|e| e.message.clone());
    } else {
        record.text = Some(read_string(r, "text")?);
    }

    if header.has(FLAG_MULTICAST) {
        record.source_id = if layout.string_source_id {
            read_string(r, "source id")?
        } else {
            read_guid(r)?
        };
        let pipeline_id = if layout.pipeline_id {
            read_string(r, "pipeline id")?
        } else {
            String::new()
        };
        record.depth = u32::try_from(read_number(r, layout, "depth")?).map_err(|_| CodecError::InvalidLength {
            field: "depth",
            length: u64::MAX,
        })?;
        let previous = if previous_known {
            let kind_bits = read_u8(r)?;
            let kind = EntryKind::from_u8(kind_bits).ok_or(CodecError::InvalidKind(kind_bits))?;
            let ticks = read_time(r)?;
            let uniquifier = read_u8(r)?;
            Some(PreviousEntry {
                kind,
                time: DateTimeStamp::new(ticks, uniquifier),
            })
        } else {
            None
        };
        record.multicast = Some(MulticastInfo { pipeline_id, previous });
    }
    Ok(Some(record))
}

fn decode_exception(
    r: &mut dyn Read,
    layout: &Layout,
    depth: usize,
) -> Result<ExceptionData, CodecError> {
    if depth > MAX_EXCEPTION_DEPTH {
        return Err(CodecError::InvalidLength {
            field: "exception nesting",
            length: depth as u64,
        });
    }
    let version = read_u8(r)?;
    if version != EXCEPTION_PAYLOAD_VERSION {
        return Err(CodecError::InvalidExceptionVersion(version));
    }
    let mut data = ExceptionData {
        message: read_string(r, "exception message")?,
        type_name: read_string(r, "exception type")?,
        qualified_type_name: read_string(r, "exception qualified type")?,
        stack_trace: read_nullable_string(r, "stack trace")?,
        file_name: read_nullable_string(r, "exception file name")?,
        detail_info: read_nullable_string(r, "detail info")?,
        ..Default::default()
    };
    if read_bool(r)? {
        data.inner = Some(Box::new(decode_exception(r, layout, depth + 1)?));
    }
    let count = read_count(r, layout, "aggregated exceptions")?;
    for _ in 0..count {
        data.aggregated.push(decode_exception(r, layout, depth + 1)?);
    }
    Ok(data)
}
