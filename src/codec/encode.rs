use std::io::Write;

use super::flags::*;
use super::primitives::*;
use crate::entry::DateTimeStamp;
use crate::entry::EntryKind;
use crate::entry::ExceptionData;
use crate::entry::LogRecord;
use crate::CodecError;

/// True when the text is carried by the exception message and omitted from
/// the record body.
pub fn text_is_exception_message(record: &LogRecord) -> bool {
    match (&record.text, &record.exception) {
        (Some(text), Some(exception)) => record.kind != EntryKind::CloseGroup && *text == exception.message,
        _ => false,
    }
}

/// Header bytes `record` will be written with.
pub fn header_of(record: &LogRecord) -> EntryHeader {
    let mut level = record.level.as_u8();
    if text_is_exception_message(record) {
        level |= LEVEL_TEXT_IS_EXCEPTION_MESSAGE;
    }
    let previous_known = record.multicast.as_ref().is_some_and(|m| m.previous.is_some());
    if previous_known {
        level |= LEVEL_PREVIOUS_KNOWN;
    }

    let mut flags = record.kind.as_u8();
    if !record.tags.is_empty() {
        flags |= FLAG_HAS_TAGS;
    }
    if record.exception.is_some() {
        flags |= FLAG_HAS_EXCEPTION;
    }
    if record.file_name.is_some() {
        flags |= FLAG_HAS_FILE;
    }
    if !record.conclusions.is_empty() {
        flags |= FLAG_HAS_CONCLUSIONS;
    }
    if record.time.uniquifier != 0 {
        flags |= FLAG_HAS_UNIQUIFIER;
    }
    if record.multicast.is_some() {
        flags |= FLAG_MULTICAST;
    }
    EntryHeader { level, flags }
}

/// Writes one record in the current stream version.
///
/// Records without multicast information are written in the local shape:
/// their `source_id` and `depth` are not persisted.
pub fn encode_record<W: Write + ?Sized>(
    w: &mut W,
    record: &LogRecord,
) -> Result<(), CodecError> {
    record.validate().map_err(CodecError::InvalidRecord)?;
    check_time(&record.time)?;
    if let Some(previous) = record.multicast.as_ref().and_then(|m| m.previous.as_ref()) {
        check_time(&previous.time)?;
    }

    let header = header_of(record);
    write_u8(w, header.level)?;
    write_u8(w, header.flags)?;
    write_i64(w, record.time.ticks)?;
    if header.has(FLAG_HAS_UNIQUIFIER) {
        write_u8(w, record.time.uniquifier)?;
    }
    if header.has(FLAG_HAS_TAGS) {
        write_string(w, &record.tags.to_string())?;
    }
    if let Some(file_name) = &record.file_name {
        write_string(w, file_name)?;
        write_varint(w, u64::from(record.line_number as u32))?;
    }
    if let Some(exception) = &record.exception {
        encode_exception(w, exception)?;
    }

    if record.kind == EntryKind::CloseGroup {
        if header.has(FLAG_HAS_CONCLUSIONS) {
            write_varint(w, record.conclusions.len() as u64)?;
            for c in &record.conclusions {
                write_string(w, &c.tag)?;
                write_string(w, &c.text)?;
            }
        }
    } else if !header.has_level(LEVEL_TEXT_IS_EXCEPTION_MESSAGE) {
        write_string(w, record.text_or_empty())?;
    }

    if let Some(multicast) = &record.multicast {
        write_string(w, &record.source_id)?;
        write_string(w, &multicast.pipeline_id)?;
        write_varint(w, u64::from(record.depth))?;
        if let Some(previous) = &multicast.previous {
            write_u8(w, previous.kind.as_u8())?;
            write_i64(w, previous.time.ticks)?;
            write_u8(w, previous.time.uniquifier)?;
        }
    }
    Ok(())
}

pub fn encode_exception<W: Write + ?Sized>(
    w: &mut W,
    exception: &ExceptionData,
) -> Result<(), CodecError> {
    write_u8(w, EXCEPTION_PAYLOAD_VERSION)?;
    write_string(w, &exception.message)?;
    write_string(w, &exception.type_name)?;
    write_string(w, &exception.qualified_type_name)?;
    write_nullable_string(w, exception.stack_trace.as_deref())?;
    write_nullable_string(w, exception.file_name.as_deref())?;
    write_nullable_string(w, exception.detail_info.as_deref())?;
    match &exception.inner {
        Some(inner) => {
            write_bool(w, true)?;
            encode_exception(w, inner)?;
        }
        None => write_bool(w, false)?,
    }
    write_varint(w, exception.aggregated.len() as u64)?;
    for a in &exception.aggregated {
        encode_exception(w, a)?;
    }
    Ok(())
}

fn check_time(time: &DateTimeStamp) -> Result<(), CodecError> {
    if DateTimeStamp::is_valid_ticks(time.ticks) {
        Ok(())
    } else {
        Err(CodecError::OutOfRangeYear(time.ticks))
    }
}
