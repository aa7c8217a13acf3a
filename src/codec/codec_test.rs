use std::io::Write;

use super::encode::encode_exception;
use super::encode::header_of;
use super::flags::*;
use super::primitives::*;
use super::*;
use crate::entry::*;
use crate::CodecError;

const SOURCE: &str = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";

fn t(ticks: i64) -> DateTimeStamp {
    DateTimeStamp::new(637_000_000_000_000_000 + ticks, 0)
}

fn round_trip(record: &LogRecord) -> LogRecord {
    let bytes = encode_to_vec(record).unwrap();
    decode_from_slice(&bytes).unwrap().unwrap()
}

fn sample_exception() -> ExceptionData {
    let mut data = ExceptionData::new("outer", "InvalidOperation")
        .with_stack_trace("at a\nat b")
        .with_inner(ExceptionData::new("inner", "Io"));
    data.detail_info = Some("details".into());
    data.aggregated.push(ExceptionData::new("agg", "Timeout"));
    data
}

fn samples() -> Vec<LogRecord> {
    vec![
        LogRecord::line(LogLevel::Info, t(1), "plain line"),
        LogRecord::line(LogLevel::Debug, DateTimeStamp::new(t(2).ticks, 7), "").with_tags("Sql|Perf"),
        LogRecord::line(LogLevel::Error, t(3), "failure")
            .with_exception(sample_exception())
            .with_file("src/lib.rs", 42),
        LogRecord::open_group(LogLevel::Warn, t(4), "group").with_tags("G"),
        LogRecord::close_group(
            LogLevel::Warn,
            t(5),
            vec![Conclusion::new("Rows", "12"), Conclusion::new("", "done")],
        ),
        LogRecord::close_group(LogLevel::Info, t(6), vec![]),
    ]
}

fn multicast(record: LogRecord) -> LogRecord {
    record.with_source(SOURCE, 3).with_multicast(
        "pipe-1",
        Some(PreviousEntry {
            kind: EntryKind::OpenGroup,
            time: DateTimeStamp::new(t(0).ticks, 2),
        }),
    )
}

#[test]
fn test_local_records_round_trip() {
    for record in samples() {
        assert_eq!(round_trip(&record), record);
    }
}

#[test]
fn test_inserted_tag_with_separator_round_trips() {
    let mut record = LogRecord::line(LogLevel::Info, t(1), "tagged");
    record.tags.insert("Net|Retry");
    assert_eq!(round_trip(&record).tags, record.tags);
    assert_eq!(record.tags.len(), 2);
}

#[test]
fn test_multicast_records_round_trip() {
    for record in samples() {
        let record = multicast(record);
        assert_eq!(round_trip(&record), record);
    }
    let no_previous = LogRecord::line(LogLevel::Fatal, t(9), "x")
        .with_source("s", 0)
        .with_multicast("p", None);
    assert_eq!(round_trip(&no_previous), no_previous);
}

#[test]
fn test_local_shape_drops_source_and_depth() {
    let record = LogRecord::line(LogLevel::Info, t(1), "local").with_source("ignored", 5);
    let decoded = round_trip(&record);
    assert!(decoded.source_id.is_empty());
    assert_eq!(decoded.depth, 0);
    assert_eq!(decoded.text_or_empty(), "local");
}

#[test]
fn test_text_equal_to_exception_message_is_omitted() {
    let exception = ExceptionData::new("same text", "Io");
    let record = LogRecord::line(LogLevel::Error, t(1), "same text").with_exception(exception.clone());
    let header = header_of(&record);
    assert!(header.has_level(LEVEL_TEXT_IS_EXCEPTION_MESSAGE));

    let different = LogRecord::line(LogLevel::Error, t(1), "other text").with_exception(exception);
    assert!(!header_of(&different).has_level(LEVEL_TEXT_IS_EXCEPTION_MESSAGE));

    let omitted = encode_to_vec(&record).unwrap();
    let written = encode_to_vec(&different).unwrap();
    // "other text" is written in full, "same text" not at all
    assert_eq!(written.len(), omitted.len() + 1 + "other text".len());

    let decoded = round_trip(&record);
    assert_eq!(decoded.text.as_deref(), Some("same text"));
    assert_eq!(decoded, record);
}

#[test]
fn test_empty_text_with_empty_exception_message_round_trips() {
    let record = LogRecord::line(LogLevel::Error, t(1), "").with_exception(ExceptionData::new("", "E"));
    assert_eq!(round_trip(&record), record);
}

#[test]
fn test_writer_produces_n_records_and_end_marker() {
    let mut writer = CkmonWriter::new(Vec::new()).unwrap();
    for record in samples() {
        writer.write(&record).unwrap();
    }
    assert_eq!(writer.records_written(), 6);
    let bytes = writer.finish().unwrap();
    assert_eq!(&bytes[..5], b"CKMON");
    assert_eq!(bytes.last(), Some(&0u8));

    let mut input = &bytes[..];
    let version = read_header(&mut input).unwrap();
    assert_eq!(version, 9);
    let decode = decoder_for(version).unwrap();
    let mut decoded = Vec::new();
    while let Some(record) = decode(&mut input).unwrap() {
        decoded.push(record);
    }
    assert_eq!(decoded, samples());
    assert!(input.is_empty());
}

#[test]
fn test_invalid_headers_are_rejected() {
    let mut bad_magic: &[u8] = b"CKMOX\x09\x00\x00\x00";
    assert!(matches!(read_header(&mut bad_magic), Err(CodecError::InvalidMagic)));

    let mut old: &[u8] = b"CKMON\x04\x00\x00\x00";
    assert!(matches!(read_header(&mut old), Err(CodecError::UnsupportedVersion(4))));

    let mut truncated: &[u8] = b"CKM";
    assert!(matches!(read_header(&mut truncated), Err(CodecError::UnexpectedEof)));
}

#[test]
fn test_decode_rejects_corrupt_records() {
    // level bits 0x03 name no level
    let bad_level = [0x03u8, 0x01];
    assert!(matches!(
        decode_from_slice(&bad_level),
        Err(CodecError::InvalidHeader { .. })
    ));

    let bad_kind = [LogLevel::Info.as_u8(), 0x00];
    assert!(matches!(decode_from_slice(&bad_kind), Err(CodecError::InvalidKind(0))));

    let mut out_of_range = vec![LogLevel::Info.as_u8(), 0x01];
    out_of_range.extend_from_slice(&(MAX_TICKS + 1).to_le_bytes());
    assert!(matches!(
        decode_from_slice(&out_of_range),
        Err(CodecError::OutOfRangeYear(_))
    ));

    let mut huge_string = vec![LogLevel::Info.as_u8(), 0x01];
    huge_string.extend_from_slice(&t(0).ticks.to_le_bytes());
    write_varint(&mut huge_string, u64::MAX >> 1).unwrap();
    assert!(matches!(
        decode_from_slice(&huge_string),
        Err(CodecError::InvalidLength { field: "text", .. })
    ));

    let mut bad_utf8 = vec![LogLevel::Info.as_u8(), 0x01];
    bad_utf8.extend_from_slice(&t(0).ticks.to_le_bytes());
    bad_utf8.extend_from_slice(&[2, 0xC3, 0x28]);
    assert!(matches!(decode_from_slice(&bad_utf8), Err(CodecError::InvalidUtf8("text"))));
}

#[test]
fn test_truncated_record_is_unexpected_eof() {
    let bytes = encode_to_vec(&samples()[2]).unwrap();
    for cut in 1..bytes.len() {
        assert!(matches!(
            decode_from_slice(&bytes[..cut]),
            Err(CodecError::UnexpectedEof)
        ));
    }
}

#[test]
fn test_encoder_enforces_record_invariants() {
    let mut record = LogRecord::close_group(LogLevel::Info, t(0), vec![]);
    record.text = Some("x".into());
    assert!(matches!(encode_to_vec(&record), Err(CodecError::InvalidRecord(_))));

    let record = LogRecord::line(LogLevel::Info, DateTimeStamp::new(-1, 0), "x");
    assert!(matches!(encode_to_vec(&record), Err(CodecError::OutOfRangeYear(-1))));
}

#[test]
fn test_gzip_writer_output_is_gzip() {
    let mut writer = CkmonWriter::gzip(Vec::new()).unwrap();
    writer.write(&samples()[0]).unwrap();
    let bytes = writer.finish_gzip().unwrap();
    assert_eq!(&bytes[..2], &crate::constants::GZIP_MAGIC);
}

/// Writes `record` the way writers of an older stream version did.
fn encode_legacy(
    w: &mut Vec<u8>,
    record: &LogRecord,
    version: u32,
) -> Result<(), CodecError> {
    let varints = version >= 6;

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
    if let Some(file) = &record.file_name {
        write_string(w, file)?;
        write_number(w, varints, record.line_number as u64)?;
    }
    if let Some(exception) = &record.exception {
        if varints {
            encode_exception(w, exception)?;
        } else {
            legacy_exception(w, exception)?;
        }
    }
    if record.kind == EntryKind::CloseGroup {
        if header.has(FLAG_HAS_CONCLUSIONS) {
            write_number(w, varints, record.conclusions.len() as u64)?;
            for c in &record.conclusions {
                write_string(w, &c.tag)?;
                write_string(w, &c.text)?;
            }
        }
    } else if !header.has_level(LEVEL_TEXT_IS_EXCEPTION_MESSAGE) {
        write_string(w, record.text_or_empty())?;
    }
    if let Some(m) = &record.multicast {
        if version >= 8 {
            write_string(w, &record.source_id)?;
        } else {
            write_guid(w, &record.source_id)?;
        }
        if version >= 9 {
            write_string(w, &m.pipeline_id)?;
        }
        write_number(w, varints, u64::from(record.depth))?;
        if let Some(p) = &m.previous {
            write_u8(w, p.kind.as_u8())?;
            write_i64(w, p.time.ticks)?;
            write_u8(w, p.time.uniquifier)?;
        }
    }
    Ok(())
}

fn write_number(
    w: &mut Vec<u8>,
    varints: bool,
    n: u64,
) -> Result<(), CodecError> {
    if varints {
        write_varint(w, n)
    } else {
        write_i32(w, n as i32)
    }
}

fn legacy_exception(
    w: &mut Vec<u8>,
    e: &ExceptionData,
) -> Result<(), CodecError> {
    write_u8(w, EXCEPTION_PAYLOAD_VERSION)?;
    write_string(w, &e.message)?;
    write_string(w, &e.type_name)?;
    write_string(w, &e.qualified_type_name)?;
    write_nullable_string(w, e.stack_trace.as_deref())?;
    write_nullable_string(w, e.file_name.as_deref())?;
    write_nullable_string(w, e.detail_info.as_deref())?;
    match &e.inner {
        Some(inner) => {
            write_bool(w, true)?;
            legacy_exception(w, inner)?;
        }
        None => write_bool(w, false)?,
    }
    write_i32(w, e.aggregated.len() as i32)?;
    for a in &e.aggregated {
        legacy_exception(w, a)?;
    }
    Ok(())
}

#[test]
fn test_every_supported_version_decodes_the_same_records() {
    let records: Vec<LogRecord> = samples().into_iter().map(multicast).collect();

    for version in decode::supported_versions() {
        let mut bytes = Vec::new();
        write_header(&mut bytes, version).unwrap();
        for record in &records {
            encode_legacy(&mut bytes, record, version).unwrap();
        }
        bytes.write_all(&[END_OF_STREAM]).unwrap();

        let mut input = &bytes[..];
        assert_eq!(read_header(&mut input).unwrap(), version);
        let decode = decoder_for(version).unwrap();
        let mut decoded = Vec::new();
        while let Some(record) = decode(&mut input).unwrap() {
            decoded.push(record);
        }

        let expected: Vec<LogRecord> = records
            .iter()
            .cloned()
            .map(|mut r| {
                if version < 9 {
                    if let Some(m) = r.multicast.as_mut() {
                        m.pipeline_id.clear();
                    }
                }
                r
            })
            .collect();
        assert_eq!(decoded, expected, "version {version}");
    }
}

#[test]
fn test_v9_legacy_writer_matches_current_encoder() {
    for record in samples().into_iter().map(multicast) {
        let mut legacy = Vec::new();
        encode_legacy(&mut legacy, &record, 9).unwrap();
        assert_eq!(legacy, encode_to_vec(&record).unwrap());
    }
}

#[test]
fn test_guid_round_trip() {
    let mut buf = Vec::new();
    write_guid(&mut buf, SOURCE).unwrap();
    assert_eq!(buf.len(), 16);
    assert_eq!(buf[0], 0xe0);
    assert_eq!(read_guid(&mut &buf[..]).unwrap(), SOURCE);
    assert!(write_guid(&mut Vec::new(), "not-a-guid").is_err());
}
