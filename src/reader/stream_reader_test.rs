use std::io::Cursor;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::tempdir;

use super::*;
use crate::codec::encode_to_vec;
use crate::codec::CkmonWriter;
use crate::entry::*;

fn t(n: i64) -> DateTimeStamp {
    DateTimeStamp::new(638_000_000_000_000_000 + n, 0)
}

fn record(source: &str, n: i64) -> LogRecord {
    LogRecord::line(LogLevel::Info, t(n), format!("{source}-{n}"))
        .with_source(source, 0)
        .with_multicast("pipe", None)
}

fn stream(records: &[LogRecord]) -> Vec<u8> {
    let mut writer = CkmonWriter::new(Vec::new()).unwrap();
    for r in records {
        writer.write(r).unwrap();
    }
    writer.finish().unwrap()
}

#[test]
fn test_reads_n_records_then_stops_cleanly() {
    let records: Vec<_> = (0..5).map(|i| record("a", i)).collect();
    let mut reader = StreamReader::from_reader(Cursor::new(stream(&records))).unwrap();
    assert_eq!(reader.stream_version(), 9);

    let mut read = Vec::new();
    while reader.advance() {
        read.push(reader.current().unwrap().clone());
    }
    assert_eq!(read, records);
    assert!(!reader.bad_end_of_file());
    assert!(reader.read_error().is_none());
    assert!(!reader.advance());
    assert!(reader.current().is_none());
}

#[test]
fn test_missing_end_marker_is_bad_end_of_file() {
    let records: Vec<_> = (0..3).map(|i| record("a", i)).collect();
    let mut bytes = stream(&records);
    bytes.pop();

    let mut reader = StreamReader::from_reader(Cursor::new(bytes)).unwrap();
    let read: Vec<_> = reader.by_ref().collect();
    assert_eq!(read, records);
    assert!(reader.bad_end_of_file());
    assert!(reader.read_error().is_none());
}

#[test]
fn test_truncated_last_record_keeps_previous_ones() {
    let records: Vec<_> = (0..3).map(|i| record("a", i)).collect();
    let mut bytes = stream(&records);
    bytes.truncate(bytes.len() - 4);

    let mut reader = StreamReader::from_reader(Cursor::new(bytes)).unwrap();
    let read: Vec<_> = reader.by_ref().collect();
    assert_eq!(read, records[..2].to_vec());
    assert!(reader.bad_end_of_file());
}

#[test]
fn test_corrupt_record_is_captured_not_raised() {
    let good = record("a", 1);
    let mut bytes = stream(&[good.clone()]);
    let end = bytes.len() - 1;
    // replace the end marker with an invalid level byte and garbage flags
    bytes[end] = 0x03;
    bytes.push(0x01);

    let mut reader = StreamReader::from_reader(Cursor::new(bytes)).unwrap();
    assert!(reader.advance());
    assert_eq!(reader.current(), Some(&good));
    assert!(!reader.advance());
    assert!(matches!(
        reader.read_error(),
        Some(crate::CodecError::InvalidHeader { .. })
    ));
    assert!(!reader.bad_end_of_file());
}

#[test]
fn test_gzip_stream_is_detected() {
    let records: Vec<_> = (0..4).map(|i| record("g", i)).collect();
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&stream(&records)).unwrap();
    let compressed = gz.finish().unwrap();

    let reader = StreamReader::from_reader(Cursor::new(compressed)).unwrap();
    assert_eq!(reader.collect::<Vec<_>>(), records);
}

#[test]
fn test_source_filter_skips_other_sources_and_local_records() {
    let mut records = Vec::new();
    for i in 0..6 {
        records.push(record(if i % 2 == 0 { "a" } else { "b" }, i));
    }
    records.push(LogRecord::line(LogLevel::Info, t(10), "local"));
    records.push(record("a", 11));

    let reader = StreamReader::from_reader(Cursor::new(stream(&records)))
        .unwrap()
        .with_filter(SourceFilter::new("a"));
    let texts: Vec<String> = reader.map(|r| r.text_or_empty().to_string()).collect();
    assert_eq!(texts, vec!["a-0", "a-2", "a-4", "a-11"]);
}

#[test]
fn test_source_filter_stops_after_known_last_offset() {
    let records: Vec<_> = (0..6).map(|i| record("a", i)).collect();
    let bytes = stream(&records);

    let mut offsets = Vec::new();
    let mut reader = StreamReader::from_reader(Cursor::new(bytes.clone())).unwrap();
    while reader.advance() {
        offsets.push(reader.current_offset());
    }
    assert_eq!(offsets[0], 9);
    let record_len = encode_to_vec(&records[0]).unwrap().len() as u64;
    assert_eq!(offsets[1], 9 + record_len);

    let mut reader = StreamReader::from_reader(Cursor::new(bytes))
        .unwrap()
        .with_filter(SourceFilter::new("a").until(offsets[2]));
    let mut count = 0;
    while reader.advance() {
        count += 1;
    }
    assert_eq!(count, 3);
    assert!(!reader.bad_end_of_file());
    assert!(reader.read_error().is_none());
}

#[test]
fn test_open_file_and_reject_bad_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("x.ckmon");
    std::fs::write(&path, stream(&[record("a", 1)])).unwrap();
    assert_eq!(StreamReader::open(&path).unwrap().count(), 1);

    let bad = dir.path().join("bad.ckmon");
    std::fs::write(&bad, b"NOTCKMON").unwrap();
    assert!(StreamReader::open(&bad).is_err());
    assert!(StreamReader::open(dir.path().join("missing.ckmon")).is_err());
}
