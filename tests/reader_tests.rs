use record_logger::{
    decode_if_binary, decode_object, decode_to_json, is_binary, Cbor, Config, DecodeError, Encoder, Json, LogReader,
    TimeFormat,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Builds the same record with any encoder.
fn record<E: Encoder>(seq: i64) -> Vec<u8> {
    let mut buf = Vec::new();
    E::append_begin_marker(&mut buf);
    E::append_key(&mut buf, "level");
    E::append_str(&mut buf, "info");
    E::append_key(&mut buf, "seq");
    E::append_int(&mut buf, seq);
    E::append_key(&mut buf, "big");
    E::append_uint(&mut buf, u64::MAX);
    E::append_key(&mut buf, "ratio");
    E::append_float64(&mut buf, 1.5);
    E::append_key(&mut buf, "ok");
    E::append_bool(&mut buf, true);
    E::append_key(&mut buf, "none");
    E::append_nil(&mut buf);
    E::append_key(&mut buf, "tags");
    E::append_strs(&mut buf, &["a", "b\"quoted\""]);
    E::append_key(&mut buf, "raw");
    E::append_bytes(&mut buf, b"line\nbreak");
    E::append_key(&mut buf, "elapsed");
    E::append_duration(&mut buf, Duration::from_millis(250), Duration::from_millis(1), true);
    E::append_key(&mut buf, "at");
    E::append_time(
        &mut buf,
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        &TimeFormat::Unix,
    );
    E::append_key(&mut buf, "v4");
    E::append_ip(&mut buf, IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)));
    E::append_key(&mut buf, "net");
    E::append_ip_prefix(&mut buf, IpAddr::V6(Ipv6Addr::LOCALHOST), 128);
    E::append_key(&mut buf, "mac");
    E::append_mac(&mut buf, &[0x00, 0x1b, 0x44, 0x11, 0x3a, 0xb7]);
    E::append_key(&mut buf, "nested");
    E::append_begin_marker(&mut buf);
    E::append_key(&mut buf, "inner");
    E::append_ints(&mut buf, &[1i32, -2, 3]);
    E::append_end_marker(&mut buf);
    E::append_key(&mut buf, "any");
    E::append_any(&mut buf, &serde_json::json!({"k": [1, 2]}));
    E::append_key(&mut buf, "message");
    E::append_str(&mut buf, "hello");
    E::append_end_marker(&mut buf);
    E::append_line_break(&mut buf);
    buf
}

fn unix_config() -> Arc<Config> {
    Arc::new(Config {
        time_field_format: TimeFormat::Unix,
        ..Config::default()
    })
}

#[test]
fn test_binary_record_decodes_to_json_text() {
    let json = String::from_utf8(record::<Json>(1)).unwrap();
    let cbor = record::<Cbor>(1);
    assert!(is_binary(&cbor));
    assert!(!is_binary(json.as_bytes()));

    let mut reader = LogReader::with_config(&cbor, unix_config());
    let decoded = reader.read_entry().unwrap().unwrap();
    assert_eq!(format!("{decoded}\n"), json);
    assert!(reader.read_entry().is_none());

    let value: serde_json::Value = serde_json::from_str(&decoded).unwrap();
    assert_eq!(value["big"], u64::MAX);
    assert_eq!(value["tags"][1], "b\"quoted\"");
    assert_eq!(value["raw"], "line\nbreak");
    assert_eq!(value["net"], "::1/128");
    assert_eq!(value["mac"], "00:1b:44:11:3a:b7");
    assert_eq!(value["nested"]["inner"][1], -2);
    assert_eq!(value["any"]["k"][0], 1);
}

#[test]
fn test_reader_walks_a_stream() {
    let mut stream = Vec::new();
    for seq in 0..5 {
        stream.extend_from_slice(&record::<Cbor>(seq));
    }

    let mut reader = LogReader::with_config(&stream, unix_config());
    let mut seqs = Vec::new();
    let mut last_pos = 0;
    while let Some(entry) = reader.read_entry() {
        let value: serde_json::Value = serde_json::from_str(&entry.unwrap()).unwrap();
        seqs.push(value["seq"].as_i64().unwrap());
        assert!(reader.position() > last_pos);
        last_pos = reader.position();
    }
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    assert_eq!(reader.position(), stream.len());
}

#[test]
fn test_decode_object_reports_consumed_bytes() {
    let first = record::<Cbor>(7);
    let mut stream = first.clone();
    stream.extend_from_slice(&record::<Cbor>(8));

    let mut out = Vec::new();
    let used = decode_object(&stream, &mut out).unwrap();
    assert_eq!(used, first.len());
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["seq"], 7);
}

#[test]
fn test_empty_input() {
    assert!(LogReader::new(&[]).read_entry().is_none());
    assert_eq!(decode_to_json(&[]).unwrap(), "");
    assert_eq!(decode_if_binary(&[]).unwrap(), "");
    assert!(!is_binary(&[]));
}

#[test]
fn test_text_passes_through() {
    let text = record::<Json>(3);
    assert_eq!(decode_if_binary(&text).unwrap(), String::from_utf8(text).unwrap());
}

#[test]
fn test_truncated_stream_stops_with_error() {
    let mut stream = record::<Cbor>(1);
    let whole = stream.len();
    let second = record::<Cbor>(2);
    stream.extend_from_slice(&second[..second.len() - 3]);

    let mut reader = LogReader::new(&stream);
    assert!(reader.read_entry().unwrap().is_ok());
    let err = reader.read_entry().unwrap().unwrap_err();
    assert!(matches!(err, DecodeError::UnexpectedEof { .. }));
    assert!(err.offset() >= whole);
    assert!(reader.read_entry().is_none());
    assert_eq!(reader.position(), whole);

    assert!(decode_to_json(&stream).is_err());
}

#[test]
fn test_every_prefix_of_a_record_fails_cleanly() {
    let full = record::<Cbor>(42);
    for cut in 1..full.len() {
        let mut out = Vec::new();
        assert!(decode_object(&full[..cut], &mut out).is_err(), "prefix of {cut} bytes");
        assert!(out.is_empty());
    }
}

#[test]
fn test_malformed_input() {
    // break marker where a key should be
    assert!(matches!(
        decode_to_json(&[0xa1, 0xff]),
        Err(DecodeError::UnexpectedBreak { .. }) | Err(DecodeError::InvalidMapKey { .. })
    ));
    // integer key
    assert!(matches!(
        decode_to_json(&[0xa1, 0x01, 0x02]),
        Err(DecodeError::InvalidMapKey { .. })
    ));
    // reserved additional information
    assert!(decode_to_json(&[0xa1, 0x61, b'k', 0x1c]).is_err());
    // unknown tag
    assert!(matches!(
        decode_to_json(&[0xa1, 0x61, b'k', 0xd8, 0x63, 0x00]),
        Err(DecodeError::UnsupportedTag { tag: 0x63, .. })
    ));
}

#[test]
fn test_deep_nesting_is_rejected() {
    let mut data = vec![0xa1, 0x61, b'k'];
    data.extend(std::iter::repeat(0x81).take(10_000));
    data.push(0x00);
    assert!(matches!(decode_to_json(&data), Err(DecodeError::TooDeep { .. })));
}

fn edge_record<E: Encoder>(format: &TimeFormat) -> Vec<u8> {
    let base = OffsetDateTime::from_unix_timestamp(1_600_000_000).unwrap();
    let mut buf = Vec::new();
    E::append_begin_marker(&mut buf);
    E::append_key(&mut buf, "late");
    E::append_time(&mut buf, base + time::Duration::nanoseconds(999_999_700), format);
    E::append_key(&mut buf, "micro");
    E::append_time(&mut buf, base + time::Duration::microseconds(123_456), format);
    E::append_key(&mut buf, "short_mac");
    E::append_mac(&mut buf, &[0x02, 0x00, 0x5e, 0x10]);
    E::append_key(&mut buf, "odd_mac");
    E::append_mac(&mut buf, &[1, 2, 3, 4, 5]);
    E::append_key(&mut buf, "eui64");
    E::append_mac(&mut buf, &[1, 2, 3, 4, 5, 6, 7, 8]);
    E::append_end_marker(&mut buf);
    E::append_line_break(&mut buf);
    buf
}

#[test]
fn test_edge_values_decode_like_text() {
    for format in [
        TimeFormat::Unix,
        TimeFormat::UnixMs,
        TimeFormat::UnixMicros,
        TimeFormat::UnixNanos,
        TimeFormat::Rfc3339,
        TimeFormat::Rfc3339Nanos,
    ] {
        let json = String::from_utf8(edge_record::<Json>(&format)).unwrap();
        let cbor = edge_record::<Cbor>(&format);
        let config = Arc::new(Config {
            time_field_format: format.clone(),
            ..Config::default()
        });
        let decoded: Vec<String> = LogReader::with_config(&cbor, config)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded, vec![json.trim_end().to_string()], "{format:?}");
    }
}
