//! Binary encoder writing CBOR (RFC 8949).
//!
//! A record is an indefinite-length map (`0xbf ... 0xff`) so fields can be
//! appended without knowing their count. Fixed-size scalar lists use the
//! definite-length array form; builder-made arrays are indefinite.

use std::fmt;
use std::io::Write as _;
use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::config::TimeFormat;
use crate::encoder::{duration_count, duration_ratio, Encoder};

pub(crate) const MAJOR_UNSIGNED: u8 = 0x00;
pub(crate) const MAJOR_NEGATIVE: u8 = 0x20;
pub(crate) const MAJOR_BYTES: u8 = 0x40;
pub(crate) const MAJOR_TEXT: u8 = 0x60;
pub(crate) const MAJOR_ARRAY: u8 = 0x80;
pub(crate) const MAJOR_MAP: u8 = 0xa0;
pub(crate) const MAJOR_TAG: u8 = 0xc0;
pub(crate) const MAJOR_SIMPLE: u8 = 0xe0;

pub(crate) const INDEFINITE: u8 = 31;
pub(crate) const BREAK: u8 = 0xff;

pub(crate) const SIMPLE_FALSE: u8 = MAJOR_SIMPLE | 20;
pub(crate) const SIMPLE_TRUE: u8 = MAJOR_SIMPLE | 21;
pub(crate) const SIMPLE_NULL: u8 = MAJOR_SIMPLE | 22;
pub(crate) const FLOAT16: u8 = MAJOR_SIMPLE | 25;
pub(crate) const FLOAT32: u8 = MAJOR_SIMPLE | 26;
pub(crate) const FLOAT64: u8 = MAJOR_SIMPLE | 27;

pub(crate) const TAG_EPOCH_TIME: u64 = 1;
pub(crate) const TAG_NETWORK_ADDR: u64 = 260;
pub(crate) const TAG_NETWORK_PREFIX: u64 = 261;
pub(crate) const TAG_EMBEDDED_JSON: u64 = 262;
pub(crate) const TAG_HEX_STRING: u64 = 263;
pub(crate) const TAG_EXTENDED_TIME: u64 = 1001;

/// Extended time map keys for whole seconds and the nanosecond part.
pub(crate) const EXTENDED_TIME_SECS: i64 = 1;
pub(crate) const EXTENDED_TIME_NANOS: i64 = -9;

/// Below this many seconds from the epoch a float64 still resolves a
/// microsecond with room to spare.
pub(crate) const FLOAT_TIME_LIMIT: u64 = 1 << 31;

const HEX: &[u8; 16] = b"0123456789abcdef";

const NAN32: [u8; 5] = [FLOAT32, 0x7f, 0xc0, 0x00, 0x00];
const POS_INF32: [u8; 5] = [FLOAT32, 0x7f, 0x80, 0x00, 0x00];
const NEG_INF32: [u8; 5] = [FLOAT32, 0xff, 0x80, 0x00, 0x00];
const NAN64: [u8; 9] = [FLOAT64, 0x7f, 0xf8, 0, 0, 0, 0, 0, 0];
const POS_INF64: [u8; 9] = [FLOAT64, 0x7f, 0xf0, 0, 0, 0, 0, 0, 0];
const NEG_INF64: [u8; 9] = [FLOAT64, 0xff, 0xf0, 0, 0, 0, 0, 0, 0];

/// CBOR binary encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cbor;

/// Encodes a major type and argument in the shortest form, returning the
/// header bytes and how many of them are used.
fn head(major: u8, n: u64) -> ([u8; 9], usize) {
    let mut out = [0u8; 9];
    let len = if n < 24 {
        out[0] = major | n as u8;
        1
    } else if n < 1 << 8 {
        out[0] = major | 24;
        out[1] = n as u8;
        2
    } else if n < 1 << 16 {
        out[0] = major | 25;
        out[1..3].copy_from_slice(&(n as u16).to_be_bytes());
        3
    } else if n < 1 << 32 {
        out[0] = major | 26;
        out[1..5].copy_from_slice(&(n as u32).to_be_bytes());
        5
    } else {
        out[0] = major | 27;
        out[1..9].copy_from_slice(&n.to_be_bytes());
        9
    };
    (out, len)
}

pub(crate) fn append_head(dst: &mut Vec<u8>, major: u8, n: u64) {
    let (bytes, len) = head(major, n);
    dst.extend_from_slice(&bytes[..len]);
}

/// Inserts a header in front of a payload already written at `mark..`.
fn prefix_head(dst: &mut Vec<u8>, mark: usize, major: u8) {
    let len = (dst.len() - mark) as u64;
    let (bytes, n) = head(major, len);
    dst.splice(mark..mark, bytes[..n].iter().copied());
}

fn append_i64(dst: &mut Vec<u8>, val: i64) {
    if val < 0 {
        // -1 - val never overflows for negative val.
        append_head(dst, MAJOR_NEGATIVE, (-1 - val) as u64);
    } else {
        append_head(dst, MAJOR_UNSIGNED, val as u64);
    }
}

fn append_f32(dst: &mut Vec<u8>, val: f32) {
    if val.is_nan() {
        dst.extend_from_slice(&NAN32);
    } else if val == f32::INFINITY {
        dst.extend_from_slice(&POS_INF32);
    } else if val == f32::NEG_INFINITY {
        dst.extend_from_slice(&NEG_INF32);
    } else {
        dst.push(FLOAT32);
        dst.extend_from_slice(&val.to_bits().to_be_bytes());
    }
}

fn append_f64(dst: &mut Vec<u8>, val: f64) {
    if val.is_nan() {
        dst.extend_from_slice(&NAN64);
    } else if val == f64::INFINITY {
        dst.extend_from_slice(&POS_INF64);
    } else if val == f64::NEG_INFINITY {
        dst.extend_from_slice(&NEG_INF64);
    } else {
        dst.push(FLOAT64);
        dst.extend_from_slice(&val.to_bits().to_be_bytes());
    }
}

fn append_text(dst: &mut Vec<u8>, s: &str) {
    append_head(dst, MAJOR_TEXT, s.len() as u64);
    dst.extend_from_slice(s.as_bytes());
}

fn append_byte_string(dst: &mut Vec<u8>, b: &[u8]) {
    append_head(dst, MAJOR_BYTES, b.len() as u64);
    dst.extend_from_slice(b);
}

fn append_ip_bytes(dst: &mut Vec<u8>, ip: IpAddr) {
    match ip {
        IpAddr::V4(v4) => append_byte_string(dst, &v4.octets()),
        IpAddr::V6(v6) => append_byte_string(dst, &v6.octets()),
    }
}

/// Writes `t` as tag 1 when the epoch value is exact in that form: integer
/// seconds, or a float for microsecond-aligned times before 2038. Anything
/// finer goes out as an extended time map `{1: secs, -9: nanos}`.
fn append_epoch_time(dst: &mut Vec<u8>, t: OffsetDateTime) {
    let secs = t.unix_timestamp();
    let nanos = t.nanosecond();
    if nanos == 0 {
        append_head(dst, MAJOR_TAG, TAG_EPOCH_TIME);
        append_i64(dst, secs);
    } else if nanos % 1_000 == 0 && secs.unsigned_abs() < FLOAT_TIME_LIMIT {
        append_head(dst, MAJOR_TAG, TAG_EPOCH_TIME);
        append_f64(dst, secs as f64 + f64::from(nanos) / 1e9);
    } else {
        append_head(dst, MAJOR_TAG, TAG_EXTENDED_TIME);
        append_head(dst, MAJOR_MAP, 2);
        append_i64(dst, EXTENDED_TIME_SECS);
        append_i64(dst, secs);
        append_i64(dst, EXTENDED_TIME_NANOS);
        append_head(dst, MAJOR_UNSIGNED, u64::from(nanos));
    }
}

fn append_list<T>(dst: &mut Vec<u8>, vals: &[T], mut f: impl FnMut(&mut Vec<u8>, &T)) {
    if vals.is_empty() {
        dst.push(MAJOR_ARRAY | INDEFINITE);
        dst.push(BREAK);
        return;
    }
    append_head(dst, MAJOR_ARRAY, vals.len() as u64);
    for val in vals {
        f(dst, val);
    }
}

impl Encoder for Cbor {
    const IS_BINARY: bool = true;

    fn append_begin_marker(dst: &mut Vec<u8>) {
        dst.push(MAJOR_MAP | INDEFINITE);
    }

    fn append_end_marker(dst: &mut Vec<u8>) {
        dst.push(BREAK);
    }

    fn append_line_break(_dst: &mut Vec<u8>) {}

    fn append_array_start(dst: &mut Vec<u8>) {
        dst.push(MAJOR_ARRAY | INDEFINITE);
    }

    fn append_array_end(dst: &mut Vec<u8>) {
        dst.push(BREAK);
    }

    fn append_array_delim(_dst: &mut Vec<u8>) {}

    fn append_object_data(dst: &mut Vec<u8>, data: &[u8]) {
        dst.extend_from_slice(data);
    }

    fn append_key(dst: &mut Vec<u8>, key: &str) {
        append_text(dst, key);
    }

    fn append_nil(dst: &mut Vec<u8>) {
        dst.push(SIMPLE_NULL);
    }

    fn append_bool(dst: &mut Vec<u8>, val: bool) {
        dst.push(if val { SIMPLE_TRUE } else { SIMPLE_FALSE });
    }

    fn append_bools(dst: &mut Vec<u8>, vals: &[bool]) {
        append_list(dst, vals, |dst, &v| Self::append_bool(dst, v));
    }

    fn append_int(dst: &mut Vec<u8>, val: i64) {
        append_i64(dst, val);
    }

    fn append_ints<I: Into<i64> + Copy>(dst: &mut Vec<u8>, vals: &[I]) {
        append_list(dst, vals, |dst, &v| append_i64(dst, v.into()));
    }

    fn append_uint(dst: &mut Vec<u8>, val: u64) {
        append_head(dst, MAJOR_UNSIGNED, val);
    }

    fn append_uints<U: Into<u64> + Copy>(dst: &mut Vec<u8>, vals: &[U]) {
        append_list(dst, vals, |dst, &v| append_head(dst, MAJOR_UNSIGNED, v.into()));
    }

    fn append_float32(dst: &mut Vec<u8>, val: f32) {
        append_f32(dst, val);
    }

    fn append_floats32(dst: &mut Vec<u8>, vals: &[f32]) {
        append_list(dst, vals, |dst, &v| append_f32(dst, v));
    }

    fn append_float64(dst: &mut Vec<u8>, val: f64) {
        append_f64(dst, val);
    }

    fn append_floats64(dst: &mut Vec<u8>, vals: &[f64]) {
        append_list(dst, vals, |dst, &v| append_f64(dst, v));
    }

    fn append_str(dst: &mut Vec<u8>, val: &str) {
        append_text(dst, val);
    }

    fn append_strs<S: AsRef<str>>(dst: &mut Vec<u8>, vals: &[S]) {
        append_list(dst, vals, |dst, v| append_text(dst, v.as_ref()));
    }

    fn append_display(dst: &mut Vec<u8>, val: &dyn fmt::Display) {
        let mark = dst.len();
        if write!(dst, "{val}").is_err() {
            dst.truncate(mark);
            append_text(dst, "marshaling error: formatter failed");
            return;
        }
        prefix_head(dst, mark, MAJOR_TEXT);
    }

    fn append_bytes(dst: &mut Vec<u8>, val: &[u8]) {
        append_byte_string(dst, val);
    }

    fn append_hex(dst: &mut Vec<u8>, val: &[u8]) {
        append_head(dst, MAJOR_TAG, TAG_HEX_STRING);
        append_byte_string(dst, val);
    }

    fn append_raw_json(dst: &mut Vec<u8>, json: &[u8]) {
        append_head(dst, MAJOR_TAG, TAG_EMBEDDED_JSON);
        append_byte_string(dst, json);
    }

    fn append_time(dst: &mut Vec<u8>, t: OffsetDateTime, _format: &TimeFormat) {
        append_epoch_time(dst, t);
    }

    fn append_times(dst: &mut Vec<u8>, vals: &[OffsetDateTime], _format: &TimeFormat) {
        append_list(dst, vals, |dst, &t| append_epoch_time(dst, t));
    }

    fn append_duration(dst: &mut Vec<u8>, d: Duration, unit: Duration, use_int: bool) {
        if use_int {
            append_i64(dst, duration_count(d, unit));
        } else {
            append_f64(dst, duration_ratio(d, unit));
        }
    }

    fn append_durations(dst: &mut Vec<u8>, vals: &[Duration], unit: Duration, use_int: bool) {
        append_list(dst, vals, |dst, &d| Self::append_duration(dst, d, unit, use_int));
    }

    fn append_any<T: Serialize + ?Sized>(dst: &mut Vec<u8>, val: &T) {
        let tag_mark = dst.len();
        append_head(dst, MAJOR_TAG, TAG_EMBEDDED_JSON);
        let mark = dst.len();
        match serde_json::to_writer(&mut *dst, val) {
            Ok(()) => prefix_head(dst, mark, MAJOR_BYTES),
            Err(err) => {
                dst.truncate(tag_mark);
                append_text(dst, &format!("marshaling error: {err}"));
            }
        }
    }

    fn append_ip(dst: &mut Vec<u8>, ip: IpAddr) {
        append_head(dst, MAJOR_TAG, TAG_NETWORK_ADDR);
        append_ip_bytes(dst, ip);
    }

    fn append_ip_prefix(dst: &mut Vec<u8>, ip: IpAddr, prefix_len: u8) {
        append_head(dst, MAJOR_TAG, TAG_NETWORK_PREFIX);
        append_head(dst, MAJOR_MAP, 1);
        append_ip_bytes(dst, ip);
        append_head(dst, MAJOR_UNSIGNED, u64::from(prefix_len));
    }

    /// EUI-48 and EUI-64 addresses are tagged bytes. Other lengths would read
    /// back as an IP address or not at all, so they are written as the text
    /// the JSON encoder produces.
    fn append_mac(dst: &mut Vec<u8>, mac: &[u8]) {
        if matches!(mac.len(), 6 | 8) {
            append_head(dst, MAJOR_TAG, TAG_NETWORK_ADDR);
            append_byte_string(dst, mac);
            return;
        }
        append_head(dst, MAJOR_TEXT, (mac.len() * 3).saturating_sub(1) as u64);
        for (i, &b) in mac.iter().enumerate() {
            if i > 0 {
                dst.push(b':');
            }
            dst.push(HEX[usize::from(b >> 4)]);
            dst.push(HEX[usize::from(b & 0xf)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(f: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
        let mut buf = Vec::new();
        f(&mut buf);
        buf
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(encode(|b| Cbor::append_uint(b, 23)), [0x17]);
        assert_eq!(encode(|b| Cbor::append_uint(b, 24)), [0x18, 24]);
        assert_eq!(encode(|b| Cbor::append_uint(b, 255)), [0x18, 0xff]);
        assert_eq!(encode(|b| Cbor::append_uint(b, 256)), [0x19, 0x01, 0x00]);
        assert_eq!(encode(|b| Cbor::append_uint(b, 65535)), [0x19, 0xff, 0xff]);
        assert_eq!(encode(|b| Cbor::append_uint(b, 65536)), [0x1a, 0, 1, 0, 0]);
        assert_eq!(
            encode(|b| Cbor::append_uint(b, 1 << 32)),
            [0x1b, 0, 0, 0, 1, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_negative_integers() {
        assert_eq!(encode(|b| Cbor::append_int(b, -1)), [0x20]);
        assert_eq!(encode(|b| Cbor::append_int(b, -25)), [0x38, 24]);
        assert_eq!(
            encode(|b| Cbor::append_int(b, i64::MIN)),
            [0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn test_canonical_float_specials() {
        assert_eq!(encode(|b| Cbor::append_float64(b, f64::NAN)), NAN64);
        assert_eq!(encode(|b| Cbor::append_float64(b, -f64::NAN)), NAN64);
        assert_eq!(encode(|b| Cbor::append_float32(b, f32::INFINITY)), POS_INF32);
        assert_eq!(encode(|b| Cbor::append_float64(b, f64::NEG_INFINITY)), NEG_INF64);
        assert_eq!(encode(|b| Cbor::append_float32(b, 1.5)).len(), 5);
        assert_eq!(encode(|b| Cbor::append_float64(b, 1.5)).len(), 9);
    }

    #[test]
    fn test_strings_and_keys() {
        assert_eq!(encode(|b| Cbor::append_key(b, "ab")), [0x62, b'a', b'b']);
        let long = "x".repeat(300);
        let out = encode(|b| Cbor::append_str(b, &long));
        assert_eq!(&out[..3], &[0x79, 0x01, 0x2c]);
        assert_eq!(out.len(), 303);
    }

    #[test]
    fn test_display_gets_length_prefix() {
        let out = encode(|b| Cbor::append_display(b, &42));
        assert_eq!(out, [0x62, b'4', b'2']);
    }

    #[test]
    fn test_arrays() {
        assert_eq!(encode(|b| Cbor::append_ints::<i32>(b, &[])), [0x9f, 0xff]);
        assert_eq!(encode(|b| Cbor::append_ints(b, &[1i32, -1])), [0x82, 0x01, 0x20]);
        assert_eq!(encode(|b| Cbor::append_bools(b, &[true])), [0x81, 0xf5]);
    }

    #[test]
    fn test_timestamps() {
        let whole = OffsetDateTime::from_unix_timestamp(1_000).unwrap();
        assert_eq!(
            encode(|b| Cbor::append_time(b, whole, &TimeFormat::Rfc3339)),
            [0xc1, 0x19, 0x03, 0xe8]
        );
        let frac = whole + time::Duration::milliseconds(500);
        let out = encode(|b| Cbor::append_time(b, frac, &TimeFormat::Rfc3339));
        assert_eq!(out[0], 0xc1);
        assert_eq!(out[1], FLOAT64);
        assert_eq!(f64::from_be_bytes(out[2..10].try_into().unwrap()), 1000.5);

        let fine = whole + time::Duration::nanoseconds(1);
        assert_eq!(
            encode(|b| Cbor::append_time(b, fine, &TimeFormat::Rfc3339)),
            [0xd9, 0x03, 0xe9, 0xa2, 0x01, 0x19, 0x03, 0xe8, 0x28, 0x01]
        );
        let far = OffsetDateTime::from_unix_timestamp(1 << 32).unwrap() + time::Duration::milliseconds(1);
        assert_eq!(encode(|b| Cbor::append_time(b, far, &TimeFormat::Rfc3339))[..3], [0xd9, 0x03, 0xe9]);
    }

    #[test]
    fn test_mac_addresses() {
        let eui48 = [0x00, 0x1b, 0x44, 0x11, 0x3a, 0xb7];
        let mut expected = vec![0xd9, 0x01, 0x04, 0x46];
        expected.extend_from_slice(&eui48);
        assert_eq!(encode(|b| Cbor::append_mac(b, &eui48)), expected);

        let mut short = vec![0x6b];
        short.extend_from_slice(b"02:00:5e:10");
        assert_eq!(encode(|b| Cbor::append_mac(b, &[0x02, 0x00, 0x5e, 0x10])), short);
        assert_eq!(encode(|b| Cbor::append_mac(b, &[])), [0x60]);
    }

    #[test]
    fn test_tagged_values() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            encode(|b| Cbor::append_ip(b, ip)),
            [0xd9, 0x01, 0x04, 0x44, 10, 0, 0, 1]
        );
        assert_eq!(
            encode(|b| Cbor::append_ip_prefix(b, ip, 8)),
            [0xd9, 0x01, 0x05, 0xa1, 0x44, 10, 0, 0, 1, 0x08]
        );
        assert_eq!(encode(|b| Cbor::append_hex(b, &[0xab])), [0xd9, 0x01, 0x07, 0x41, 0xab]);
        assert_eq!(
            encode(|b| Cbor::append_any(b, &[1, 2])),
            [0xd9, 0x01, 0x06, 0x45, b'[', b'1', b',', b'2', b']']
        );
    }
}
