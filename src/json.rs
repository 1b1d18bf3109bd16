//! Text encoder writing JSON.
//!
//! The free functions here are also what the CBOR decoder renders with, so a
//! decoded binary record comes out byte-for-byte like the text encoder's
//! output for the same fields.

use std::fmt;
use std::io::Write as _;
use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::formatting::Formattable;
use time::OffsetDateTime;

use crate::config::TimeFormat;
use crate::encoder::{duration_count, duration_ratio, Encoder};

const HEX: &[u8; 16] = b"0123456789abcdef";

/// JSON text encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

#[inline]
fn needs_escape(b: u8) -> bool {
    b < 0x20 || b == b'"' || b == b'\\'
}

/// Escapes already-valid UTF-8 without surrounding quotes.
pub(crate) fn escape_into(dst: &mut Vec<u8>, s: &[u8]) {
    let mut start = 0;
    for (i, &b) in s.iter().enumerate() {
        if !needs_escape(b) {
            continue;
        }
        dst.extend_from_slice(&s[start..i]);
        match b {
            b'"' | b'\\' => dst.extend_from_slice(&[b'\\', b]),
            b'\x08' => dst.extend_from_slice(b"\\b"),
            b'\x0c' => dst.extend_from_slice(b"\\f"),
            b'\n' => dst.extend_from_slice(b"\\n"),
            b'\r' => dst.extend_from_slice(b"\\r"),
            b'\t' => dst.extend_from_slice(b"\\t"),
            _ => dst.extend_from_slice(&[
                b'\\',
                b'u',
                b'0',
                b'0',
                HEX[usize::from(b >> 4)],
                HEX[usize::from(b & 0xf)],
            ]),
        }
        start = i + 1;
    }
    dst.extend_from_slice(&s[start..]);
}

/// Appends `s` as a quoted, escaped JSON string.
pub(crate) fn append_string(dst: &mut Vec<u8>, s: &str) {
    dst.push(b'"');
    escape_into(dst, s.as_bytes());
    dst.push(b'"');
}

/// Like [`append_string`] but for arbitrary bytes: every invalid UTF-8
/// sequence becomes the escape `\ufffd`.
pub(crate) fn append_string_bytes(dst: &mut Vec<u8>, bytes: &[u8]) {
    dst.push(b'"');
    for chunk in bytes.utf8_chunks() {
        escape_into(dst, chunk.valid().as_bytes());
        if !chunk.invalid().is_empty() {
            dst.extend_from_slice(b"\\ufffd");
        }
    }
    dst.push(b'"');
}

pub(crate) fn append_hex_string(dst: &mut Vec<u8>, bytes: &[u8]) {
    dst.push(b'"');
    for &b in bytes {
        dst.push(HEX[usize::from(b >> 4)]);
        dst.push(HEX[usize::from(b & 0xf)]);
    }
    dst.push(b'"');
}

pub(crate) fn append_mac_string(dst: &mut Vec<u8>, mac: &[u8]) {
    dst.push(b'"');
    for (i, &b) in mac.iter().enumerate() {
        if i > 0 {
            dst.push(b':');
        }
        dst.push(HEX[usize::from(b >> 4)]);
        dst.push(HEX[usize::from(b & 0xf)]);
    }
    dst.push(b'"');
}

pub(crate) fn append_u64(dst: &mut Vec<u8>, mut val: u64) {
    let mut tmp = [0u8; 20];
    let mut i = tmp.len();
    loop {
        i -= 1;
        tmp[i] = b'0' + (val % 10) as u8;
        val /= 10;
        if val == 0 {
            break;
        }
    }
    dst.extend_from_slice(&tmp[i..]);
}

pub(crate) fn append_i64(dst: &mut Vec<u8>, val: i64) {
    if val < 0 {
        dst.push(b'-');
    }
    append_u64(dst, val.unsigned_abs());
}

// Rust prints `1e21` where JSON consumers expect `1e+21`.
fn sign_exponent(dst: &mut Vec<u8>, mark: usize) {
    if let Some(pos) = dst[mark..].iter().position(|&b| b == b'e') {
        let at = mark + pos + 1;
        if dst.get(at) != Some(&b'-') {
            dst.insert(at, b'+');
        }
    }
}

pub(crate) fn append_f64(dst: &mut Vec<u8>, val: f64) {
    if val.is_nan() {
        dst.extend_from_slice(b"\"NaN\"");
        return;
    }
    if val.is_infinite() {
        let s: &[u8] = if val > 0.0 { b"\"+Inf\"" } else { b"\"-Inf\"" };
        dst.extend_from_slice(s);
        return;
    }
    let abs = val.abs();
    let mark = dst.len();
    if abs != 0.0 && !(1e-6..1e21).contains(&abs) {
        let _ = write!(dst, "{val:e}");
        sign_exponent(dst, mark);
    } else {
        let _ = write!(dst, "{val}");
    }
}

pub(crate) fn append_f32(dst: &mut Vec<u8>, val: f32) {
    if val.is_nan() {
        dst.extend_from_slice(b"\"NaN\"");
        return;
    }
    if val.is_infinite() {
        let s: &[u8] = if val > 0.0 { b"\"+Inf\"" } else { b"\"-Inf\"" };
        dst.extend_from_slice(s);
        return;
    }
    let abs = val.abs();
    let mark = dst.len();
    if abs != 0.0 && !(1e-6..1e21).contains(&abs) {
        let _ = write!(dst, "{val:e}");
        sign_exponent(dst, mark);
    } else {
        let _ = write!(dst, "{val}");
    }
}

fn append_formatted(dst: &mut Vec<u8>, t: OffsetDateTime, format: &(impl Formattable + ?Sized)) {
    let mark = dst.len();
    dst.push(b'"');
    match t.format_into(&mut *dst, format) {
        Ok(_) => dst.push(b'"'),
        Err(err) => {
            dst.truncate(mark);
            append_string(dst, &format!("marshaling error: {err}"));
        }
    }
}

fn clamp_i64(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}

pub(crate) fn append_time_text(dst: &mut Vec<u8>, t: OffsetDateTime, format: &TimeFormat) {
    match format {
        TimeFormat::Unix => append_i64(dst, t.unix_timestamp()),
        TimeFormat::UnixMs => append_i64(dst, clamp_i64(t.unix_timestamp_nanos() / 1_000_000)),
        TimeFormat::UnixMicros => append_i64(dst, clamp_i64(t.unix_timestamp_nanos() / 1_000)),
        TimeFormat::UnixNanos => append_i64(dst, clamp_i64(t.unix_timestamp_nanos())),
        TimeFormat::Rfc3339 => append_formatted(dst, t.replace_nanosecond(0).unwrap_or(t), &Rfc3339),
        TimeFormat::Rfc3339Nanos => append_formatted(dst, t, &Rfc3339),
        TimeFormat::Layout(items) => append_formatted(dst, t, items),
    }
}

fn append_list<T>(dst: &mut Vec<u8>, vals: &[T], mut f: impl FnMut(&mut Vec<u8>, &T)) {
    dst.push(b'[');
    for (i, val) in vals.iter().enumerate() {
        if i > 0 {
            dst.push(b',');
        }
        f(dst, val);
    }
    dst.push(b']');
}

struct Escape<'a>(&'a mut Vec<u8>);

impl fmt::Write for Escape<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        escape_into(self.0, s.as_bytes());
        Ok(())
    }
}

impl Encoder for Json {
    const IS_BINARY: bool = false;

    fn append_begin_marker(dst: &mut Vec<u8>) {
        dst.push(b'{');
    }

    fn append_end_marker(dst: &mut Vec<u8>) {
        dst.push(b'}');
    }

    fn append_line_break(dst: &mut Vec<u8>) {
        dst.push(b'\n');
    }

    fn append_array_start(dst: &mut Vec<u8>) {
        dst.push(b'[');
    }

    fn append_array_end(dst: &mut Vec<u8>) {
        dst.push(b']');
    }

    fn append_array_delim(dst: &mut Vec<u8>) {
        if !dst.is_empty() {
            dst.push(b',');
        }
    }

    fn append_object_data(dst: &mut Vec<u8>, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if matches!(dst.last(), Some(&last) if last != b'{') {
            dst.push(b',');
        }
        dst.extend_from_slice(data);
    }

    fn append_key(dst: &mut Vec<u8>, key: &str) {
        if matches!(dst.last(), Some(&last) if last != b'{') {
            dst.push(b',');
        }
        append_string(dst, key);
        dst.push(b':');
    }

    fn append_nil(dst: &mut Vec<u8>) {
        dst.extend_from_slice(b"null");
    }

    fn append_bool(dst: &mut Vec<u8>, val: bool) {
        dst.extend_from_slice(if val { b"true" } else { b"false" });
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
        append_u64(dst, val);
    }

    fn append_uints<U: Into<u64> + Copy>(dst: &mut Vec<u8>, vals: &[U]) {
        append_list(dst, vals, |dst, &v| append_u64(dst, v.into()));
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
        append_string(dst, val);
    }

    fn append_strs<S: AsRef<str>>(dst: &mut Vec<u8>, vals: &[S]) {
        append_list(dst, vals, |dst, v| append_string(dst, v.as_ref()));
    }

    fn append_display(dst: &mut Vec<u8>, val: &dyn fmt::Display) {
        let mark = dst.len();
        dst.push(b'"');
        if fmt::write(&mut Escape(dst), format_args!("{val}")).is_err() {
            dst.truncate(mark);
            append_string(dst, "marshaling error: formatter failed");
            return;
        }
        dst.push(b'"');
    }

    fn append_bytes(dst: &mut Vec<u8>, val: &[u8]) {
        append_string_bytes(dst, val);
    }

    fn append_hex(dst: &mut Vec<u8>, val: &[u8]) {
        append_hex_string(dst, val);
    }

    fn append_raw_json(dst: &mut Vec<u8>, json: &[u8]) {
        dst.extend_from_slice(json);
    }

    fn append_time(dst: &mut Vec<u8>, t: OffsetDateTime, format: &TimeFormat) {
        append_time_text(dst, t, format);
    }

    fn append_times(dst: &mut Vec<u8>, vals: &[OffsetDateTime], format: &TimeFormat) {
        append_list(dst, vals, |dst, &t| append_time_text(dst, t, format));
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
        let mark = dst.len();
        if let Err(err) = serde_json::to_writer(&mut *dst, val) {
            dst.truncate(mark);
            append_string(dst, &format!("marshaling error: {err}"));
        }
    }

    fn append_ip(dst: &mut Vec<u8>, ip: IpAddr) {
        dst.push(b'"');
        let _ = write!(dst, "{ip}");
        dst.push(b'"');
    }

    fn append_ip_prefix(dst: &mut Vec<u8>, ip: IpAddr, prefix_len: u8) {
        dst.push(b'"');
        let _ = write!(dst, "{ip}/{prefix_len}");
        dst.push(b'"');
    }

    fn append_mac(dst: &mut Vec<u8>, mac: &[u8]) {
        append_mac_string(dst, mac);
    }
}
