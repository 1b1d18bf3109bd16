//! Reader and utilities for decoding binary (CBOR) logs into JSON text.
//!
//! Decoding reproduces exactly what the text encoder writes for the same
//! fields: numbers, escapes, float sentinels and timestamps all go through
//! the same rendering functions. Malformed or truncated input is reported as
//! a [`DecodeError`]; the decoder never panics on untrusted bytes.

use std::borrow::Cow;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use time::OffsetDateTime;

use crate::cbor::{
    BREAK, FLOAT16, FLOAT32, FLOAT64, INDEFINITE, MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP,
    MAJOR_NEGATIVE, MAJOR_TAG, MAJOR_TEXT, MAJOR_UNSIGNED, SIMPLE_FALSE, SIMPLE_NULL, SIMPLE_TRUE,
    TAG_EMBEDDED_JSON, TAG_EPOCH_TIME, TAG_EXTENDED_TIME, TAG_HEX_STRING, TAG_NETWORK_ADDR, TAG_NETWORK_PREFIX,
    EXTENDED_TIME_NANOS, EXTENDED_TIME_SECS,
};
use crate::config::{self, Config, TimeFormat};
use crate::error::DecodeError;
use crate::json;

/// Deepest array/map nesting the decoder follows.
pub const MAX_DEPTH: usize = 256;

type Result<T> = std::result::Result<T, DecodeError>;

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    time_format: &'a TimeFormat,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8], time_format: &'a TimeFormat) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
            time_format,
        }
    }

    fn peek_u8(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof { offset: self.pos })
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, len: u64) -> Result<&'a [u8]> {
        let remaining = self.data.len() - self.pos;
        let len = usize::try_from(len)
            .ok()
            .filter(|&len| len <= remaining)
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.data.len(),
            })?;
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N as u64)?);
        Ok(out)
    }

    /// Reads the argument following an initial byte that sat at `start`.
    fn read_argument(&mut self, initial: u8, start: usize) -> Result<u64> {
        let info = initial & 0x1f;
        match info {
            0..=23 => Ok(u64::from(info)),
            24 => Ok(u64::from(self.read_u8()?)),
            25 => Ok(u64::from(u16::from_be_bytes(self.read_array()?))),
            26 => Ok(u64::from(u32::from_be_bytes(self.read_array()?))),
            27 => Ok(u64::from_be_bytes(self.read_array()?)),
            _ => Err(DecodeError::InvalidAdditionalInfo {
                major: initial >> 5,
                info,
                offset: start,
            }),
        }
    }

    fn enter(&mut self, offset: usize) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(DecodeError::TooDeep {
                limit: MAX_DEPTH,
                offset,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Consumes a break marker if one is next.
    fn at_break(&mut self) -> Result<bool> {
        if self.peek_u8()? == BREAK {
            self.pos += 1;
            return Ok(true);
        }
        Ok(false)
    }

    /// Reads a byte or text string, joining indefinite-length chunks.
    fn read_string(&mut self, initial: u8, start: usize) -> Result<Cow<'a, [u8]>> {
        let major = initial & 0xe0;
        if initial & 0x1f != INDEFINITE {
            let len = self.read_argument(initial, start)?;
            return Ok(Cow::Borrowed(self.read_bytes(len)?));
        }
        let mut joined = Vec::new();
        while !self.at_break()? {
            let chunk_start = self.pos;
            let chunk = self.read_u8()?;
            if chunk & 0xe0 != major || chunk & 0x1f == INDEFINITE {
                return Err(DecodeError::InvalidChunk {
                    offset: chunk_start,
                });
            }
            let len = self.read_argument(chunk, chunk_start)?;
            joined.extend_from_slice(self.read_bytes(len)?);
        }
        Ok(Cow::Owned(joined))
    }

    fn read_byte_string(&mut self, expected: &'static str) -> Result<Cow<'a, [u8]>> {
        let start = self.pos;
        let initial = self.read_u8()?;
        if initial & 0xe0 != MAJOR_BYTES {
            return Err(DecodeError::UnexpectedType {
                expected,
                offset: start,
            });
        }
        self.read_string(initial, start)
    }

    fn decode_value(&mut self, dst: &mut Vec<u8>) -> Result<()> {
        let start = self.pos;
        let initial = self.read_u8()?;
        match initial & 0xe0 {
            MAJOR_UNSIGNED => {
                let n = self.read_argument(initial, start)?;
                json::append_u64(dst, n);
            }
            MAJOR_NEGATIVE => {
                let n = self.read_argument(initial, start)?;
                match n.checked_add(1) {
                    Some(magnitude) => {
                        dst.push(b'-');
                        json::append_u64(dst, magnitude);
                    }
                    None => dst.extend_from_slice(b"-18446744073709551616"),
                }
            }
            MAJOR_BYTES | MAJOR_TEXT => {
                let s = self.read_string(initial, start)?;
                json::append_string_bytes(dst, &s);
            }
            MAJOR_ARRAY => self.decode_array(initial, start, dst)?,
            MAJOR_MAP => self.decode_map(initial, start, dst)?,
            MAJOR_TAG => self.decode_tag(initial, start, dst)?,
            _ => self.decode_simple(initial, start, dst)?,
        }
        Ok(())
    }

    fn decode_array(&mut self, initial: u8, start: usize, dst: &mut Vec<u8>) -> Result<()> {
        self.enter(start)?;
        dst.push(b'[');
        if initial & 0x1f == INDEFINITE {
            let mut first = true;
            while !self.at_break()? {
                if !first {
                    dst.push(b',');
                }
                first = false;
                self.decode_value(dst)?;
            }
        } else {
            let count = self.read_argument(initial, start)?;
            for i in 0..count {
                if i > 0 {
                    dst.push(b',');
                }
                self.decode_value(dst)?;
            }
        }
        dst.push(b']');
        self.depth -= 1;
        Ok(())
    }

    fn decode_key(&mut self, dst: &mut Vec<u8>) -> Result<()> {
        let start = self.pos;
        let initial = self.read_u8()?;
        let major = initial & 0xe0;
        if major != MAJOR_TEXT && major != MAJOR_BYTES {
            return Err(DecodeError::InvalidMapKey { offset: start });
        }
        let key = self.read_string(initial, start)?;
        json::append_string_bytes(dst, &key);
        dst.push(b':');
        Ok(())
    }

    fn decode_map(&mut self, initial: u8, start: usize, dst: &mut Vec<u8>) -> Result<()> {
        self.enter(start)?;
        dst.push(b'{');
        if initial & 0x1f == INDEFINITE {
            let mut first = true;
            while !self.at_break()? {
                if !first {
                    dst.push(b',');
                }
                first = false;
                self.decode_key(dst)?;
                self.decode_value(dst)?;
            }
        } else {
            let count = self.read_argument(initial, start)?;
            for i in 0..count {
                if i > 0 {
                    dst.push(b',');
                }
                self.decode_key(dst)?;
                self.decode_value(dst)?;
            }
        }
        dst.push(b'}');
        self.depth -= 1;
        Ok(())
    }

    fn decode_tag(&mut self, initial: u8, start: usize, dst: &mut Vec<u8>) -> Result<()> {
        let tag = self.read_argument(initial, start)?;
        match tag {
            TAG_EPOCH_TIME => self.decode_timestamp(dst),
            TAG_EXTENDED_TIME => self.decode_extended_time(dst),
            TAG_NETWORK_ADDR => {
                let offset = self.pos;
                let bytes = self.read_byte_string("a network address byte string")?;
                match bytes.len() {
                    4 | 16 => {
                        let ip = ip_from_bytes(&bytes, offset)?;
                        json::append_string(dst, &ip.to_string());
                    }
                    6 | 8 => json::append_mac_string(dst, &bytes),
                    len => return Err(DecodeError::InvalidAddress { len, offset }),
                }
                Ok(())
            }
            TAG_NETWORK_PREFIX => self.decode_prefix(dst),
            TAG_EMBEDDED_JSON => {
                let raw = self.read_byte_string("an embedded JSON byte string")?;
                dst.extend_from_slice(&raw);
                Ok(())
            }
            TAG_HEX_STRING => {
                let bytes = self.read_byte_string("a hex byte string")?;
                json::append_hex_string(dst, &bytes);
                Ok(())
            }
            _ => Err(DecodeError::UnsupportedTag { tag, offset: start }),
        }
    }

    fn decode_prefix(&mut self, dst: &mut Vec<u8>) -> Result<()> {
        let start = self.pos;
        if self.read_u8()? != MAJOR_MAP | 1 {
            return Err(DecodeError::UnexpectedType {
                expected: "a single-entry prefix map",
                offset: start,
            });
        }
        let offset = self.pos;
        let bytes = self.read_byte_string("a prefix address byte string")?;
        let ip = ip_from_bytes(&bytes, offset)?;
        let len_start = self.pos;
        let initial = self.read_u8()?;
        if initial & 0xe0 != MAJOR_UNSIGNED {
            return Err(DecodeError::UnexpectedType {
                expected: "a prefix length",
                offset: len_start,
            });
        }
        let prefix_len = self.read_argument(initial, len_start)?;
        json::append_string(dst, &format!("{ip}/{prefix_len}"));
        Ok(())
    }

    /// Reads an integer epoch value of any sign.
    fn read_epoch_int(&mut self, invalid: &DecodeError) -> Result<i64> {
        let start = self.pos;
        let initial = self.read_u8()?;
        let n = match initial & 0xe0 {
            MAJOR_UNSIGNED | MAJOR_NEGATIVE => self.read_argument(initial, start)?,
            _ => {
                return Err(DecodeError::UnexpectedType {
                    expected: "an integer",
                    offset: start,
                })
            }
        };
        let n = i64::try_from(n).map_err(|_| invalid.clone())?;
        Ok(if initial & 0xe0 == MAJOR_NEGATIVE { -1 - n } else { n })
    }

    fn decode_timestamp(&mut self, dst: &mut Vec<u8>) -> Result<()> {
        let start = self.pos;
        let invalid = DecodeError::InvalidTimestamp { offset: start };
        let t = match self.peek_u8()? {
            FLOAT32 | FLOAT64 => {
                let secs = if self.read_u8()? == FLOAT32 {
                    f64::from(f32::from_bits(u32::from_be_bytes(self.read_array()?)))
                } else {
                    f64::from_bits(u64::from_be_bytes(self.read_array()?))
                };
                float_epoch_time(secs).ok_or(invalid)?
            }
            _ => {
                let secs = self.read_epoch_int(&invalid)?;
                OffsetDateTime::from_unix_timestamp(secs).map_err(|_| invalid)?
            }
        };
        json::append_time_text(dst, t, self.time_format);
        Ok(())
    }

    /// Reads the `{1: secs, -9: nanos}` extended time form.
    fn decode_extended_time(&mut self, dst: &mut Vec<u8>) -> Result<()> {
        let start = self.pos;
        let invalid = DecodeError::InvalidTimestamp { offset: start };
        if self.read_u8()? != MAJOR_MAP | 2 || self.read_epoch_int(&invalid)? != EXTENDED_TIME_SECS {
            return Err(DecodeError::UnexpectedType {
                expected: "an extended time map",
                offset: start,
            });
        }
        let secs = self.read_epoch_int(&invalid)?;
        if self.read_epoch_int(&invalid)? != EXTENDED_TIME_NANOS {
            return Err(DecodeError::UnexpectedType {
                expected: "an extended time map",
                offset: start,
            });
        }
        let nanos = self.read_epoch_int(&invalid)?;
        if !(0..1_000_000_000).contains(&nanos) {
            return Err(invalid);
        }
        let t = OffsetDateTime::from_unix_timestamp_nanos(i128::from(secs) * 1_000_000_000 + i128::from(nanos))
            .map_err(|_| invalid)?;
        json::append_time_text(dst, t, self.time_format);
        Ok(())
    }

    fn decode_simple(&mut self, initial: u8, start: usize, dst: &mut Vec<u8>) -> Result<()> {
        match initial {
            SIMPLE_FALSE => dst.extend_from_slice(b"false"),
            SIMPLE_TRUE => dst.extend_from_slice(b"true"),
            SIMPLE_NULL => dst.extend_from_slice(b"null"),
            FLOAT16 => json::append_f32(dst, f16_to_f32(u16::from_be_bytes(self.read_array()?))),
            FLOAT32 => json::append_f32(dst, f32::from_bits(u32::from_be_bytes(self.read_array()?))),
            FLOAT64 => json::append_f64(dst, f64::from_bits(u64::from_be_bytes(self.read_array()?))),
            BREAK => return Err(DecodeError::UnexpectedBreak { offset: start }),
            _ => {
                return Err(DecodeError::UnsupportedSimple {
                    value: initial & 0x1f,
                    offset: start,
                })
            }
        }
        Ok(())
    }
}

/// Splits a float epoch value into whole seconds and a microsecond
/// fraction. The fraction never rounds up into the next second.
fn float_epoch_time(secs: f64) -> Option<OffsetDateTime> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    if whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
        return None;
    }
    let micros = ((secs - whole) * 1e6).round().min(999_999.0) as i64;
    OffsetDateTime::from_unix_timestamp(whole as i64)
        .ok()?
        .checked_add(time::Duration::microseconds(micros))
}

fn ip_from_bytes(bytes: &[u8], offset: usize) -> Result<IpAddr> {
    if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
        return Ok(IpAddr::V4(Ipv4Addr::from(v4)));
    }
    if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
        return Ok(IpAddr::V6(Ipv6Addr::from(v6)));
    }
    Err(DecodeError::InvalidAddress {
        len: bytes.len(),
        offset,
    })
}

fn f16_to_f32(half: u16) -> f32 {
    let sign = u32::from(half >> 15) << 31;
    let exp = u32::from((half >> 10) & 0x1f);
    let mant = u32::from(half & 0x3ff);
    match exp {
        0 => {
            let magnitude = mant as f32 * 2f32.powi(-24);
            if sign == 0 {
                magnitude
            } else {
                -magnitude
            }
        }
        0x1f => f32::from_bits(sign | 0x7f80_0000 | (mant << 13)),
        _ => f32::from_bits(sign | ((exp + 112) << 23) | (mant << 13)),
    }
}

fn decode_one(data: &[u8], format: &TimeFormat, dst: &mut Vec<u8>) -> Result<usize> {
    let mark = dst.len();
    let mut decoder = Decoder::new(data, format);
    match decoder.decode_value(dst) {
        Ok(()) => Ok(decoder.pos),
        Err(err) => {
            dst.truncate(mark);
            Err(err)
        }
    }
}

fn into_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// Decodes the first CBOR object in `src` as JSON appended to `dst`,
/// returning how many input bytes it used. On error `dst` is left unchanged.
pub fn decode_object(src: &[u8], dst: &mut Vec<u8>) -> Result<usize> {
    let config = config::current();
    decode_one(src, &config.time_field_format, dst)
}

/// Decodes every object in `src`, one JSON line each.
pub fn decode_to_json(src: &[u8]) -> Result<String> {
    let mut out = Vec::with_capacity(src.len() * 2);
    for record in LogReader::new(src) {
        out.extend_from_slice(record?.as_bytes());
        out.push(b'\n');
    }
    Ok(into_text(out))
}

/// True when `src` starts like a binary record rather than JSON text.
pub fn is_binary(src: &[u8]) -> bool {
    src.first().is_some_and(|&b| b & 0xe0 == MAJOR_MAP)
}

/// Returns `src` as JSON text, decoding it first if it is binary.
pub fn decode_if_binary(src: &[u8]) -> Result<String> {
    if is_binary(src) {
        decode_to_json(src)
    } else {
        Ok(String::from_utf8_lossy(src).into_owned())
    }
}

/// Sequential reader over a stream of binary records.
///
/// Each call to [`LogReader::read_entry`] decodes one record into a JSON
/// object. After the first error the reader stops, since the position of the
/// next record can no longer be trusted.
///
/// # Examples
///
/// ```
/// use record_logger::{Cbor, Encoder, LogReader};
///
/// let mut buf = Vec::new();
/// Cbor::append_begin_marker(&mut buf);
/// Cbor::append_key(&mut buf, "n");
/// Cbor::append_int(&mut buf, 7);
/// Cbor::append_end_marker(&mut buf);
///
/// let mut reader = LogReader::new(&buf);
/// assert_eq!(reader.read_entry().unwrap().unwrap(), r#"{"n":7}"#);
/// assert!(reader.read_entry().is_none());
/// ```
#[derive(Clone)]
pub struct LogReader<'a> {
    data: &'a [u8],
    pos: usize,
    config: Arc<Config>,
    failed: bool,
}

impl<'a> LogReader<'a> {
    /// Creates a reader rendering timestamps with the current configuration.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_config(data, config::current())
    }

    pub fn with_config(data: &'a [u8], config: Arc<Config>) -> Self {
        Self {
            data,
            pos: 0,
            config,
            failed: false,
        }
    }

    /// Byte offset of the next record.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reads the next record.
    ///
    /// Returns `None` at the end of the input or after an error.
    pub fn read_entry(&mut self) -> Option<Result<String>> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let mut out = Vec::new();
        match decode_one(&self.data[self.pos..], &self.config.time_field_format, &mut out) {
            Ok(used) => {
                self.pos += used;
                Some(Ok(into_text(out)))
            }
            Err(err) => {
                self.failed = true;
                let err = shift_offset(err, self.pos);
                tracing::debug!(error = %err, "stopped reading binary log");
                Some(Err(err))
            }
        }
    }
}

impl Iterator for LogReader<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_entry()
    }
}

/// Rebases an error offset from a record-relative to a stream-relative one.
fn shift_offset(err: DecodeError, base: usize) -> DecodeError {
    use DecodeError::*;
    match err {
        UnexpectedEof { offset } => UnexpectedEof { offset: offset + base },
        InvalidAdditionalInfo { major, info, offset } => InvalidAdditionalInfo {
            major,
            info,
            offset: offset + base,
        },
        UnexpectedBreak { offset } => UnexpectedBreak { offset: offset + base },
        UnsupportedTag { tag, offset } => UnsupportedTag { tag, offset: offset + base },
        UnsupportedSimple { value, offset } => UnsupportedSimple { value, offset: offset + base },
        UnexpectedType { expected, offset } => UnexpectedType { expected, offset: offset + base },
        InvalidMapKey { offset } => InvalidMapKey { offset: offset + base },
        InvalidChunk { offset } => InvalidChunk { offset: offset + base },
        InvalidAddress { len, offset } => InvalidAddress { len, offset: offset + base },
        InvalidTimestamp { offset } => InvalidTimestamp { offset: offset + base },
        TooDeep { limit, offset } => TooDeep { limit, offset: offset + base },
    }
}
