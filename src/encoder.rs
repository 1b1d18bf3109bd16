use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::config::TimeFormat;

/// Appends typed values to a record buffer.
///
/// Implementations are zero-sized; every method writes straight into the
/// caller's buffer without intermediate allocation. Values are appended in
/// call order and the encoder never looks back further than the last byte.
pub trait Encoder {
    /// True for encoders whose output is not text.
    const IS_BINARY: bool;

    fn append_begin_marker(dst: &mut Vec<u8>);
    fn append_end_marker(dst: &mut Vec<u8>);
    fn append_line_break(dst: &mut Vec<u8>);
    fn append_array_start(dst: &mut Vec<u8>);
    fn append_array_end(dst: &mut Vec<u8>);
    fn append_array_delim(dst: &mut Vec<u8>);

    /// Splices pre-encoded `key, value` pairs into an open object.
    fn append_object_data(dst: &mut Vec<u8>, data: &[u8]);

    fn append_key(dst: &mut Vec<u8>, key: &str);
    fn append_nil(dst: &mut Vec<u8>);

    fn append_bool(dst: &mut Vec<u8>, val: bool);
    fn append_bools(dst: &mut Vec<u8>, vals: &[bool]);

    fn append_int(dst: &mut Vec<u8>, val: i64);
    fn append_ints<I: Into<i64> + Copy>(dst: &mut Vec<u8>, vals: &[I]);
    fn append_uint(dst: &mut Vec<u8>, val: u64);
    fn append_uints<U: Into<u64> + Copy>(dst: &mut Vec<u8>, vals: &[U]);

    fn append_float32(dst: &mut Vec<u8>, val: f32);
    fn append_floats32(dst: &mut Vec<u8>, vals: &[f32]);
    fn append_float64(dst: &mut Vec<u8>, val: f64);
    fn append_floats64(dst: &mut Vec<u8>, vals: &[f64]);

    fn append_str(dst: &mut Vec<u8>, val: &str);
    fn append_strs<S: AsRef<str>>(dst: &mut Vec<u8>, vals: &[S]);
    /// Appends the `Display` output of `val` as a string.
    fn append_display(dst: &mut Vec<u8>, val: &dyn fmt::Display);
    fn append_bytes(dst: &mut Vec<u8>, val: &[u8]);
    fn append_hex(dst: &mut Vec<u8>, val: &[u8]);
    /// Appends an already-encoded JSON document.
    fn append_raw_json(dst: &mut Vec<u8>, json: &[u8]);

    fn append_time(dst: &mut Vec<u8>, t: OffsetDateTime, format: &TimeFormat);
    fn append_times(dst: &mut Vec<u8>, vals: &[OffsetDateTime], format: &TimeFormat);
    fn append_duration(dst: &mut Vec<u8>, d: Duration, unit: Duration, use_int: bool);
    fn append_durations(dst: &mut Vec<u8>, vals: &[Duration], unit: Duration, use_int: bool);

    /// Serializes any value through serde. Failures are written as a
    /// `"marshaling error: ..."` string in place of the value.
    fn append_any<T: Serialize + ?Sized>(dst: &mut Vec<u8>, val: &T);

    fn append_ip(dst: &mut Vec<u8>, ip: IpAddr);
    fn append_ip_prefix(dst: &mut Vec<u8>, ip: IpAddr, prefix_len: u8);
    fn append_mac(dst: &mut Vec<u8>, mac: &[u8]);
}

/// The encoder every logger in this build writes with.
#[cfg(not(feature = "binary_log"))]
pub type Enc = crate::json::Json;

/// The encoder every logger in this build writes with.
#[cfg(feature = "binary_log")]
pub type Enc = crate::cbor::Cbor;

/// Splits a duration by `unit`, as an integer count or a float ratio.
pub(crate) fn duration_ratio(d: Duration, unit: Duration) -> f64 {
    let unit = unit.as_nanos().max(1);
    d.as_nanos() as f64 / unit as f64
}

pub(crate) fn duration_count(d: Duration, unit: Duration) -> i64 {
    let unit = unit.as_nanos().max(1);
    i64::try_from(d.as_nanos() / unit).unwrap_or(i64::MAX)
}
