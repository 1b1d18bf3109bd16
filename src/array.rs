//! List builder for [`Event::array`](crate::Event::array).

use std::error::Error;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::config::{self, Config};
use crate::encoder::{Enc, Encoder};
use crate::event::{Event, LogObjectMarshaler};
use crate::pool::ARRAY_POOL;

/// A list of values built in its own pooled buffer and spliced into an
/// event when added to it.
///
/// ```
/// use record_logger::{arr, Logger, NopWriter};
///
/// Logger::new(NopWriter)
///     .info()
///     .array("tags", arr().str("a").int(1).bool(true))
///     .send();
/// ```
#[must_use]
pub struct Array {
    buf: Vec<u8>,
    cfg: Arc<Config>,
}

/// Starts an empty list.
pub fn arr() -> Array {
    Array {
        buf: ARRAY_POOL.get(),
        cfg: config::current(),
    }
}

impl Array {
    fn push(mut self, f: impl FnOnce(&mut Vec<u8>, &Config)) -> Array {
        Enc::append_array_delim(&mut self.buf);
        f(&mut self.buf, &self.cfg);
        self
    }

    /// Writes the delimited list to `dst`.
    pub(crate) fn write_to(&self, dst: &mut Vec<u8>) {
        Enc::append_array_start(dst);
        dst.extend_from_slice(&self.buf);
        Enc::append_array_end(dst);
    }

    pub fn str(self, val: &str) -> Array {
        self.push(|buf, _| Enc::append_str(buf, val))
    }

    pub fn display(self, val: impl fmt::Display) -> Array {
        self.push(|buf, _| Enc::append_display(buf, &val))
    }

    pub fn bytes(self, val: &[u8]) -> Array {
        self.push(|buf, _| Enc::append_bytes(buf, val))
    }

    pub fn hex(self, val: &[u8]) -> Array {
        self.push(|buf, _| Enc::append_hex(buf, val))
    }

    pub fn raw_json(self, json: &[u8]) -> Array {
        self.push(|buf, _| Enc::append_raw_json(buf, json))
    }

    pub fn any(self, val: &(impl Serialize + ?Sized)) -> Array {
        self.push(|buf, _| Enc::append_any(buf, val))
    }

    pub fn bool(self, val: bool) -> Array {
        self.push(|buf, _| Enc::append_bool(buf, val))
    }

    pub fn int(self, val: impl Into<i64>) -> Array {
        self.push(|buf, _| Enc::append_int(buf, val.into()))
    }

    pub fn uint(self, val: impl Into<u64>) -> Array {
        self.push(|buf, _| Enc::append_uint(buf, val.into()))
    }

    pub fn float32(self, val: f32) -> Array {
        self.push(|buf, _| Enc::append_float32(buf, val))
    }

    pub fn float64(self, val: f64) -> Array {
        self.push(|buf, _| Enc::append_float64(buf, val))
    }

    pub fn time(self, t: OffsetDateTime) -> Array {
        self.push(|buf, cfg| Enc::append_time(buf, t, &cfg.time_field_format))
    }

    pub fn dur(self, d: Duration) -> Array {
        self.push(|buf, cfg| Enc::append_duration(buf, d, cfg.duration_field_unit, cfg.duration_field_integer))
    }

    pub fn err(self, err: &dyn Error) -> Array {
        self.push(|buf, _| Enc::append_display(buf, &err))
    }

    pub fn ip_addr(self, ip: IpAddr) -> Array {
        self.push(|buf, _| Enc::append_ip(buf, ip))
    }

    pub fn ip_prefix(self, ip: IpAddr, prefix_len: u8) -> Array {
        self.push(|buf, _| Enc::append_ip_prefix(buf, ip, prefix_len))
    }

    pub fn mac_addr(self, mac: &[u8]) -> Array {
        self.push(|buf, _| Enc::append_mac(buf, mac))
    }

    /// Appends an object produced by a [`LogObjectMarshaler`].
    pub fn object(self, val: &impl LogObjectMarshaler) -> Array {
        let obj = val.marshal_log_object(crate::event::dict());
        self.dict(obj)
    }

    /// Appends an object built with [`dict`](crate::dict).
    pub fn dict(self, dict: Event) -> Array {
        self.push(|buf, _| {
            if dict.enabled() {
                buf.extend_from_slice(dict.encoded());
            } else {
                Enc::append_begin_marker(buf);
            }
            Enc::append_end_marker(buf);
        })
    }
}

impl Drop for Array {
    fn drop(&mut self) {
        ARRAY_POOL.put(std::mem::take(&mut self.buf));
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array").field("len", &self.buf.len()).finish()
    }
}
