use std::error::Error;
use std::fmt;
use std::net::IpAddr;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::array::Array;
use crate::event::{Event, LogArrayMarshaler, LogObjectMarshaler};
use crate::hook::{CallerHook, TimestampHook};
use crate::level::Level;
use crate::logger::Logger;

/// Builder for a child logger's prefix fields, from [`Logger::with`].
///
/// Takes the same field methods as [`Event`]. The fields are encoded once
/// and copied into every event of the logger returned by
/// [`Context::logger`]. Siblings derived from one parent never see each
/// other's fields.
#[must_use = "call logger() to get the child logger"]
pub struct Context {
    logger: Logger,
    fields: Event,
}

macro_rules! delegate_fields {
    ($( $(#[$meta:meta])* fn $name:ident($($arg:ident: $ty:ty),*); )*) => {
        $(
            $(#[$meta])*
            pub fn $name(mut self, $($arg: $ty),*) -> Context {
                self.fields = self.fields.$name($($arg),*);
                self
            }
        )*
    };
}

impl Context {
    /// Fields added under a disabled logger are dropped without touching the
    /// buffer pool.
    pub(crate) fn new(logger: Logger, location: &'static Location<'static>) -> Context {
        let fields = match logger.get_level() {
            Level::Disabled => Event::disabled(),
            _ => Event::fragment(Level::NoLevel, None, None, false, location),
        };
        Context { logger, fields }
    }

    /// Finishes the child logger.
    pub fn logger(self) -> Logger {
        self.logger.push_context(self.fields.encoded())
    }

    /// Drops every prefix field, including the parent's.
    pub fn reset(mut self) -> Context {
        self.logger = self.logger.clear_context();
        self.fields = self.fields.clear();
        self
    }

    /// Adds the time each event is written under the timestamp field name.
    pub fn timestamp(mut self) -> Context {
        self.logger = self.logger.push_hook(Arc::new(TimestampHook));
        self
    }

    /// Adds the `file:line` of each log call under the caller field name.
    pub fn caller(mut self) -> Context {
        self.logger = self.logger.push_hook(Arc::new(CallerHook));
        self
    }

    /// Adds stack traces to errors logged through the child logger, using
    /// the configured stack marshaler.
    pub fn stack(mut self) -> Context {
        self.logger = self.logger.with_stack();
        self.fields = self.fields.stack();
        self
    }

    delegate_fields! {
        fn str(key: &str, val: &str);
        fn strs(key: &str, vals: &[impl AsRef<str>]);
        fn display(key: &str, val: impl fmt::Display);
        fn bytes(key: &str, val: &[u8]);
        fn hex(key: &str, val: &[u8]);
        fn raw_json(key: &str, json: &[u8]);
        fn any(key: &str, val: &(impl Serialize + ?Sized));
        fn fields(fields: impl IntoIterator<Item = (impl AsRef<str>, impl Serialize)>);
        fn bool(key: &str, val: bool);
        fn bools(key: &str, vals: &[bool]);
        fn int(key: &str, val: impl Into<i64>);
        fn ints(key: &str, vals: &[impl Into<i64> + Copy]);
        fn uint(key: &str, val: impl Into<u64>);
        fn uints(key: &str, vals: &[impl Into<u64> + Copy]);
        fn float32(key: &str, val: f32);
        fn floats32(key: &str, vals: &[f32]);
        fn float64(key: &str, val: f64);
        fn floats64(key: &str, vals: &[f64]);
        /// Adds a fixed time, rendered once now.
        fn time(key: &str, t: OffsetDateTime);
        fn times(key: &str, vals: &[OffsetDateTime]);
        fn dur(key: &str, d: Duration);
        fn durs(key: &str, vals: &[Duration]);
        fn time_diff(key: &str, t: OffsetDateTime, start: OffsetDateTime);
        fn ip_addr(key: &str, ip: IpAddr);
        fn ip_prefix(key: &str, ip: IpAddr, prefix_len: u8);
        fn mac_addr(key: &str, mac: &[u8]);
        fn err(err: &dyn Error);
        fn errs(key: &str, errs: &[&dyn Error]);
        fn any_err(key: &str, err: &dyn Error);
        fn dict(key: &str, dict: Event);
        fn array(key: &str, array: Array);
        fn array_with(key: &str, val: &impl LogArrayMarshaler);
        fn object(key: &str, val: &impl LogObjectMarshaler);
        fn embed_object(val: &impl LogObjectMarshaler);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("logger", &self.logger)
            .field("fields", &self.fields)
            .finish()
    }
}
