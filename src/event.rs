//! Single-use record builder.
//!
//! An [`Event`] owns a pooled buffer that already holds the record's begin
//! marker and the logger's prefix fields. Field methods consume the event and
//! hand it back, so a finished event cannot be touched again. A disabled event
//! carries no buffer at all and every method on it is a no-op.

use std::error::Error;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::array::{arr, Array};
use crate::config::{self, Config};
use crate::encoder::{Enc, Encoder};
use crate::hook::Hook;
use crate::level::Level;
use crate::pool::EVENT_POOL;
use crate::writer::Writer;

/// Types that know how to write themselves as an object's fields.
///
/// ```
/// use record_logger::{Event, LogObjectMarshaler};
///
/// struct User {
///     name: String,
///     age: u32,
/// }
///
/// impl LogObjectMarshaler for User {
///     fn marshal_log_object(&self, e: Event) -> Event {
///         e.str("name", &self.name).uint("age", self.age)
///     }
/// }
/// ```
pub trait LogObjectMarshaler {
    fn marshal_log_object(&self, e: Event) -> Event;
}

/// Types that know how to write themselves as a list.
pub trait LogArrayMarshaler {
    fn marshal_log_array(&self, a: Array) -> Array;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Terminate {
    Exit,
    Panic,
}

struct Inner {
    buf: Vec<u8>,
    cfg: Arc<Config>,
    level: Level,
    writer: Option<Arc<dyn Writer>>,
    hooks: Option<Arc<[Arc<dyn Hook>]>>,
    stack: bool,
    location: &'static Location<'static>,
}

/// One log record under construction.
///
/// Obtained from a [`Logger`](crate::Logger) level method and finished with
/// [`Event::msg`], [`Event::msgf`], [`Event::msg_func`] or [`Event::send`].
/// Dropping an unfinished event returns its buffer without writing anything.
#[must_use = "an event is only written when finished with msg() or send()"]
pub struct Event {
    inner: Option<Inner>,
    terminate: Option<Terminate>,
}

impl Event {
    pub(crate) fn new(
        level: Level,
        writer: Option<Arc<dyn Writer>>,
        hooks: Option<Arc<[Arc<dyn Hook>]>>,
        stack: bool,
        location: &'static Location<'static>,
    ) -> Event {
        let mut event = Event::fragment(level, writer, hooks, stack, location);
        if let Some(inner) = event.inner.as_mut() {
            Enc::append_begin_marker(&mut inner.buf);
        }
        event
    }

    /// An enabled event whose buffer starts empty, without a begin marker.
    pub(crate) fn fragment(
        level: Level,
        writer: Option<Arc<dyn Writer>>,
        hooks: Option<Arc<[Arc<dyn Hook>]>>,
        stack: bool,
        location: &'static Location<'static>,
    ) -> Event {
        Event {
            inner: Some(Inner {
                buf: EVENT_POOL.get(),
                cfg: config::current(),
                level,
                writer,
                hooks,
                stack,
                location,
            }),
            terminate: None,
        }
    }

    pub(crate) fn disabled() -> Event {
        Event {
            inner: None,
            terminate: None,
        }
    }

    pub(crate) fn with_terminate(mut self, terminate: Option<Terminate>) -> Event {
        self.terminate = terminate;
        self
    }

    /// Runs `f` on the buffer when the event is enabled.
    pub(crate) fn append(mut self, f: impl FnOnce(&mut Vec<u8>, &Config)) -> Event {
        if let Some(inner) = self.inner.as_mut() {
            f(&mut inner.buf, &inner.cfg);
        }
        self
    }

    /// Encoded bytes so far. Empty for a disabled event.
    pub(crate) fn encoded(&self) -> &[u8] {
        self.inner.as_ref().map_or(&[][..], |inner| &inner.buf)
    }

    pub(crate) fn clear(self) -> Event {
        self.append(|buf, _| buf.clear())
    }

    pub(crate) fn stack_enabled(&self) -> bool {
        self.inner.as_ref().is_some_and(|inner| inner.stack)
    }

    /// Whether this event will be written. Use it to skip costly field
    /// preparation.
    pub fn enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Disables the event. Nothing is written when it is finished.
    pub fn discard(mut self) -> Event {
        if let Some(mut inner) = self.inner.take() {
            EVENT_POOL.put(std::mem::take(&mut inner.buf));
        }
        self
    }

    /// Finishes the event with `msg` as the message field and writes it.
    ///
    /// An empty message adds no message field. For fatal events the process
    /// exits after the write; for panic events this call panics.
    pub fn msg(self, msg: &str) {
        self.finish(msg);
    }

    /// Like [`Event::msg`] with a formatted message. Formatting is skipped when
    /// the event is disabled.
    pub fn msgf(self, args: fmt::Arguments<'_>) {
        if self.enabled() || self.terminate.is_some() {
            match args.as_str() {
                Some(s) => self.finish(s),
                None => self.finish(&args.to_string()),
            }
        } else {
            self.finish("");
        }
    }

    /// Like [`Event::msg`], calling `f` for the message only when the event
    /// is enabled.
    pub fn msg_func(self, f: impl FnOnce() -> String) {
        if self.enabled() || self.terminate.is_some() {
            let msg = f();
            self.finish(&msg);
        } else {
            self.finish("");
        }
    }

    /// Finishes the event without a message.
    pub fn send(self) {
        self.finish("");
    }

    fn finish(mut self, msg: &str) {
        let terminate = self.terminate.take();
        let hooks = self.inner.as_mut().and_then(|inner| inner.hooks.take());
        if let Some(hooks) = hooks {
            for hook in hooks.iter() {
                let Some(level) = self.inner.as_ref().map(|inner| inner.level) else {
                    break;
                };
                self = hook.run(self, level, msg);
            }
        }
        if let Some(mut inner) = self.inner.take() {
            write_out(&mut inner, msg);
            EVENT_POOL.put(std::mem::take(&mut inner.buf));
        }
        match terminate {
            Some(Terminate::Exit) => (config::current().fatal_exit)(),
            Some(Terminate::Panic) => panic!("{msg}"),
            None => {}
        }
    }

    pub fn str(self, key: &str, val: &str) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_str(buf, val);
        })
    }

    pub fn strs(self, key: &str, vals: &[impl AsRef<str>]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_strs(buf, vals);
        })
    }

    /// Adds the `Display` output of `val` as a string.
    pub fn display(self, key: &str, val: impl fmt::Display) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_display(buf, &val);
        })
    }

    /// Adds `val` as a string. Invalid UTF-8 is replaced.
    pub fn bytes(self, key: &str, val: &[u8]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_bytes(buf, val);
        })
    }

    pub fn hex(self, key: &str, val: &[u8]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_hex(buf, val);
        })
    }

    /// Adds an already-encoded JSON value. It is not validated.
    pub fn raw_json(self, key: &str, json: &[u8]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_raw_json(buf, json);
        })
    }

    /// Adds any serializable value. Serialization failures are written as a
    /// `"marshaling error: ..."` string.
    pub fn any(self, key: &str, val: &(impl Serialize + ?Sized)) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_any(buf, val);
        })
    }

    /// Adds every `(key, value)` pair in iteration order.
    pub fn fields(self, fields: impl IntoIterator<Item = (impl AsRef<str>, impl Serialize)>) -> Event {
        self.append(|buf, _| {
            for (key, val) in fields {
                Enc::append_key(buf, key.as_ref());
                Enc::append_any(buf, &val);
            }
        })
    }

    pub fn bool(self, key: &str, val: bool) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_bool(buf, val);
        })
    }

    pub fn bools(self, key: &str, vals: &[bool]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_bools(buf, vals);
        })
    }

    pub fn int(self, key: &str, val: impl Into<i64>) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_int(buf, val.into());
        })
    }

    pub fn ints(self, key: &str, vals: &[impl Into<i64> + Copy]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_ints(buf, vals);
        })
    }

    pub fn uint(self, key: &str, val: impl Into<u64>) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_uint(buf, val.into());
        })
    }

    pub fn uints(self, key: &str, vals: &[impl Into<u64> + Copy]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_uints(buf, vals);
        })
    }

    pub fn float32(self, key: &str, val: f32) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_float32(buf, val);
        })
    }

    pub fn floats32(self, key: &str, vals: &[f32]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_floats32(buf, vals);
        })
    }

    pub fn float64(self, key: &str, val: f64) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_float64(buf, val);
        })
    }

    pub fn floats64(self, key: &str, vals: &[f64]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_floats64(buf, vals);
        })
    }

    /// Adds a time in the configured time format.
    pub fn time(self, key: &str, t: OffsetDateTime) -> Event {
        self.append(|buf, cfg| {
            Enc::append_key(buf, key);
            Enc::append_time(buf, t, &cfg.time_field_format);
        })
    }

    pub fn times(self, key: &str, vals: &[OffsetDateTime]) -> Event {
        self.append(|buf, cfg| {
            Enc::append_key(buf, key);
            Enc::append_times(buf, vals, &cfg.time_field_format);
        })
    }

    /// Adds the current time under the configured timestamp field name.
    pub fn timestamp(self) -> Event {
        self.append(|buf, cfg| {
            Enc::append_key(buf, &cfg.timestamp_field_name);
            Enc::append_time(buf, (cfg.timestamp_func)(), &cfg.time_field_format);
        })
    }

    /// Adds a duration in the configured unit.
    pub fn dur(self, key: &str, d: Duration) -> Event {
        self.append(|buf, cfg| {
            Enc::append_key(buf, key);
            Enc::append_duration(buf, d, cfg.duration_field_unit, cfg.duration_field_integer);
        })
    }

    pub fn durs(self, key: &str, vals: &[Duration]) -> Event {
        self.append(|buf, cfg| {
            Enc::append_key(buf, key);
            Enc::append_durations(buf, vals, cfg.duration_field_unit, cfg.duration_field_integer);
        })
    }

    /// Adds `t - start` as a duration. A negative difference is written as zero.
    pub fn time_diff(self, key: &str, t: OffsetDateTime, start: OffsetDateTime) -> Event {
        let d = Duration::try_from(t - start).unwrap_or(Duration::ZERO);
        self.dur(key, d)
    }

    pub fn ip_addr(self, key: &str, ip: IpAddr) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_ip(buf, ip);
        })
    }

    pub fn ip_prefix(self, key: &str, ip: IpAddr, prefix_len: u8) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_ip_prefix(buf, ip, prefix_len);
        })
    }

    pub fn mac_addr(self, key: &str, mac: &[u8]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_mac(buf, mac);
        })
    }

    /// Adds `err` under the configured error field name.
    ///
    /// When stack traces are enabled and a stack marshaler is configured, the
    /// marshaled stack is added first.
    pub fn err(self, err: &dyn Error) -> Event {
        let stack = self.stack_enabled();
        self.append(|buf, cfg| {
            if stack {
                if let Some(stack) = cfg.error_stack_marshaler.and_then(|marshal| marshal(err)) {
                    Enc::append_key(buf, &cfg.error_stack_field_name);
                    Enc::append_str(buf, &stack);
                }
            }
            Enc::append_key(buf, &cfg.error_field_name);
            Enc::append_display(buf, &err);
        })
    }

    /// Adds the messages of several errors as a list.
    pub fn errs(self, key: &str, errs: &[&dyn Error]) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_array_start(buf);
            for (i, err) in errs.iter().enumerate() {
                if i > 0 {
                    Enc::append_array_delim(buf);
                }
                Enc::append_display(buf, err);
            }
            Enc::append_array_end(buf);
        })
    }

    /// Adds an error under a custom key.
    pub fn any_err(self, key: &str, err: &dyn Error) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_display(buf, &err);
        })
    }

    /// Enables stack traces for the next [`Event::err`] call.
    pub fn stack(mut self) -> Event {
        if let Some(inner) = self.inner.as_mut() {
            inner.stack = true;
        }
        self
    }

    /// Adds the `file:line` of the log call site.
    pub fn caller(mut self) -> Event {
        if let Some(inner) = self.inner.as_mut() {
            let location = inner.location;
            Enc::append_key(&mut inner.buf, &inner.cfg.caller_field_name);
            Enc::append_display(&mut inner.buf, &format_args!("{}:{}", location.file(), location.line()));
        }
        self
    }

    /// Adds a nested object built with [`dict`].
    pub fn dict(self, key: &str, dict: Event) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            if dict.enabled() {
                buf.extend_from_slice(dict.encoded());
            } else {
                Enc::append_begin_marker(buf);
            }
            Enc::append_end_marker(buf);
        })
    }

    /// Adds a list built with [`arr`].
    pub fn array(self, key: &str, array: Array) -> Event {
        self.append(|buf, _| {
            Enc::append_key(buf, key);
            array.write_to(buf);
        })
    }

    /// Adds a list produced by a [`LogArrayMarshaler`].
    pub fn array_with(self, key: &str, val: &impl LogArrayMarshaler) -> Event {
        if !self.enabled() {
            return self;
        }
        self.array(key, val.marshal_log_array(arr()))
    }

    /// Adds a nested object produced by a [`LogObjectMarshaler`].
    pub fn object(self, key: &str, val: &impl LogObjectMarshaler) -> Event {
        if !self.enabled() {
            return self;
        }
        let e = self.append(|buf, _| {
            Enc::append_key(buf, key);
            Enc::append_begin_marker(buf);
        });
        val.marshal_log_object(e)
            .append(|buf, _| Enc::append_end_marker(buf))
    }

    /// Adds the fields of a [`LogObjectMarshaler`] directly to this event.
    pub fn embed_object(self, val: &impl LogObjectMarshaler) -> Event {
        if !self.enabled() {
            return self;
        }
        val.marshal_log_object(self)
    }
}

fn write_out(inner: &mut Inner, msg: &str) {
    if !msg.is_empty() {
        Enc::append_key(&mut inner.buf, &inner.cfg.message_field_name);
        Enc::append_str(&mut inner.buf, msg);
    }
    Enc::append_end_marker(&mut inner.buf);
    Enc::append_line_break(&mut inner.buf);
    let Some(writer) = &inner.writer else {
        return;
    };
    let len = inner.buf.len();
    match writer.write_level(inner.level, &inner.buf) {
        Ok(n) if n < len => {
            let err = io::Error::new(io::ErrorKind::WriteZero, format!("short write: {n} of {len} bytes"));
            config::report_error(&inner.cfg, &err);
        }
        Ok(_) => {}
        Err(err) => config::report_error(&inner.cfg, &err),
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            EVENT_POOL.put(std::mem::take(&mut inner.buf));
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("enabled", &self.enabled())
            .field("len", &self.encoded().len())
            .finish()
    }
}

/// Starts a detached object for [`Event::dict`].
#[track_caller]
pub fn dict() -> Event {
    Event::new(Level::NoLevel, None, None, false, Location::caller())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{output, test_writer, GLOBAL_LOCK};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[track_caller]
    fn event(writer: &Arc<dyn Writer>) -> Event {
        Event::new(Level::Info, Some(Arc::clone(writer)), None, false, Location::caller())
    }

    struct Point {
        x: i32,
        y: i32,
    }

    impl LogObjectMarshaler for Point {
        fn marshal_log_object(&self, e: Event) -> Event {
            e.int("x", self.x).int("y", self.y)
        }
    }

    #[derive(Debug)]
    struct Oops;

    impl fmt::Display for Oops {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("oops")
        }
    }

    impl Error for Oops {}

    #[test]
    fn test_fields_in_call_order() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        event(&writer)
            .str("s", "v")
            .int("i", -3i32)
            .uint("u", 7u8)
            .bool("b", true)
            .float64("f", 1.5)
            .strs("l", &["a", "b"])
            .msg("done");
        assert_eq!(
            output(&sink),
            "{\"s\":\"v\",\"i\":-3,\"u\":7,\"b\":true,\"f\":1.5,\"l\":[\"a\",\"b\"],\"message\":\"done\"}\n"
        );
    }

    #[test]
    fn test_empty_message_is_omitted() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        event(&writer).str("k", "v").send();
        event(&writer).msg("");
        assert_eq!(output(&sink), "{\"k\":\"v\"}\n{}\n");
    }

    #[test]
    fn test_disabled_event_is_a_no_op() {
        let e = Event::disabled().str("k", "v").int("n", 1).stack().caller();
        assert!(!e.enabled());
        assert!(e.encoded().is_empty());
        e.msg("ignored");
    }

    #[test]
    fn test_discard_skips_write() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let e = event(&writer).str("k", "v").discard();
        assert!(!e.enabled());
        e.str("more", "x").msg("hi");
        assert_eq!(output(&sink), "");
    }

    #[test]
    fn test_nested_values() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        event(&writer)
            .dict("d", dict().str("a", "1").int("b", 2))
            .object("p", &Point { x: 1, y: 2 })
            .embed_object(&Point { x: 3, y: 4 })
            .array("arr", arr().str("z").int(9))
            .send();
        assert_eq!(
            output(&sink),
            "{\"d\":{\"a\":\"1\",\"b\":2},\"p\":{\"x\":1,\"y\":2},\"x\":3,\"y\":4,\"arr\":[\"z\",9]}\n"
        );
    }

    #[test]
    fn test_errors_and_stack() {
        let _guard = GLOBAL_LOCK.lock();
        fn fake_stack(_err: &dyn Error) -> Option<String> {
            Some("trace".to_string())
        }
        config::update(|c| c.error_stack_marshaler = Some(fake_stack));
        let (sink, writer) = test_writer();
        event(&writer).err(&Oops).send();
        event(&writer).stack().err(&Oops).send();
        event(&writer).errs("all", &[&Oops, &Oops]).any_err("cause", &Oops).send();
        config::reset();
        assert_eq!(
            output(&sink),
            "{\"error\":\"oops\"}\n\
             {\"stack\":\"trace\",\"error\":\"oops\"}\n\
             {\"all\":[\"oops\",\"oops\"],\"cause\":\"oops\"}\n"
        );
    }

    #[test]
    fn test_caller_reports_creation_site() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let line = line!() + 1;
        event(&writer).caller().send();
        let expected = format!("{{\"caller\":\"{}:{}\"}}\n", file!(), line);
        assert_eq!(output(&sink), expected);
    }

    #[test]
    fn test_durations_follow_config() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        event(&writer).dur("d", Duration::from_micros(1500)).send();
        config::update(|c| c.duration_field_integer = true);
        event(&writer).dur("d", Duration::from_micros(1500)).send();
        config::reset();
        let start = OffsetDateTime::UNIX_EPOCH;
        event(&writer)
            .time_diff("up", start + time::Duration::seconds(2), start)
            .time_diff("neg", start, start + time::Duration::seconds(2))
            .send();
        assert_eq!(output(&sink), "{\"d\":1.5}\n{\"d\":1}\n{\"up\":2000,\"neg\":0}\n");
    }

    #[test]
    fn test_hooks_run_in_order_before_message() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let first = move |e: Event, level: Level, msg: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            e.str("first", level.as_str()).str("saw", msg)
        };
        let second = |e: Event, _: Level, _: &str| e.int("second", 2);
        let hooks: Arc<[Arc<dyn Hook>]> = Arc::from(vec![Arc::new(first) as Arc<dyn Hook>, Arc::new(second)]);
        Event::new(Level::Warn, Some(writer), Some(hooks), false, Location::caller()).msg("m");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(output(&sink), "{\"first\":\"warn\",\"saw\":\"m\",\"second\":2,\"message\":\"m\"}\n");
    }

    #[test]
    fn test_hook_can_discard() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let drop_all = |e: Event, _: Level, _: &str| e.discard();
        let hooks: Arc<[Arc<dyn Hook>]> = Arc::from(vec![Arc::new(drop_all) as Arc<dyn Hook>]);
        Event::new(Level::Info, Some(writer), Some(hooks), false, Location::caller()).msg("gone");
        assert_eq!(output(&sink), "");
    }

    #[test]
    fn test_marshal_failure_is_inline() {
        use std::collections::HashMap;
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not strings");
        event(&writer).any("bad", &bad).int("after", 1).send();
        let out = output(&sink);
        assert!(out.starts_with("{\"bad\":\"marshaling error: "), "{out}");
        assert!(out.ends_with(",\"after\":1}\n"), "{out}");
    }

    #[test]
    fn test_fatal_exits_after_write() {
        static EXITS: AtomicUsize = AtomicUsize::new(0);
        fn fake_exit() {
            EXITS.fetch_add(1, Ordering::SeqCst);
        }
        let _guard = GLOBAL_LOCK.lock();
        config::update(|c| c.fatal_exit = fake_exit);
        let (sink, writer) = test_writer();
        event(&writer).with_terminate(Some(Terminate::Exit)).msg("bye");
        Event::disabled().with_terminate(Some(Terminate::Exit)).msg("filtered");
        config::reset();
        assert_eq!(EXITS.load(Ordering::SeqCst), 2);
        assert_eq!(output(&sink), "{\"message\":\"bye\"}\n");
    }

    #[test]
    fn test_panic_after_write() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            event(&writer).with_terminate(Some(Terminate::Panic)).msg("boom");
        }));
        let payload = res.unwrap_err();
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("boom"));
        assert_eq!(output(&sink), "{\"message\":\"boom\"}\n");
    }

    #[test]
    fn test_write_errors_reach_handler() {
        struct Broken;
        impl Writer for Broken {
            fn write(&self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "down"))
            }
        }
        struct Short;
        impl Writer for Short {
            fn write(&self, _buf: &[u8]) -> io::Result<usize> {
                Ok(1)
            }
        }
        let _guard = GLOBAL_LOCK.lock();
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        config::update(move |c| {
            c.error_handler = Some(Arc::new(move |_err: &io::Error| {
                seen.fetch_add(1, Ordering::SeqCst);
            }))
        });
        event(&(Arc::new(Broken) as Arc<dyn Writer>)).msg("x");
        event(&(Arc::new(Short) as Arc<dyn Writer>)).msg("x");
        config::reset();
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_msgf_and_msg_func() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        event(&writer).msgf(format_args!("{}-{}", 1, 2));
        event(&writer).msg_func(|| "lazy".to_string());
        let called = AtomicUsize::new(0);
        Event::disabled().msg_func(|| {
            called.fetch_add(1, Ordering::SeqCst);
            String::new()
        });
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(output(&sink), "{\"message\":\"1-2\"}\n{\"message\":\"lazy\"}\n");
    }
}
