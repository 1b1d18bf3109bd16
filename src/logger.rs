use std::error::Error;
use std::fmt;
use std::io;
use std::panic::Location;
use std::sync::Arc;

use crate::category;
use crate::context::Context;
use crate::encoder::{Enc, Encoder};
use crate::event::{Event, Terminate};
use crate::hook::Hook;
use crate::level::{self, Level};
use crate::sampler::Sampler;
use crate::writer::{NopWriter, Writer};

/// An immutable logging handle.
///
/// Every configuration method returns a new `Logger` and leaves the receiver
/// untouched, so a logger can be cloned freely and shared between threads.
/// Prefix fields added through [`Logger::with`] are encoded once and copied
/// into every event.
///
/// # Examples
///
/// ```
/// use record_logger::{Level, Logger, SyncWriter};
/// use std::sync::Arc;
///
/// let out = Arc::new(SyncWriter::new(Vec::new()));
/// let logger = Logger::new(out.clone())
///     .level(Level::Info)
///     .with()
///     .str("service", "api")
///     .logger();
///
/// logger.debug().msg("dropped");
/// logger.info().int("port", 8080).msg("listening");
///
/// # #[cfg(not(feature = "binary_log"))]
/// assert_eq!(
///     out.with_inner(|buf| String::from_utf8(buf.clone()).unwrap()),
///     "{\"level\":\"info\",\"service\":\"api\",\"port\":8080,\"message\":\"listening\"}\n"
/// );
/// ```
#[derive(Clone)]
pub struct Logger {
    writer: Arc<dyn Writer>,
    level: Level,
    sampler: Option<Arc<dyn Sampler>>,
    hooks: Arc<[Arc<dyn Hook>]>,
    contexts: Arc<[Arc<[u8]>]>,
    category: Option<u8>,
    stack: bool,
}

impl Logger {
    /// Creates a logger writing every level to `writer`.
    pub fn new(writer: impl Writer + 'static) -> Logger {
        Logger {
            writer: Arc::new(writer),
            level: Level::Trace,
            sampler: None,
            hooks: Arc::from(Vec::new()),
            contexts: Arc::from(Vec::new()),
            category: None,
            stack: false,
        }
    }

    /// A disabled logger that never builds an event.
    pub fn nop() -> Logger {
        Logger::new(NopWriter).level(Level::Disabled)
    }

    /// Same logger with a different destination.
    pub fn output(&self, writer: impl Writer + 'static) -> Logger {
        Logger {
            writer: Arc::new(writer),
            ..self.clone()
        }
    }

    /// Same logger with a minimum level.
    pub fn level(&self, level: Level) -> Logger {
        Logger {
            level,
            ..self.clone()
        }
    }

    pub fn get_level(&self) -> Level {
        self.level
    }

    /// Same logger with a sampler. Clones share the sampler's state.
    pub fn sample(&self, sampler: impl Sampler + 'static) -> Logger {
        Logger {
            sampler: Some(Arc::new(sampler)),
            ..self.clone()
        }
    }

    /// Same logger with `hook` run after the hooks already attached.
    pub fn hook(&self, hook: impl Hook + 'static) -> Logger {
        self.push_hook(Arc::new(hook))
    }

    pub(crate) fn push_hook(&self, hook: Arc<dyn Hook>) -> Logger {
        let mut hooks = self.hooks.to_vec();
        hooks.push(hook);
        Logger {
            hooks: Arc::from(hooks),
            ..self.clone()
        }
    }

    /// Same logger tagged with category `id`. Its events are also checked
    /// against the category's level; see [`set_category`](crate::set_category).
    pub fn category(&self, id: u8) -> Logger {
        Logger {
            category: Some(id),
            ..self.clone()
        }
    }

    pub(crate) fn with_stack(mut self) -> Logger {
        self.stack = true;
        self
    }

    /// Appends encoded prefix fields.
    pub(crate) fn push_context(mut self, fields: &[u8]) -> Logger {
        if fields.is_empty() {
            return self;
        }
        let mut contexts = self.contexts.to_vec();
        contexts.push(Arc::from(fields));
        self.contexts = Arc::from(contexts);
        self
    }

    pub(crate) fn clear_context(mut self) -> Logger {
        self.contexts = Arc::from(Vec::new());
        self
    }

    /// Starts a child logger with extra prefix fields. A disabled logger
    /// drops them.
    #[track_caller]
    pub fn with(&self) -> Context {
        Context::new(self.clone(), Location::caller())
    }

    /// Adds prefix fields to this logger in place.
    ///
    /// Clones taken before the call keep their old fields.
    pub fn update_context(&mut self, f: impl FnOnce(Context) -> Context) {
        if self.level == Level::Disabled {
            return;
        }
        *self = f(self.with()).logger();
    }

    #[track_caller]
    pub fn trace(&self) -> Event {
        self.new_event(Level::Trace, None, Location::caller())
    }

    #[track_caller]
    pub fn debug(&self) -> Event {
        self.new_event(Level::Debug, None, Location::caller())
    }

    #[track_caller]
    pub fn info(&self) -> Event {
        self.new_event(Level::Info, None, Location::caller())
    }

    #[track_caller]
    pub fn warn(&self) -> Event {
        self.new_event(Level::Warn, None, Location::caller())
    }

    #[track_caller]
    pub fn error(&self) -> Event {
        self.new_event(Level::Error, None, Location::caller())
    }

    /// Starts a fatal event. Finishing it writes the record and then runs
    /// [`Config::fatal_exit`](crate::Config), which exits the process by
    /// default. This happens even when the event is filtered out.
    #[track_caller]
    pub fn fatal(&self) -> Event {
        self.new_event(Level::Fatal, Some(Terminate::Exit), Location::caller())
    }

    /// Starts a panic event. Finishing it writes the record and then panics
    /// with the message.
    #[track_caller]
    pub fn panic(&self) -> Event {
        self.new_event(Level::Panic, Some(Terminate::Panic), Location::caller())
    }

    /// Starts an event without a level field.
    #[track_caller]
    pub fn log(&self) -> Event {
        self.new_event(Level::NoLevel, None, Location::caller())
    }

    /// Starts an event at `level`. Unlike [`Logger::fatal`] and
    /// [`Logger::panic`], fatal and panic events made here do not terminate.
    #[track_caller]
    pub fn with_level(&self, level: Level) -> Event {
        match level {
            Level::Disabled => Event::disabled(),
            level => self.new_event(level, None, Location::caller()),
        }
    }

    /// Starts an error event carrying `err`, or an info event without it.
    #[track_caller]
    pub fn err(&self, err: Option<&dyn Error>) -> Event {
        match err {
            Some(err) => self.new_event(Level::Error, None, Location::caller()).err(err),
            None => self.new_event(Level::Info, None, Location::caller()),
        }
    }

    /// Writes a debug event with a formatted message.
    #[track_caller]
    pub fn printf(&self, args: fmt::Arguments<'_>) {
        let e = self.debug();
        if e.enabled() {
            e.msgf(args);
        }
    }

    /// Whether an event at `level` is built, and the category name to tag it
    /// with.
    fn admit(&self, level: Level) -> Option<Option<Arc<str>>> {
        if level < self.level || level < level::global_level() {
            return None;
        }
        let name = match self.category {
            Some(id) => {
                let (min, name) = category::lookup(id);
                if level < min {
                    return None;
                }
                name
            }
            None => None,
        };
        if let Some(sampler) = &self.sampler {
            if !level::sampling_disabled() && !sampler.sample(level) {
                return None;
            }
        }
        Some(name)
    }

    fn new_event(&self, level: Level, terminate: Option<Terminate>, location: &'static Location<'static>) -> Event {
        let Some(category_name) = self.admit(level) else {
            return Event::disabled().with_terminate(terminate);
        };
        let hooks = (!self.hooks.is_empty()).then(|| Arc::clone(&self.hooks));
        Event::new(level, Some(Arc::clone(&self.writer)), hooks, self.stack, location)
            .with_terminate(terminate)
            .append(|buf, cfg| {
                if level != Level::NoLevel && !cfg.level_field_name.is_empty() {
                    Enc::append_key(buf, &cfg.level_field_name);
                    Enc::append_str(buf, (cfg.level_field_marshal)(level));
                }
                if let Some(name) = &category_name {
                    Enc::append_key(buf, &cfg.category_field_name);
                    Enc::append_str(buf, name);
                }
                for fields in self.contexts.iter() {
                    Enc::append_object_data(buf, fields);
                }
            })
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("category", &self.category)
            .field("hooks", &self.hooks.len())
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

/// Each write becomes one event without a level, with a trailing newline
/// removed from the message.
impl io::Write for Logger {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let msg = buf.strip_suffix(b"\n").unwrap_or(buf);
        self.log().msg(&String::from_utf8_lossy(msg));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::BasicSampler;
    use crate::test_support::{output, test_writer, GLOBAL_LOCK};
    use crate::{config, set_category, set_global_level};
    use std::io::Write as _;

    #[test]
    fn test_basic_record() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        Logger::new(writer).info().str("foo", "bar").int("n", 123).msg("hello");
        assert_eq!(output(&sink), "{\"level\":\"info\",\"foo\":\"bar\",\"n\":123,\"message\":\"hello\"}\n");
    }

    #[test]
    fn test_level_gate() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let logger = Logger::new(writer).level(Level::Warn);
        assert!(!logger.info().enabled());
        logger.debug().msg("no");
        logger.warn().msg("yes");
        logger.log().msg("plain");
        assert_eq!(
            output(&sink),
            "{\"level\":\"warn\",\"message\":\"yes\"}\n{\"message\":\"plain\"}\n"
        );
    }

    #[test]
    fn test_global_level_wins() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let logger = Logger::new(writer);
        set_global_level(Level::Error);
        logger.warn().msg("no");
        logger.error().msg("yes");
        set_global_level(Level::Trace);
        assert_eq!(output(&sink), "{\"level\":\"error\",\"message\":\"yes\"}\n");
    }

    #[test]
    fn test_disabled_logger_drops_no_level() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let logger = Logger::new(writer).level(Level::Disabled);
        logger.log().msg("x");
        assert_eq!(output(&sink), "");
        assert!(!Logger::nop().error().enabled());
    }

    #[test]
    fn test_context_is_prefixed() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let logger = Logger::new(writer)
            .with()
            .str("a", "1")
            .logger()
            .with()
            .int("b", 2)
            .logger();
        logger.info().bool("c", true).send();
        assert_eq!(output(&sink), "{\"level\":\"info\",\"a\":\"1\",\"b\":2,\"c\":true}\n");
    }

    #[test]
    fn test_sampler_gate() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let logger = Logger::new(writer).sample(BasicSampler::new(2));
        for i in 1..=4 {
            logger.info().int("i", i).send();
        }
        assert_eq!(output(&sink), "{\"level\":\"info\",\"i\":2}\n{\"level\":\"info\",\"i\":4}\n");

        let (sink, writer) = test_writer();
        let logger = logger.output(writer);
        level::disable_sampling(true);
        for i in 1..=2 {
            logger.info().int("i", i).send();
        }
        level::disable_sampling(false);
        assert_eq!(output(&sink), "{\"level\":\"info\",\"i\":1}\n{\"level\":\"info\",\"i\":2}\n");
    }

    #[test]
    fn test_category_gate_and_field() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        set_category(3, "db", Level::Warn);
        let logger = Logger::new(writer).category(3);
        logger.info().msg("no");
        logger.error().msg("yes");
        category::reset_categories();
        logger.info().msg("unnamed");
        assert_eq!(
            output(&sink),
            "{\"level\":\"error\",\"category\":\"db\",\"message\":\"yes\"}\n{\"level\":\"info\",\"message\":\"unnamed\"}\n"
        );
    }

    #[test]
    fn test_renamed_fields() {
        let _guard = GLOBAL_LOCK.lock();
        config::update(|c| {
            c.level_field_name = "lvl".to_string();
            c.message_field_name = "msg".to_string();
        });
        let (sink, writer) = test_writer();
        Logger::new(writer).warn().msg("hi");
        config::update(|c| c.level_field_name = String::new());
        let (sink2, writer2) = test_writer();
        Logger::new(writer2).warn().msg("hi");
        config::reset();
        assert_eq!(output(&sink), "{\"lvl\":\"warn\",\"msg\":\"hi\"}\n");
        assert_eq!(output(&sink2), "{\"msg\":\"hi\"}\n");
    }

    #[test]
    fn test_err_and_with_level() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let logger = Logger::new(writer);
        let err = io::Error::new(io::ErrorKind::NotFound, "missing");
        logger.err(Some(&err)).send();
        logger.err(None).send();
        logger.with_level(Level::Fatal).msg("kept alive");
        assert!(!logger.with_level(Level::Disabled).enabled());
        assert_eq!(
            output(&sink),
            "{\"level\":\"error\",\"error\":\"missing\"}\n\
             {\"level\":\"info\"}\n\
             {\"level\":\"fatal\",\"message\":\"kept alive\"}\n"
        );
    }

    #[test]
    fn test_io_write_and_printf() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let mut logger = Logger::new(writer);
        logger.write_all(b"from writer\n").unwrap();
        logger.printf(format_args!("{} + {}", 1, 1));
        assert_eq!(
            output(&sink),
            "{\"message\":\"from writer\"}\n{\"level\":\"debug\",\"message\":\"1 + 1\"}\n"
        );
    }

    #[test]
    fn test_update_context_in_place() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let mut logger = Logger::new(writer);
        let before = logger.clone();
        logger.update_context(|c| c.str("req", "42"));
        logger.info().send();
        before.info().send();
        assert_eq!(output(&sink), "{\"level\":\"info\",\"req\":\"42\"}\n{\"level\":\"info\"}\n");
    }
}
