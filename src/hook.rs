//! Hooks run on every event just before its message is written.

use std::sync::Arc;

use crate::event::Event;
use crate::level::Level;

/// Runs on each finished event, in the order hooks were attached.
///
/// A hook may add fields, or disable the event with [`Event::discard`].
/// Any closure `Fn(Event, Level, &str) -> Event` is a hook.
///
/// ```
/// use record_logger::{Event, Level, Logger, NopWriter};
///
/// let logger = Logger::new(NopWriter).hook(|e: Event, level: Level, _msg: &str| {
///     if level >= Level::Error {
///         e.bool("alert", true)
///     } else {
///         e
///     }
/// });
/// logger.error().msg("disk full");
/// ```
pub trait Hook: Send + Sync {
    fn run(&self, e: Event, level: Level, msg: &str) -> Event;
}

impl<F> Hook for F
where
    F: Fn(Event, Level, &str) -> Event + Send + Sync,
{
    fn run(&self, e: Event, level: Level, msg: &str) -> Event {
        self(e, level, msg)
    }
}

/// Dispatches to a different hook per level.
#[derive(Clone, Default)]
pub struct LevelHook {
    hooks: [Option<Arc<dyn Hook>>; Level::ALL.len()],
}

impl LevelHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook for events at `level`.
    pub fn on(mut self, level: Level, hook: impl Hook + 'static) -> Self {
        self.hooks[level.index()] = Some(Arc::new(hook));
        self
    }
}

impl Hook for LevelHook {
    fn run(&self, e: Event, level: Level, msg: &str) -> Event {
        match &self.hooks[level.index()] {
            Some(hook) => hook.run(e, level, msg),
            None => e,
        }
    }
}

/// Adds the current time under the timestamp field name.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TimestampHook;

impl Hook for TimestampHook {
    fn run(&self, e: Event, _level: Level, _msg: &str) -> Event {
        e.timestamp()
    }
}

/// Adds the call site under the caller field name.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CallerHook;

impl Hook for CallerHook {
    fn run(&self, e: Event, _level: Level, _msg: &str) -> Event {
        e.caller()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{output, test_writer, GLOBAL_LOCK};
    use crate::Logger;

    #[test]
    fn test_level_hook_dispatches_by_level() {
        let _guard = GLOBAL_LOCK.lock();
        let (sink, writer) = test_writer();
        let hook = LevelHook::new()
            .on(Level::Warn, |e: Event, _: Level, _: &str| e.str("on", "warn"))
            .on(Level::Error, |e: Event, _: Level, _: &str| e.str("on", "error"));
        let logger = Logger::new(writer).hook(hook);
        logger.info().msg("");
        logger.warn().msg("");
        logger.error().msg("");
        assert_eq!(
            output(&sink),
            "{\"level\":\"info\"}\n{\"level\":\"warn\",\"on\":\"warn\"}\n{\"level\":\"error\",\"on\":\"error\"}\n"
        );
    }
}
