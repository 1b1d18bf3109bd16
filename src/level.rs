use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};

use thiserror::Error;

/// Severity of a log record.
///
/// Levels are ordered from `Trace` (most verbose) to `Panic`. `NoLevel` sorts
/// above every real severity so it only loses against `Disabled`, which turns
/// a logger off entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(i8)]
pub enum Level {
    Trace = -1,
    Debug = 0,
    #[default]
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
    Panic = 5,
    NoLevel = 6,
    Disabled = 7,
}

/// Error returned when a string does not name a level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown level name {0:?}")]
pub struct ParseLevelError(pub String);

impl Level {
    /// Every level in ascending order.
    pub const ALL: [Level; 9] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
        Level::Panic,
        Level::NoLevel,
        Level::Disabled,
    ];

    /// Name written in the level field. `NoLevel` has an empty name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Panic => "panic",
            Level::NoLevel => "",
            Level::Disabled => "disabled",
        }
    }

    pub const fn from_i8(v: i8) -> Option<Level> {
        match v {
            -1 => Some(Level::Trace),
            0 => Some(Level::Debug),
            1 => Some(Level::Info),
            2 => Some(Level::Warn),
            3 => Some(Level::Error),
            4 => Some(Level::Fatal),
            5 => Some(Level::Panic),
            6 => Some(Level::NoLevel),
            7 => Some(Level::Disabled),
            _ => None,
        }
    }

    /// Zero-based position in [`Level::ALL`].
    pub(crate) const fn index(self) -> usize {
        (self as i8 + 1) as usize
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let level = match lower.as_str() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            "panic" => Level::Panic,
            "disabled" => Level::Disabled,
            "" => Level::NoLevel,
            other => other
                .parse::<i8>()
                .ok()
                .and_then(Level::from_i8)
                .ok_or_else(|| ParseLevelError(s.to_string()))?,
        };
        Ok(level)
    }
}

static GLOBAL_LEVEL: AtomicI8 = AtomicI8::new(Level::Trace as i8);
static SAMPLING_DISABLED: AtomicBool = AtomicBool::new(false);

/// Sets the process-wide minimum level. Loggers with a lower level of their
/// own still drop events below this one.
pub fn set_global_level(level: Level) {
    GLOBAL_LEVEL.store(level as i8, Ordering::SeqCst);
}

/// Returns the process-wide minimum level.
pub fn global_level() -> Level {
    Level::from_i8(GLOBAL_LEVEL.load(Ordering::Relaxed)).unwrap_or(Level::Trace)
}

/// Turns every attached sampler off (`true`) or back on (`false`).
pub fn disable_sampling(disabled: bool) {
    SAMPLING_DISABLED.store(disabled, Ordering::SeqCst);
}

pub(crate) fn sampling_disabled() -> bool {
    SAMPLING_DISABLED.load(Ordering::Relaxed)
}
