//! Process-wide logging configuration.
//!
//! All knobs that shape the wire output but are not carried by a
//! [`Logger`](crate::Logger) live in one [`Config`] value. Events take an
//! `Arc` snapshot when they are created, so replacing the configuration never
//! affects a record that is already being built.

use std::error::Error;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use time::format_description::OwnedFormatItem;
use time::OffsetDateTime;

use crate::level::Level;

/// How timestamps are rendered by the text encoder.
///
/// The binary encoder always writes a tagged epoch value and ignores this.
#[derive(Debug, Clone, Default)]
pub enum TimeFormat {
    /// Integer seconds since the Unix epoch.
    Unix,
    /// Integer milliseconds since the Unix epoch.
    UnixMs,
    /// Integer microseconds since the Unix epoch.
    UnixMicros,
    /// Integer nanoseconds since the Unix epoch.
    UnixNanos,
    /// RFC 3339 with whole seconds, e.g. `2024-05-01T10:00:00Z`.
    #[default]
    Rfc3339,
    /// RFC 3339 keeping the sub-second part.
    Rfc3339Nanos,
    /// Quoted output of a custom `time` format description.
    Layout(OwnedFormatItem),
}

impl TimeFormat {
    /// Parses a `time` format description such as `"[hour]:[minute]"`.
    pub fn layout(description: &str) -> Result<TimeFormat, time::error::InvalidFormatDescription> {
        time::format_description::parse_owned::<2>(description).map(TimeFormat::Layout)
    }
}

/// Extracts a stack trace from an error for the stack field.
pub type StackMarshaler = fn(&dyn Error) -> Option<String>;

/// Receives writer failures. There is exactly one per process.
pub type ErrorHandler = Arc<dyn Fn(&io::Error) + Send + Sync>;

/// Process-wide output configuration.
#[derive(Clone)]
pub struct Config {
    pub timestamp_field_name: String,
    pub level_field_name: String,
    pub message_field_name: String,
    pub error_field_name: String,
    pub caller_field_name: String,
    pub error_stack_field_name: String,
    pub category_field_name: String,
    /// Maps a level to the value of the level field.
    pub level_field_marshal: fn(Level) -> &'static str,
    pub time_field_format: TimeFormat,
    /// Source of the current time for timestamp fields and burst sampling windows.
    pub timestamp_func: fn() -> OffsetDateTime,
    pub duration_field_unit: Duration,
    /// Render durations as integer unit counts instead of float ratios.
    pub duration_field_integer: bool,
    pub error_stack_marshaler: Option<StackMarshaler>,
    /// Called when a writer fails. Falls back to `tracing` or stderr when unset.
    pub error_handler: Option<ErrorHandler>,
    /// Runs after a fatal record is written.
    pub fatal_exit: fn(),
}

fn exit_process() {
    std::process::exit(1)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timestamp_field_name: "time".to_string(),
            level_field_name: "level".to_string(),
            message_field_name: "message".to_string(),
            error_field_name: "error".to_string(),
            caller_field_name: "caller".to_string(),
            error_stack_field_name: "stack".to_string(),
            category_field_name: "category".to_string(),
            level_field_marshal: Level::as_str,
            time_field_format: TimeFormat::default(),
            timestamp_func: OffsetDateTime::now_utc,
            duration_field_unit: Duration::from_millis(1),
            duration_field_integer: false,
            error_stack_marshaler: None,
            error_handler: None,
            fatal_exit: exit_process,
        }
    }
}

lazy_static! {
    static ref CONFIG: RwLock<Arc<Config>> = RwLock::new(Arc::new(Config::default()));
}

/// Snapshot of the configuration in effect right now.
pub fn current() -> Arc<Config> {
    Arc::clone(&CONFIG.read())
}

/// Replaces the configuration.
pub fn set(config: Config) {
    *CONFIG.write() = Arc::new(config);
}

/// Applies `f` to a copy of the current configuration and installs the result.
pub fn update(f: impl FnOnce(&mut Config)) {
    let mut guard = CONFIG.write();
    let mut next = Config::clone(&guard);
    f(&mut next);
    *guard = Arc::new(next);
}

/// Restores the default configuration.
pub fn reset() {
    set(Config::default());
}

/// Routes a writer failure to the registered handler.
pub(crate) fn report_error(config: &Config, err: &io::Error) {
    if let Some(handler) = &config.error_handler {
        handler(err);
    } else if tracing::dispatcher::has_been_set() {
        tracing::error!(error = %err, "failed to write log record");
    } else {
        eprintln!("record_logger: could not write event: {err}");
    }
}
