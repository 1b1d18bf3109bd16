//! # Record Logger
//!
//! A structured logging library that writes one JSON object (or one CBOR map)
//! per log call:
//!
//! * **No per-field allocation**: records are encoded straight into pooled
//!   buffers, in field call order
//! * **Cheap when filtered**: the level, category and sampling checks run
//!   before a buffer is touched, and every field call on a filtered event is
//!   a no-op
//! * **Two wire formats**: newline-delimited JSON by default, or CBOR with the
//!   `binary_log` feature. Binary logs decode back to the exact JSON text
//!
//! ## Main Components
//!
//! * `Logger`: immutable handle carrying a writer, a minimum level, a sampler,
//!   hooks and prefix fields
//! * `Event`: single-use builder for one record
//! * `Context`: builder for a child logger's prefix fields
//! * `Writer`: destination for finished records
//! * `cbor_reader`: decoder turning binary logs back into JSON
//!
//! ## Quick Start
//!
//! ```
//! use record_logger::{Level, Logger};
//!
//! let logger = Logger::new(record_logger::stdout()).level(Level::Info);
//! logger.info().str("foo", "bar").int("n", 123).msg("hello");
//! // {"level":"info","foo":"bar","n":123,"message":"hello"}
//!
//! let child = logger.with().str("component", "db").logger();
//! child.warn().dur("elapsed", std::time::Duration::from_millis(250)).msg("slow query");
//! ```

pub mod array;
pub mod category;
pub mod cbor;
pub mod cbor_reader;
pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod event;
pub mod hook;
pub mod json;
pub mod level;
pub mod logger;
mod pool;
pub mod sampler;
pub mod writer;

pub use array::{arr, Array};
pub use category::{
    category_level, lock_categories, reset_categories, set_category, set_category_level, CategoryGuard,
    CATEGORY_COUNT,
};
pub use cbor::Cbor;
pub use cbor_reader::{decode_if_binary, decode_object, decode_to_json, is_binary, LogReader};
pub use config::{Config, TimeFormat};
pub use context::Context;
pub use encoder::{Enc, Encoder};
pub use error::DecodeError;
pub use event::{dict, Event, LogArrayMarshaler, LogObjectMarshaler};
pub use hook::{Hook, LevelHook};
pub use json::Json;
pub use level::{disable_sampling, global_level, set_global_level, Level, ParseLevelError};
pub use logger::Logger;
pub use sampler::{often, rarely, sometimes, BasicSampler, BurstSampler, LevelSampler, RandomSampler, Sampler};
pub use writer::{stderr, stdout, FilteredLevelWriter, MultiLevelWriter, NopWriter, SyncWriter, Writer};
