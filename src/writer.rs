//! Destinations for finished records.
//!
//! A [`Writer`] receives one complete record per call. The logger never
//! retries or buffers; whatever the writer reports goes to the configured
//! error handler.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::level::Level;

/// Destination for encoded records.
///
/// Writers are shared between threads and called concurrently, so they take
/// `&self` and do their own locking.
pub trait Writer: Send + Sync {
    /// Writes one record, returning how many bytes were accepted.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Writes one record produced at `level`. Defaults to [`Writer::write`].
    fn write_level(&self, _level: Level, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }
}

impl<W: Writer + ?Sized> Writer for Arc<W> {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn write_level(&self, level: Level, buf: &[u8]) -> io::Result<usize> {
        (**self).write_level(level, buf)
    }
}

impl<W: Writer + ?Sized> Writer for Box<W> {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn write_level(&self, level: Level, buf: &[u8]) -> io::Result<usize> {
        (**self).write_level(level, buf)
    }
}

/// Serializes access to any [`io::Write`] behind a mutex.
///
/// Each record is passed to `write_all`, so records from different threads
/// never interleave.
///
/// # Examples
///
/// ```
/// use record_logger::{SyncWriter, Writer};
///
/// let writer = SyncWriter::new(Vec::new());
/// writer.write(b"{}\n").unwrap();
/// assert_eq!(writer.into_inner(), b"{}\n");
/// ```
pub struct SyncWriter<W> {
    inner: Mutex<W>,
}

impl<W: io::Write + Send> SyncWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Runs `f` with exclusive access to the wrapped writer.
    pub fn with_inner<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W: io::Write + Send> Writer for SyncWriter<W> {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        inner.write_all(buf)?;
        Ok(buf.len())
    }
}

/// Standard output, shared by all loggers that use it.
pub fn stdout() -> SyncWriter<io::Stdout> {
    SyncWriter::new(io::stdout())
}

/// Standard error.
pub fn stderr() -> SyncWriter<io::Stderr> {
    SyncWriter::new(io::stderr())
}

/// Accepts and drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopWriter;

impl Writer for NopWriter {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }
}

/// Copies every record to several writers.
///
/// All writers are tried even when one fails; the first failure (or short
/// write) is reported.
#[derive(Clone, Default)]
pub struct MultiLevelWriter {
    writers: Vec<Arc<dyn Writer>>,
}

impl MultiLevelWriter {
    pub fn new(writers: Vec<Arc<dyn Writer>>) -> Self {
        Self { writers }
    }

    pub fn push(&mut self, writer: Arc<dyn Writer>) {
        self.writers.push(writer);
    }

    fn fan_out(&self, buf: &[u8], mut f: impl FnMut(&dyn Writer) -> io::Result<usize>) -> io::Result<usize> {
        let mut first_err = None;
        for writer in &self.writers {
            let res = match f(writer.as_ref()) {
                Ok(n) if n != buf.len() => Err(io::Error::new(io::ErrorKind::WriteZero, "short write")),
                other => other,
            };
            if let Err(err) = res {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(buf.len()),
        }
    }
}

impl Writer for MultiLevelWriter {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.fan_out(buf, |w| w.write(buf))
    }

    fn write_level(&self, level: Level, buf: &[u8]) -> io::Result<usize> {
        self.fan_out(buf, |w| w.write_level(level, buf))
    }
}

/// Passes on only records at or above a level.
///
/// Records written without a level always pass.
pub struct FilteredLevelWriter<W> {
    writer: W,
    level: Level,
}

impl<W: Writer> FilteredLevelWriter<W> {
    pub fn new(writer: W, level: Level) -> Self {
        Self { writer, level }
    }
}

impl<W: Writer> Writer for FilteredLevelWriter<W> {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn write_level(&self, level: Level, buf: &[u8]) -> io::Result<usize> {
        if level >= self.level {
            return self.writer.write_level(level, buf);
        }
        Ok(buf.len())
    }
}
