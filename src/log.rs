//! Leveled log records written through a [`BufferedWriter`].

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::writer::BufferedWriter;

/// Severity of a log record. Records below a log's minimum level are dropped.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default)]
pub enum LogLevel {
    /// Detailed diagnostics.
    #[default]
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected that was recovered from.
    Warn,
    /// A failed operation.
    Error,
    /// An error the program cannot continue after.
    Fatal,
}

impl LogLevel {
    /// Looks a level up by name, ignoring case. Unknown names map to [`LogLevel::Debug`], so a
    /// misspelled threshold logs everything rather than nothing.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "INFO" => Self::Info,
            "WARN" | "WARNING" => Self::Warn,
            "ERROR" => Self::Error,
            "FATAL" => Self::Fatal,
            _ => Self::Debug,
        }
    }

    /// The name used in log records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log that writes one line per record: `[LEVEL] file:line: message`.
///
/// Use the [`log_debug!`](crate::log_debug), [`log_info!`](crate::log_info),
/// [`log_warn!`](crate::log_warn), [`log_error!`](crate::log_error) and
/// [`log_fatal!`](crate::log_fatal) macros to fill in the source location.
pub struct Log<T: Write> {
    writer: BufferedWriter<T>,
    min: LogLevel,
}

impl Log<File> {
    /// Opens (or creates) the file at `path` and appends records to it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_writer(BufferedWriter::open(path)?))
    }
}

impl<T: Write> Log<T> {
    /// Logs to a caller-supplied sink. [`close`](Self::close) hands the sink back.
    pub fn attach(inner: T) -> Self {
        Self::from_writer(BufferedWriter::attach(inner))
    }

    /// Logs through an existing writer.
    pub fn from_writer(writer: BufferedWriter<T>) -> Self {
        Self {
            writer,
            min: LogLevel::default(),
        }
    }

    /// Sets the minimum level of records that are written.
    pub fn with_min_level(mut self, min: LogLevel) -> Self {
        self.min = min;
        self
    }

    /// The minimum level of records that are written.
    pub fn min_level(&self) -> LogLevel {
        self.min
    }

    /// Changes the minimum level of records that are written.
    pub fn set_min_level(&mut self, min: LogLevel) {
        self.min = min;
    }

    /// Writes one record if `level` is at or above the minimum level.
    ///
    /// Fatal records are flushed immediately. Returns the number of bytes written, 0 for a
    /// record that was filtered out.
    pub fn write_record(
        &mut self,
        level: LogLevel,
        file: &str,
        line: u32,
        args: fmt::Arguments<'_>,
    ) -> usize {
        if level < self.min {
            return 0;
        }
        let n = self
            .writer
            .writef(format_args!("[{level}] {file}:{line}: {args}\n"));
        if level == LogLevel::Fatal {
            self.writer.flush();
        }
        n
    }

    /// Flushes buffered records to the sink.
    pub fn flush(&mut self) -> usize {
        self.writer.flush()
    }

    /// Returns `true` if the sink has failed.
    pub fn err(&self) -> bool {
        self.writer.err()
    }

    /// Flushes and closes the log, returning the sink if it was attached.
    pub fn close(self) -> Option<T> {
        self.writer.close()
    }
}

/// Writes a [`LogLevel::Debug`] record to a [`Log`].
#[macro_export]
macro_rules! log_debug {
    ($log:expr, $($arg:tt)*) => {
        $log.write_record($crate::LogLevel::Debug, file!(), line!(), ::core::format_args!($($arg)*))
    };
}

/// Writes a [`LogLevel::Info`] record to a [`Log`].
#[macro_export]
macro_rules! log_info {
    ($log:expr, $($arg:tt)*) => {
        $log.write_record($crate::LogLevel::Info, file!(), line!(), ::core::format_args!($($arg)*))
    };
}

/// Writes a [`LogLevel::Warn`] record to a [`Log`].
#[macro_export]
macro_rules! log_warn {
    ($log:expr, $($arg:tt)*) => {
        $log.write_record($crate::LogLevel::Warn, file!(), line!(), ::core::format_args!($($arg)*))
    };
}

/// Writes a [`LogLevel::Error`] record to a [`Log`].
#[macro_export]
macro_rules! log_error {
    ($log:expr, $($arg:tt)*) => {
        $log.write_record($crate::LogLevel::Error, file!(), line!(), ::core::format_args!($($arg)*))
    };
}

/// Writes a [`LogLevel::Fatal`] record to a [`Log`].
#[macro_export]
macro_rules! log_fatal {
    ($log:expr, $($arg:tt)*) => {
        $log.write_record($crate::LogLevel::Fatal, file!(), line!(), ::core::format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(LogLevel::from_name("info"), LogLevel::Info);
        assert_eq!(LogLevel::from_name(" Warning "), LogLevel::Warn);
        assert_eq!(LogLevel::from_name("FATAL"), LogLevel::Fatal);
        assert_eq!(LogLevel::from_name("chatty"), LogLevel::Debug);
        assert!(LogLevel::Error > LogLevel::Warn);
    }

    #[test]
    fn records_below_minimum_are_dropped() {
        let mut log = Log::attach(Vec::new()).with_min_level(LogLevel::Info);
        assert_eq!(crate::log_debug!(log, "hidden {}", 1), 0);
        let n = crate::log_info!(log, "hello {}", 5);
        let out = log.close().unwrap();
        assert_eq!(n, out.len());

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(&format!("[INFO] {}:", file!())), "{text}");
        assert!(text.ends_with(": hello 5\n"), "{text}");
        assert!(!text.contains("hidden"));
    }

    #[test]
    fn fatal_records_are_flushed() {
        let mut log = Log::attach(Vec::new());
        crate::log_fatal!(log, "out of {}", "disk");
        assert!(log.writer.pending().is_empty());
        let text = String::from_utf8(log.close().unwrap()).unwrap();
        assert!(text.starts_with("[FATAL] "), "{text}");
    }
}
