use std::path::PathBuf;

/// Error returned when a stream cannot be created.
///
/// Failures after a stream is open are not reported through this type. They are sticky status
/// flags on the stream, queried with `err()` and `eof()`.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The file backing the stream could not be opened.
    #[error("failed to open `{}`: {source}", path.display())]
    Open {
        /// Path that was passed to the open call.
        path: PathBuf,
        /// Error reported by the operating system.
        #[source]
        source: std::io::Error,
    },
}

impl StreamError {
    pub(crate) fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = core::result::Result<T, StreamError>;
