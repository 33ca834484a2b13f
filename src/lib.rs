//! Buffered readers and writers for binary and text streams.
//!
//! [`BufferedReader`] overlays a fixed-size buffer on any [`std::io::Read`] source and decodes
//! integers in big-endian, little-endian, or the stream's configured byte order.
//! [`BufferedWriter`] is the mirror image for output: raw writes, fixed-order integer encoding,
//! and `printf`-style formatted writes that fall back to a heap staging buffer when the text does
//! not fit in the internal buffer.
//!
//! Both types follow the conventions of C's `stdio`:
//!
//! * Decoding past the end of the stream yields the zero value of the requested type. Use
//!   [`BufferedReader::eof`] to tell a real zero from end-of-stream.
//! * I/O errors are sticky. Once the underlying handle fails, the stream stays failed and the
//!   condition is reported by `err()`, never by a panic or an `Err` from a read or write call.
//! * Opening a stream by path returns `Err(StreamError)` on failure.
//!
//! ```
//! use buffered_binary_io::{BufferedReader, BufferedWriter, ByteOrder};
//! use std::io::Cursor;
//!
//! let mut w = BufferedWriter::attach(Vec::new());
//! w.write_u32(256);
//! w.write_u16_le(0x1234);
//! let bytes = w.close().unwrap();
//! assert_eq!(bytes, [0, 0, 1, 0, 0x34, 0x12]);
//!
//! let mut r = BufferedReader::attach_with_order(Cursor::new(bytes), ByteOrder::Big);
//! assert_eq!(r.read_u32(), 256);
//! assert_eq!(r.read_u16_le(), 0x1234);
//! assert_eq!(r.read_u8(), 0);
//! assert!(r.eof());
//! ```

#![forbid(unsafe_code)]
#![forbid(unused_must_use)]
#![warn(missing_docs)]

/// Checks a caller-side precondition.
///
/// With `debug_assertions` or the `diagnostics` feature enabled, a violated precondition panics
/// with the failing expression and its location. Otherwise the check is compiled out and the
/// calling operation falls through to its "nothing happened" result.
macro_rules! precondition {
    ($cond:expr) => {
        if cfg!(any(debug_assertions, feature = "diagnostics")) && !($cond) {
            panic!(
                "precondition violated: `{}` at {}:{}",
                stringify!($cond),
                file!(),
                line!()
            );
        }
    };
}

mod bridge;
mod error;
mod handle;
mod log;
mod reader;
mod stdio;
mod writer;


pub use error::StreamError;
pub use handle::{Handle, Ownership};
pub use log::{Log, LogLevel};
pub use reader::BufferedReader;
pub use stdio::StdStreams;
pub use writer::BufferedWriter;

/// Capacity, in bytes, of the internal buffer of readers and writers that do not specify one.
///
/// This is the size of a standard memory page. A capacity of 1 effectively disables buffering.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Byte order used to interpret multi-byte values.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ByteOrder {
    /// Most significant byte first.
    Big,
    /// Least significant byte first.
    Little,
}

impl ByteOrder {
    /// The byte order of the host.
    pub const NATIVE: ByteOrder = if cfg!(target_endian = "big") {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::NATIVE
    }
}
