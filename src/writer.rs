use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, trace};
use zerocopy::{Immutable, IntoBytes};

use crate::error::{Result, StreamError};
use crate::handle::{Handle, Ownership};
use crate::DEFAULT_CAPACITY;

/// Writes formatted text to a [`BufferedWriter`], `printf`-style.
///
/// Expands to a call to [`BufferedWriter::writef`] and evaluates to the number of bytes written.
///
/// ```
/// # use buffered_binary_io::{writef, BufferedWriter};
/// let mut w = BufferedWriter::attach(Vec::new());
/// assert_eq!(writef!(w, "{}-{:04x}", "id", 42), 7);
/// assert_eq!(w.close().unwrap(), b"id-002a");
/// ```
#[macro_export]
macro_rules! writef {
    ($writer:expr, $($arg:tt)*) => {
        $writer.writef(::core::format_args!($($arg)*))
    };
}

/// Buffers output for a byte sink in a fixed-size buffer of `N` bytes.
///
/// Typed integers are encoded most significant byte first unless the `_le` variant is used.
/// Pending bytes live in `buf[..next]`; the rest of the buffer is free. Output reaches the sink
/// when the buffer fills up, on [`flush`](Self::flush), on [`close`](Self::close), and when the
/// writer is dropped.
pub struct BufferedWriter<T: Write, const N: usize = DEFAULT_CAPACITY> {
    handle: Handle<T>,
    next: usize,
    staging_allocs: usize,
    buf: [u8; N],
}

impl BufferedWriter<File> {
    /// Opens the file at `path` for appending, creating it if it does not exist.
    ///
    /// The stream owns the file and closes it when the stream is closed. Positions start at the
    /// end of the existing content.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut writer = Self::open_sized(path, OpenOptions::new().append(true).create(true))?;
        if let Err(err) = writer.handle.seek(SeekFrom::End(0)) {
            debug!(error = %err, "could not find the end of an appended file");
        }
        Ok(writer)
    }

    /// Opens the file at `path` with the given options.
    ///
    /// With append mode the reported position is the file cursor, which only moves to the end
    /// of the file with the first write.
    pub fn open_with(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        Self::open_sized(path, options)
    }
}

impl<T: Write> BufferedWriter<T> {
    /// Wraps a caller-supplied sink.
    ///
    /// The caller keeps ownership of the sink: [`close`](Self::close) flushes and hands it back.
    ///
    /// Positions are counted from where the sink stands when it is attached. Use
    /// [`attach_seekable`](Self::attach_seekable) for a seekable sink that is not at its start.
    pub fn attach(inner: T) -> Self {
        Self::attach_sized(inner)
    }
}

impl<T: Write + Seek> BufferedWriter<T> {
    /// Wraps a caller-supplied seekable sink. [`pos`](Self::pos) and [`fpos`](Self::fpos)
    /// report offsets within the sink, starting from its current position.
    pub fn attach_seekable(inner: T) -> Self {
        Self::attach_seekable_sized(inner)
    }
}

impl<const N: usize> BufferedWriter<File, N> {
    /// Opens the file at `path` with a buffer of `N` bytes.
    pub fn open_sized(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = options
            .open(path)
            .map_err(|err| StreamError::open(path, err))?;
        debug!(path = %path.display(), capacity = N, "opened buffered writer");
        Ok(Self::from_handle(Handle::seekable(file, Ownership::Owned)))
    }
}

impl<T: Write + Seek, const N: usize> BufferedWriter<T, N> {
    /// Wraps a caller-supplied seekable sink with a buffer of `N` bytes.
    pub fn attach_seekable_sized(inner: T) -> Self {
        Self::from_handle(Handle::seekable(inner, Ownership::Attached))
    }
}

impl<T: Write, const N: usize> BufferedWriter<T, N> {
    /// Wraps a caller-supplied sink with a buffer of `N` bytes.
    pub fn attach_sized(inner: T) -> Self {
        Self::from_handle(Handle::attached(inner))
    }

    pub(crate) fn from_handle(handle: Handle<T>) -> Self {
        precondition!(N > 0);
        Self {
            handle,
            next: 0,
            staging_allocs: 0,
            buf: [0; N],
        }
    }

    /// Number of free bytes left in the buffer.
    pub fn available(&self) -> usize {
        N - self.next
    }

    /// The bytes waiting to be flushed.
    pub fn pending(&self) -> &[u8] {
        &self.buf[..self.next]
    }

    /// Logical write position: the raw position of the handle plus the pending bytes.
    pub fn pos(&self) -> u64 {
        self.handle.position() + self.next as u64
    }

    /// Raw position of the handle, ignoring buffering.
    pub fn fpos(&self) -> u64 {
        self.handle.position()
    }

    /// Returns `true` if the underlying handle has encountered an I/O error.
    pub fn err(&self) -> bool {
        self.handle.is_err()
    }

    /// Borrows the underlying handle.
    pub fn handle(&self) -> &Handle<T> {
        &self.handle
    }

    /// Number of heap staging buffers that formatted writes have needed so far.
    pub fn staging_allocations(&self) -> usize {
        self.staging_allocs
    }

    /// Writes all pending bytes to the sink.
    ///
    /// Returns the number of bytes flushed, which is 0 if nothing was pending or the sink
    /// failed. On failure the pending bytes stay in the buffer and the stream is left in the
    /// error state.
    pub fn flush(&mut self) -> usize {
        if self.next == 0 || self.handle.is_err() {
            return 0;
        }
        let result = self
            .handle
            .write_all(&self.buf[..self.next])
            .and_then(|()| self.handle.flush());
        match result {
            Ok(()) => {
                let flushed = self.next;
                self.next = 0;
                trace!(flushed, "flushed write buffer");
                flushed
            }
            Err(err) => {
                debug!(pending = self.next, error = %err, "flush failed");
                0
            }
        }
    }

    /// Flushes pending output and closes the stream.
    ///
    /// If the stream was attached to a caller-supplied sink, the sink is returned. If the stream
    /// opened the sink itself, the sink is closed and `None` is returned.
    pub fn close(mut self) -> Option<T> {
        self.flush();
        self.handle.close()
    }

    /// Writes `data` to the stream.
    ///
    /// If `data` does not fit in the free part of the buffer, pending output is flushed first.
    /// Data larger than the whole buffer is passed through in buffer-sized pieces. Returns the
    /// number of bytes accepted, which is less than `data.len()` only if a flush failed.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if data.len() > self.available() && self.next > 0 && self.flush() == 0 {
            return 0;
        }

        let mut written = 0;
        while data.len() - written > self.available() {
            let take = self.available();
            self.buf[self.next..].copy_from_slice(&data[written..written + take]);
            self.next = N;
            written += take;
            if self.flush() == 0 {
                return written;
            }
        }

        let rest = data.len() - written;
        self.buf[self.next..self.next + rest].copy_from_slice(&data[written..]);
        self.next += rest;
        written + rest
    }

    /// Writes a slice of plain-data values as their in-memory bytes (host byte order).
    ///
    /// Returns the number of bytes accepted.
    pub fn write_slice<E: IntoBytes + Immutable>(&mut self, values: &[E]) -> usize {
        self.write(values.as_bytes())
    }

    /// Writes formatted text to the stream.
    ///
    /// The length of the text is measured first, without writing anything. Text that fits in
    /// the free part of the buffer is formatted straight into it. Text that fits in an empty
    /// buffer is formatted into it after a flush. Anything longer is formatted into a heap
    /// staging buffer of exactly the right size, which is then written in buffer-sized pieces
    /// and released.
    ///
    /// Returns the number of bytes written, or 0 if the text could not be written at all (the
    /// staging buffer could not be allocated, or a `Display` implementation failed).
    pub fn writef(&mut self, args: fmt::Arguments<'_>) -> usize {
        let mut measure = Measure(0);
        if fmt::write(&mut measure, args).is_err() {
            return 0;
        }
        let len = measure.0;

        if len <= self.available() {
            self.format_in_place(args, len)
        } else if len <= N && self.flush() > 0 {
            self.format_in_place(args, len)
        } else {
            let mut staging = Vec::new();
            if let Err(err) = staging.try_reserve_exact(len) {
                debug!(len, error = %err, "could not allocate staging buffer");
                return 0;
            }
            self.staging_allocs += 1;
            trace!(len, "formatting through staging buffer");
            if fmt::write(&mut VecSink(&mut staging), args).is_err() {
                return 0;
            }
            self.write(&staging)
        }
    }

    /// Lets `write!` target the stream. Returns the number of bytes written.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> usize {
        self.writef(args)
    }

    fn format_in_place(&mut self, args: fmt::Arguments<'_>, len: usize) -> usize {
        let mut sink = SliceSink {
            buf: &mut self.buf[self.next..self.next + len],
            len: 0,
        };
        if fmt::write(&mut sink, args).is_err() {
            return 0;
        }
        let n = sink.len;
        self.next += n;
        n
    }

    /// Writes a small, fixed-size array of bytes, flushing first if it does not fit.
    fn write_cbytes<const K: usize>(&mut self, bytes: [u8; K]) {
        if K <= self.available() {
            self.buf[self.next..self.next + K].copy_from_slice(&bytes);
            self.next += K;
        } else {
            self.write(&bytes);
        }
    }

    /// Writes a single `u8` value.
    pub fn write_u8(&mut self, value: u8) {
        self.write_cbytes([value])
    }

    /// Writes a single `i8` value.
    pub fn write_i8(&mut self, value: i8) {
        self.write_cbytes([value as u8])
    }

    /// Writes a `bool` as a single byte, 1 for true and 0 for false.
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8)
    }
}

macro_rules! encode_fns {
    ($($ty:ident => $plain:ident, $be:ident, $le:ident;)*) => {
        impl<T: Write, const N: usize> BufferedWriter<T, N> {
            $(
                #[doc = concat!("Writes a `", stringify!($ty), "`, most significant byte first.")]
                #[inline]
                pub fn $plain(&mut self, value: $ty) {
                    self.write_cbytes(value.to_be_bytes())
                }

                #[doc = concat!("Writes a `", stringify!($ty), "` in big-endian byte order. Same as [`", stringify!($plain), "`](Self::", stringify!($plain), ").")]
                #[inline]
                pub fn $be(&mut self, value: $ty) {
                    self.write_cbytes(value.to_be_bytes())
                }

                #[doc = concat!("Writes a `", stringify!($ty), "` in little-endian byte order.")]
                #[inline]
                pub fn $le(&mut self, value: $ty) {
                    self.write_cbytes(value.to_le_bytes())
                }
            )*
        }
    };
}

encode_fns! {
    u16 => write_u16, write_u16_be, write_u16_le;
    u32 => write_u32, write_u32_be, write_u32_le;
    u64 => write_u64, write_u64_be, write_u64_le;
    i16 => write_i16, write_i16_be, write_i16_le;
    i32 => write_i32, write_i32_be, write_i32_le;
    i64 => write_i64, write_i64_be, write_i64_le;
    f32 => write_f32, write_f32_be, write_f32_le;
    f64 => write_f64, write_f64_be, write_f64_le;
}

impl<T: Write, const N: usize> Drop for BufferedWriter<T, N> {
    fn drop(&mut self) {
        if self.handle.is_open() {
            self.flush();
        }
    }
}

/// Counts the bytes a format string would produce.
struct Measure(usize);

impl fmt::Write for Measure {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

/// Formats into a slice that was sized by [`Measure`].
struct SliceSink<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl fmt::Write for SliceSink<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        let dst = self.buf.get_mut(self.len..end).ok_or(fmt::Error)?;
        dst.copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

struct VecSink<'a>(&'a mut Vec<u8>);

impl fmt::Write for VecSink<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}
