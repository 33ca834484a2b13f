use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, trace};
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{Result, StreamError};
use crate::handle::{Handle, Ownership};
use crate::{ByteOrder, DEFAULT_CAPACITY};

/// Reads values from a byte source through a fixed-size buffer of `N` bytes.
///
/// Multi-byte integers can be decoded in three ways. The `_be` and `_le` methods always use
/// big-endian and little-endian byte order. The unsuffixed methods (`read_u32`, ...) use the
/// stream's byte order, which is chosen when the stream is created and defaults to the byte order
/// of the host ([`ByteOrder::NATIVE`]).
///
/// ```
/// # use buffered_binary_io::{BufferedReader, ByteOrder};
/// # use std::io::Cursor;
/// let mut r = BufferedReader::attach_with_order(Cursor::new([0u8, 0, 1, 0, 0, 0, 1, 0]), ByteOrder::Little);
/// assert_eq!(r.read_u32_be(), 256);
/// assert_eq!(r.read_u32(), 65536);
/// ```
///
/// When the source runs out in the middle of a value, the decoding methods return zero. Because
/// zero is also a legitimate value, callers that care must check [`eof`](Self::eof). End of
/// stream is only detected by a read that finds no more bytes, so `eof()` is still `false` right
/// after the last byte has been decoded: a `while !r.eof()` loop decodes one extra zero.
///
/// The bytes of a value cut short by the end of the stream stay buffered when the value fits in
/// the buffer. A value wider than the buffer is read past it, and its partial bytes are consumed.
///
/// The buffer holds consumed bytes in `buf[..next]` and unread bytes in
/// `buf[next..next + available]`. Everything past that is stale.
pub struct BufferedReader<T, const N: usize = DEFAULT_CAPACITY> {
    handle: Handle<T>,
    order: ByteOrder,
    next: usize,
    available: usize,
    buf: [u8; N],
}

impl BufferedReader<File> {
    /// Opens the file at `path` for reading.
    ///
    /// The stream owns the file and closes it when the stream is closed.
    pub fn open(path: impl AsRef<Path>, order: ByteOrder) -> Result<Self> {
        Self::open_sized(path, OpenOptions::new().read(true), order)
    }

    /// Opens the file at `path` with the given options, for example read/update access for use
    /// with [`writer`](Self::writer).
    pub fn open_with(
        path: impl AsRef<Path>,
        options: &OpenOptions,
        order: ByteOrder,
    ) -> Result<Self> {
        Self::open_sized(path, options, order)
    }
}

impl<T: Read> BufferedReader<T> {
    /// Wraps a caller-supplied source, using the host byte order.
    ///
    /// The caller keeps ownership of the source: [`close`](Self::close) hands it back.
    pub fn attach(inner: T) -> Self {
        Self::attach_sized(inner, ByteOrder::NATIVE)
    }

    /// Wraps a caller-supplied source, using `order` for the unsuffixed decoding methods.
    ///
    /// Positions are counted from where the source stands when it is attached. Use
    /// [`attach_seekable`](Self::attach_seekable) for a seekable source that is not at its
    /// start.
    pub fn attach_with_order(inner: T, order: ByteOrder) -> Self {
        Self::attach_sized(inner, order)
    }
}

impl<T: Read + Seek> BufferedReader<T> {
    /// Wraps a caller-supplied seekable source. [`pos`](Self::pos) and [`fpos`](Self::fpos)
    /// report offsets within the source, starting from its current position.
    pub fn attach_seekable(inner: T, order: ByteOrder) -> Self {
        Self::attach_seekable_sized(inner, order)
    }
}

impl<const N: usize> BufferedReader<File, N> {
    /// Opens the file at `path` with a buffer of `N` bytes.
    pub fn open_sized(
        path: impl AsRef<Path>,
        options: &OpenOptions,
        order: ByteOrder,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = options
            .open(path)
            .map_err(|err| StreamError::open(path, err))?;
        debug!(path = %path.display(), capacity = N, ?order, "opened buffered reader");
        Ok(Self::from_handle(Handle::seekable(file, Ownership::Owned), order))
    }
}

impl<T, const N: usize> BufferedReader<T, N> {
    fn from_handle(handle: Handle<T>, order: ByteOrder) -> Self {
        precondition!(N > 0);
        Self {
            handle,
            order,
            next: 0,
            available: 0,
            buf: [0; N],
        }
    }

    /// The byte order used by the unsuffixed decoding methods.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Changes the byte order used by the unsuffixed decoding methods.
    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    /// The bytes that have been read from the source but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.next..self.next + self.available]
    }

    /// Logical read position: the raw position of the handle minus the bytes still buffered.
    pub fn pos(&self) -> u64 {
        self.handle.position() - self.available as u64
    }

    /// Raw position of the handle, ignoring buffering.
    pub fn fpos(&self) -> u64 {
        self.handle.position()
    }

    /// Returns `true` if the underlying handle has encountered an I/O error.
    pub fn err(&self) -> bool {
        self.handle.is_err()
    }

    /// Returns `true` if the underlying handle has reached the end of its input.
    pub fn eof(&self) -> bool {
        self.handle.is_eof()
    }

    /// Borrows the underlying handle.
    pub fn handle(&self) -> &Handle<T> {
        &self.handle
    }

    pub(crate) fn handle_mut(&mut self) -> &mut Handle<T> {
        &mut self.handle
    }

    /// Closes the stream.
    ///
    /// If the stream was attached to a caller-supplied source, the source is returned. If the
    /// stream opened the source itself, the source is closed and `None` is returned.
    pub fn close(mut self) -> Option<T> {
        self.next = 0;
        self.available = 0;
        self.handle.close()
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.available);
        self.next += n;
        self.available -= n;
    }

    fn discard(&mut self) {
        self.next = 0;
        self.available = 0;
    }
}

impl<T: Read, const N: usize> BufferedReader<T, N> {
    /// Wraps a caller-supplied source with a buffer of `N` bytes.
    pub fn attach_sized(inner: T, order: ByteOrder) -> Self {
        Self::from_handle(Handle::attached(inner), order)
    }

    /// Moves the unread bytes to the front of the buffer and reads from the source until at
    /// least `want` bytes are buffered, the buffer is full, or the source is exhausted.
    ///
    /// Returns the number of bytes now buffered, or 0 if the source failed or nothing at all
    /// is available.
    fn fill(&mut self, want: usize) -> usize {
        let kept = self.available;
        self.buf.copy_within(self.next..self.next + kept, 0);
        self.next = 0;

        let want = want.min(N);
        let mut filled = kept;
        while filled < want {
            match self.handle.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => {
                    self.available = filled;
                    return 0;
                }
            }
        }

        self.available = filled;
        trace!(kept, filled, "refilled read buffer");
        filled
    }

    /// Copies up to `out.len()` bytes from the stream, bypassing the buffer for the part of a
    /// request that exceeds its capacity.
    ///
    /// Returns the number of bytes copied and how many of them were taken from the buffer in the
    /// final step. Those bytes are still in `buf[..next]` and can be given back.
    fn read_into(&mut self, out: &mut [u8]) -> (usize, usize) {
        let mut copied = 0;
        while out.len() - copied > N {
            if self.available > 0 {
                let n = self.available;
                out[copied..copied + n].copy_from_slice(self.buffered());
                self.consume(n);
                copied += n;
                continue;
            }
            match self.handle.read(&mut out[copied..]) {
                Ok(0) | Err(_) => return (copied, 0),
                Ok(n) => copied += n,
            }
        }

        let rest = out.len() - copied;
        if rest > self.available {
            self.fill(rest);
        }
        let tail = rest.min(self.available);
        out[copied..copied + tail].copy_from_slice(&self.buffered()[..tail]);
        self.consume(tail);
        (copied + tail, tail)
    }

    fn unconsume(&mut self, n: usize) {
        debug_assert!(n <= self.next);
        self.next -= n;
        self.available += n;
    }

    /// Reads a small array of bytes, with a constant length. Returns `None` if the source runs
    /// out first.
    fn read_cbytes<const K: usize>(&mut self) -> Option<[u8; K]> {
        let mut out = [0u8; K];
        if K > N {
            return (self.read_into(&mut out).0 == K).then_some(out);
        }
        if self.available < K && self.fill(K) < K {
            return None;
        }
        out.copy_from_slice(&self.buffered()[..K]);
        self.consume(K);
        Some(out)
    }

    /// Reads `count` blocks of `block` bytes each into `buf`.
    ///
    /// Returns the number of whole blocks read. A short read lowers the count and never reports
    /// a partial block; when the bytes of a trailing partial block are still buffered they are
    /// left unread. Byte order is not interpreted.
    ///
    /// `block` must be non-zero and `buf` must hold at least `block * count` bytes.
    pub fn read(&mut self, buf: &mut [u8], block: usize, count: usize) -> usize {
        precondition!(block > 0);
        precondition!(block.saturating_mul(count) <= buf.len());
        if block == 0 {
            return 0;
        }
        let total = block.saturating_mul(count).min(buf.len());
        let (copied, tail) = self.read_into(&mut buf[..total]);
        let partial = copied % block;
        if partial > 0 && partial <= tail {
            self.unconsume(partial);
        }
        copied / block
    }

    /// Reads whole values of a plain-data type, one block per element.
    ///
    /// The bytes are copied as they appear in the stream, so they are interpreted in host byte
    /// order. Returns the number of elements fully read.
    pub fn read_slice<E: FromBytes + IntoBytes>(&mut self, out: &mut [E]) -> usize {
        let block = core::mem::size_of::<E>();
        let count = out.len();
        if block == 0 {
            return count;
        }
        self.read(out.as_mut_bytes(), block, count)
    }

    /// Reads up to `buf.len()` bytes into `buf`, returning the number of bytes read.
    ///
    /// Any bytes that are available are copied, even if the source ends before `buf` is full.
    #[deprecated(since = "0.1.0", note = "use `BufferedReader::read` instead")]
    pub fn readn(&mut self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < buf.len() {
            if self.available == 0 && self.fill(buf.len() - copied) == 0 {
                break;
            }
            let n = self.available.min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&self.buffered()[..n]);
            self.consume(n);
            copied += n;
        }
        copied
    }

    /// Reads the next line of text into `buf`.
    ///
    /// Bytes are copied until a `\n` has been copied, `buf` is full, or the source is exhausted.
    /// The last byte copied is then overwritten with a NUL terminator (for a complete line, that
    /// is the `\n`). Returns the number of bytes copied, terminator slot included.
    ///
    /// `buf` must not be empty.
    pub fn read_line(&mut self, buf: &mut [u8]) -> usize {
        precondition!(!buf.is_empty());
        let mut copied = 0;
        while copied < buf.len() && (self.available > 0 || self.fill(1) > 0) {
            let room = buf.len() - copied;
            let window = &self.buffered()[..self.available.min(room)];
            let (take, done) = match window.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (window.len(), false),
            };
            buf[copied..copied + take].copy_from_slice(&window[..take]);
            self.consume(take);
            copied += take;
            if done {
                break;
            }
        }
        if let Some(last) = buf.get_mut(copied.saturating_sub(1)) {
            *last = 0;
        }
        copied
    }

    /// Reads the next line of text into `buf` and returns the bytes preceding the terminator
    /// slot.
    ///
    /// This is [`read_line`](Self::read_line) with the result viewed as a byte string. No UTF-8
    /// validation is done.
    #[cfg(feature = "bstr")]
    pub fn read_line_bstr<'b>(&mut self, buf: &'b mut [u8]) -> &'b bstr::BStr {
        let n = self.read_line(buf);
        bstr::BStr::new(&buf[..n.saturating_sub(1)])
    }

    /// Reads a single `u8` value. Returns 0 at end of stream.
    #[inline]
    pub fn read_u8(&mut self) -> u8 {
        self.read_cbytes::<1>().map_or(0, |[b]| b)
    }

    /// Reads a single `i8` value. Returns 0 at end of stream.
    #[inline]
    pub fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }
}

macro_rules! decode_fns {
    ($($ty:ident => $generic:ident, $be:ident, $le:ident;)*) => {
        impl<T: Read, const N: usize> BufferedReader<T, N> {
            $(
                #[doc = concat!("Reads a `", stringify!($ty), "` in the stream's byte order. Returns 0 at end of stream.")]
                #[inline]
                pub fn $generic(&mut self) -> $ty {
                    match self.order {
                        ByteOrder::Big => self.$be(),
                        ByteOrder::Little => self.$le(),
                    }
                }

                #[doc = concat!("Reads a `", stringify!($ty), "` in big-endian byte order. Returns 0 at end of stream.")]
                #[inline]
                pub fn $be(&mut self) -> $ty {
                    self.read_cbytes().map_or(0, $ty::from_be_bytes)
                }

                #[doc = concat!("Reads a `", stringify!($ty), "` in little-endian byte order. Returns 0 at end of stream.")]
                #[inline]
                pub fn $le(&mut self) -> $ty {
                    self.read_cbytes().map_or(0, $ty::from_le_bytes)
                }
            )*
        }
    };
}

decode_fns! {
    u16 => read_u16, read_u16_be, read_u16_le;
    u32 => read_u32, read_u32_be, read_u32_le;
    u64 => read_u64, read_u64_be, read_u64_le;
    i16 => read_i16, read_i16_be, read_i16_le;
    i32 => read_i32, read_i32_be, read_i32_le;
    i64 => read_i64, read_i64_be, read_i64_le;
}

impl<T: Read, const N: usize> BufferedReader<T, N> {
    /// Reads an `f32` in the stream's byte order. Returns 0.0 at end of stream.
    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    /// Reads an `f32` in big-endian byte order.
    pub fn read_f32_be(&mut self) -> f32 {
        f32::from_bits(self.read_u32_be())
    }

    /// Reads an `f32` in little-endian byte order.
    pub fn read_f32_le(&mut self) -> f32 {
        f32::from_bits(self.read_u32_le())
    }

    /// Reads an `f64` in the stream's byte order. Returns 0.0 at end of stream.
    pub fn read_f64(&mut self) -> f64 {
        f64::from_bits(self.read_u64())
    }

    /// Reads an `f64` in big-endian byte order.
    pub fn read_f64_be(&mut self) -> f64 {
        f64::from_bits(self.read_u64_be())
    }

    /// Reads an `f64` in little-endian byte order.
    pub fn read_f64_le(&mut self) -> f64 {
        f64::from_bits(self.read_u64_le())
    }
}

impl<T: Read + Seek, const N: usize> BufferedReader<T, N> {
    /// Wraps a caller-supplied seekable source with a buffer of `N` bytes.
    pub fn attach_seekable_sized(inner: T, order: ByteOrder) -> Self {
        Self::from_handle(Handle::seekable(inner, Ownership::Attached), order)
    }

    /// Discards the next `n` bytes of the stream.
    ///
    /// Served from the buffer when possible; otherwise the handle is repositioned and the buffer
    /// discarded. Returns `false` if the stream could not be repositioned.
    pub fn skip(&mut self, n: usize) -> bool {
        if self.handle.is_err() {
            return false;
        }
        if n <= self.available {
            self.consume(n);
            return true;
        }
        let Ok(delta) = i64::try_from(n - self.available) else {
            return false;
        };
        self.reposition(SeekFrom::Current(delta))
    }

    /// Moves the read position back by `n` bytes.
    ///
    /// Served from the already-consumed part of the buffer when possible; otherwise the handle is
    /// repositioned and the buffer discarded. Returns `false` if the stream could not be
    /// repositioned, for example because `n` reaches past the start of the stream.
    pub fn rewind(&mut self, n: usize) -> bool {
        if self.handle.is_err() {
            return false;
        }
        if n <= self.next {
            self.unconsume(n);
            return true;
        }
        let Some(delta) = n
            .checked_add(self.available)
            .and_then(|d| i64::try_from(d).ok())
        else {
            return false;
        };
        self.reposition(SeekFrom::Current(-delta))
    }

    /// Moves the read position to byte `n` of the stream, discarding anything buffered.
    pub fn seek(&mut self, n: u64) -> bool {
        self.discard();
        if self.handle.is_err() {
            return false;
        }
        self.reposition(SeekFrom::Start(n))
    }

    fn reposition(&mut self, to: SeekFrom) -> bool {
        match self.handle.seek(to) {
            Ok(_) => {
                self.discard();
                true
            }
            Err(err) => {
                debug!(?to, error = %err, "could not reposition buffered reader");
                false
            }
        }
    }
}
