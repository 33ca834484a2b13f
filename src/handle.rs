use std::fmt;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

use tracing::debug;

/// Records whether a stream is responsible for closing its handle.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Ownership {
    /// The stream opened the handle itself and closes it when the stream is closed.
    Owned,
    /// The caller supplied the handle and keeps responsibility for it. Closing the stream hands
    /// the handle back instead of closing it.
    Attached,
}

/// The byte source or sink underneath a buffered stream.
///
/// `Handle` keeps the status that C's `FILE` keeps and that Rust I/O objects do not: a sticky
/// error flag, an end-of-stream flag, and the raw position of the handle.
///
/// For seekable objects (files opened by path, and objects attached with the `attach_seekable`
/// constructors) the position is the object's own offset: it is queried when the handle is
/// created and again after every write, so appends are accounted for. Other objects, such as
/// pipes and terminals, count bytes from where they stood when they were attached. Every
/// successful seek replaces the position with the absolute offset it reports.
///
/// `Handle` implements [`Read`], [`Write`] and [`Seek`] when the inner object does. All of them
/// go through the same bookkeeping.
pub struct Handle<T> {
    inner: Option<T>,
    ownership: Ownership,
    pos: u64,
    error: bool,
    eof: bool,
    requery: Option<fn(&mut T) -> io::Result<u64>>,
}

impl<T> Handle<T> {
    pub(crate) fn attached(inner: T) -> Self {
        Self::new(inner, Ownership::Attached, 0)
    }

    fn new(inner: T, ownership: Ownership, pos: u64) -> Self {
        Self {
            inner: Some(inner),
            ownership,
            pos,
            error: false,
            eof: false,
            requery: None,
        }
    }

    /// Whether this handle is closed along with its stream.
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Returns `false` once the handle has been closed.
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Raw position of the handle, ignoring any buffering done above it.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Returns `true` if the handle has encountered an I/O error. The flag is never cleared.
    pub fn is_err(&self) -> bool {
        self.error
    }

    /// Returns `true` if a read has hit the end of the source. A successful seek clears it.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Borrows the inner object.
    pub fn get_ref(&self) -> Option<&T> {
        self.inner.as_ref()
    }

    /// Mutably borrows the inner object.
    ///
    /// Reading, writing or seeking the inner object directly bypasses the position tracking and
    /// the buffers of any stream built on this handle.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.inner.as_mut()
    }

    /// Closes the handle.
    ///
    /// An attached handle is returned to the caller untouched. An owned handle is dropped, which
    /// closes it, and `None` is returned. Either way this handle is invalid afterwards.
    pub(crate) fn close(&mut self) -> Option<T> {
        precondition!(self.inner.is_some());
        let inner = self.inner.take()?;
        match self.ownership {
            Ownership::Attached => Some(inner),
            Ownership::Owned => {
                drop(inner);
                None
            }
        }
    }

    fn enter_error_state(&mut self, op: &'static str, err: &io::Error) {
        if !self.error {
            debug!(op, error = %err, "stream handle entered error state");
        }
        self.error = true;
    }

    fn check_usable(&self) -> io::Result<()> {
        precondition!(self.inner.is_some());
        if self.inner.is_none() {
            Err(io::Error::new(ErrorKind::NotConnected, "stream is closed"))
        } else if self.error {
            Err(io::Error::other("stream is in an error state"))
        } else {
            Ok(())
        }
    }
}

impl<T: Seek> Handle<T> {
    pub(crate) fn seekable(mut inner: T, ownership: Ownership) -> Self {
        let pos = inner.stream_position().unwrap_or_else(|err| {
            debug!(error = %err, "could not query stream position, counting from 0");
            0
        });
        let mut handle = Self::new(inner, ownership, pos);
        handle.requery = Some(T::stream_position);
        handle
    }
}

impl<'a, T> Handle<&'a mut Handle<T>> {
    /// Wraps another handle. The new handle starts with the inner handle's position and status,
    /// and takes its position from the inner handle after every write.
    pub(crate) fn borrowed(inner: &'a mut Handle<T>) -> Self {
        let (pos, error, eof) = (inner.pos, inner.error, inner.eof);
        let mut handle = Self::new(inner, Ownership::Attached, pos);
        handle.error = error;
        handle.eof = eof;
        handle.requery = Some(inner_position);
        handle
    }
}

fn inner_position<T>(inner: &mut &mut Handle<T>) -> io::Result<u64> {
    Ok(inner.pos)
}

impl<T: fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("inner", &self.inner)
            .field("ownership", &self.ownership)
            .field("pos", &self.pos)
            .field("error", &self.error)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl<T: Read> Read for Handle<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_usable()?;
        loop {
            let Some(inner) = self.inner.as_mut() else {
                return Ok(0);
            };
            match inner.read(buf) {
                Ok(0) if !buf.is_empty() => {
                    if !self.eof {
                        debug!(pos = self.pos, "stream handle reached end of input");
                    }
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => {
                    self.pos += n as u64;
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.enter_error_state("read", &err);
                    return Err(err);
                }
            }
        }
    }
}

impl<T: Write> Write for Handle<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_usable()?;
        loop {
            let Some(inner) = self.inner.as_mut() else {
                return Ok(0);
            };
            match inner.write(buf) {
                Ok(0) if !buf.is_empty() => {
                    let err = io::Error::from(ErrorKind::WriteZero);
                    self.enter_error_state("write", &err);
                    return Err(err);
                }
                Ok(n) => {
                    let counted = self.pos + n as u64;
                    self.pos = match self.requery {
                        Some(query) => query(inner).unwrap_or(counted),
                        None => counted,
                    };
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.enter_error_state("write", &err);
                    return Err(err);
                }
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_usable()?;
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        if let Err(err) = inner.flush() {
            self.enter_error_state("flush", &err);
            return Err(err);
        }
        Ok(())
    }
}

impl<T: Seek> Seek for Handle<T> {
    /// Repositions the handle.
    ///
    /// A failed seek (for example, to before the start of a file) leaves the position unchanged
    /// and does not put the handle into the error state.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.check_usable()?;
        let Some(inner) = self.inner.as_mut() else {
            return Ok(self.pos);
        };
        let new_pos = inner.seek(pos)?;
        self.pos = new_pos;
        self.eof = false;
        Ok(new_pos)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct FailingIo;

    impl Read for FailingIo {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("device unplugged"))
        }
    }

    impl Write for FailingIo {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tracks_position_across_reads() {
        let mut h = Handle::attached(Cursor::new(vec![1u8, 2, 3, 4, 5]));
        let mut buf = [0u8; 3];
        assert_eq!(h.read(&mut buf).unwrap(), 3);
        assert_eq!(h.position(), 3);
        assert!(!h.is_eof());
    }

    #[test]
    fn eof_is_set_by_empty_read_and_cleared_by_seek() {
        let mut h = Handle::attached(Cursor::new(vec![9u8; 2]));
        let mut buf = [0u8; 8];
        assert_eq!(h.read(&mut buf).unwrap(), 2);
        assert!(!h.is_eof());
        assert_eq!(h.read(&mut buf).unwrap(), 0);
        assert!(h.is_eof());

        assert_eq!(h.seek(SeekFrom::Start(1)).unwrap(), 1);
        assert!(!h.is_eof());
        assert_eq!(h.position(), 1);
    }

    #[test]
    fn errors_are_sticky() {
        let mut h = Handle::attached(FailingIo);
        let mut buf = [0u8; 4];
        assert!(h.read(&mut buf).is_err());
        assert!(h.is_err());
        assert!(h.write(b"x").is_err());
        assert!(h.is_err());
        assert_eq!(h.position(), 0);
    }

    #[test]
    fn failed_seek_is_not_an_error_state() {
        let mut h = Handle::attached(Cursor::new(vec![0u8; 4]));
        assert!(h.seek(SeekFrom::Current(-1)).is_err());
        assert!(!h.is_err());
        assert_eq!(h.position(), 0);
    }

    #[test]
    fn close_returns_attached_handles() {
        let mut h = Handle::attached(Cursor::new(vec![7u8]));
        let inner = h.close().unwrap();
        assert_eq!(inner.into_inner(), [7]);
        assert!(!h.is_open());
    }

    #[test]
    fn close_drops_owned_handles() {
        let mut h = Handle::seekable(Cursor::new(vec![7u8]), Ownership::Owned);
        assert_eq!(h.ownership(), Ownership::Owned);
        assert!(h.close().is_none());
        assert!(!h.is_open());
    }

    #[test]
    fn seekable_handles_start_at_the_object_offset() {
        let mut cursor = Cursor::new(vec![0u8; 16]);
        cursor.set_position(10);
        let mut h = Handle::seekable(cursor, Ownership::Attached);
        assert_eq!(h.position(), 10);

        // Writes are followed by a fresh position query.
        h.get_mut().unwrap().set_position(2);
        h.write_all(b"xy").unwrap();
        assert_eq!(h.position(), 4);
    }

    #[test]
    fn borrowed_handles_inherit_status() {
        let mut inner = Handle::attached(FailingIo);
        assert!(inner.read(&mut [0u8; 1]).is_err());
        let outer = Handle::borrowed(&mut inner);
        assert!(outer.is_err());
        assert!(!outer.is_eof());
    }

    #[test]
    fn writes_through_a_borrowed_handle_update_both() {
        let mut inner = Handle::attached(Cursor::new(Vec::new()));
        {
            let mut outer = Handle::borrowed(&mut inner);
            outer.write_all(b"abc").unwrap();
            assert_eq!(outer.position(), 3);
        }
        assert_eq!(inner.position(), 3);
        assert_eq!(inner.get_ref().unwrap().get_ref(), b"abc");
    }
}
