use std::io::{Read, Write};

use crate::handle::Handle;
use crate::reader::BufferedReader;
use crate::writer::BufferedWriter;

impl<T: Read + Write, const N: usize> BufferedReader<T, N> {
    /// Creates a writer over the same handle as this reader.
    ///
    /// The writer is always attached: closing it flushes and releases the borrow, but never
    /// closes the shared handle. Bytes are written at the handle's raw position
    /// ([`fpos`](Self::fpos)), which is ahead of the logical read position by whatever this reader
    /// has buffered. For a file opened in append mode, writes land at the end regardless.
    ///
    /// The writer starts with the handle's status, so it reports an error the reader has already
    /// hit. The reader cannot be used while the writer is alive. Bytes this reader buffered before the
    /// writer was created are not refreshed.
    ///
    /// ```
    /// # use buffered_binary_io::{BufferedReader, ByteOrder};
    /// # use std::io::Cursor;
    /// let mut r = BufferedReader::attach_with_order(Cursor::new(b"ab".to_vec()), ByteOrder::Big);
    /// assert_eq!(r.read_u8(), b'a');
    /// {
    ///     let mut w = r.writer();
    ///     w.write_u16(0x4344);
    /// }
    /// assert_eq!(r.read_u8(), b'b');
    /// assert_eq!(r.close().unwrap().into_inner(), b"abCD");
    /// ```
    pub fn writer(&mut self) -> BufferedWriter<&mut Handle<T>> {
        self.writer_sized()
    }

    /// Creates a writer over the same handle as this reader, with a buffer of `M` bytes.
    pub fn writer_sized<const M: usize>(&mut self) -> BufferedWriter<&mut Handle<T>, M> {
        BufferedWriter::from_handle(Handle::borrowed(self.handle_mut()))
    }
}
