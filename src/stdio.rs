use std::io::{self, Stdin, Stdout};

use crate::reader::BufferedReader;
use crate::writer::BufferedWriter;
use crate::ByteOrder;

/// Buffered standard input and output for one process.
///
/// Create it once at the start of `main` and [`close`](Self::close) it at the end, so that
/// buffered output is flushed. Standard input and output are attached, never closed.
///
/// ```no_run
/// use buffered_binary_io::{writef, StdStreams};
///
/// let mut streams = StdStreams::new();
/// let mut line = [0u8; 256];
/// let n = streams.input.read_line(&mut line);
/// writef!(streams.output, "read {n} bytes\n");
/// streams.close();
/// ```
pub struct StdStreams {
    /// Buffered standard input.
    pub input: BufferedReader<Stdin>,
    /// Buffered standard output.
    pub output: BufferedWriter<Stdout>,
}

impl StdStreams {
    /// Wraps the process's standard input and output, decoding input in host byte order.
    pub fn new() -> Self {
        Self::with_order(ByteOrder::NATIVE)
    }

    /// Wraps the process's standard input and output, decoding input in `order`.
    pub fn with_order(order: ByteOrder) -> Self {
        Self {
            input: BufferedReader::attach_with_order(io::stdin(), order),
            output: BufferedWriter::attach(io::stdout()),
        }
    }

    /// Flushes standard output and releases both streams.
    ///
    /// Returns `false` if standard output has failed.
    pub fn close(self) -> bool {
        let Self { input, mut output } = self;
        output.flush();
        let ok = !output.err();
        output.close();
        input.close();
        ok
    }
}

impl Default for StdStreams {
    fn default() -> Self {
        Self::new()
    }
}
