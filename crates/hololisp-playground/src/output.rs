//! Interpreter output: line events, the sink they are sent to, and the buffer
//! the playground renders from.
//!
//! The interpreter writes raw bytes to its WASI stdout and stderr. The host
//! splits those writes into lines ([`LineWriter`]) and sends one
//! [`OutputLine`] per line to an [`OutputSink`]. The playground drains the sink
//! into an [`OutputBuffer`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

/// Which stream a line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Regular output (`print`, fd 1).
    Stdout,
    /// Diagnostics (fd 2).
    Stderr,
}

/// One line of interpreter output, without its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// The stream the line was written to.
    pub stream: Stream,
    /// Line contents.
    pub text: String,
}

impl OutputLine {
    /// A line written to stdout.
    #[must_use]
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: Stream::Stdout,
            text: text.into(),
        }
    }

    /// A line written to stderr.
    #[must_use]
    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: Stream::Stderr,
            text: text.into(),
        }
    }

    /// Whether this line came from the error stream.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.stream == Stream::Stderr
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Receiver for interpreter output.
///
/// The host calls [`OutputSink::on_line`] once per line, in the order the
/// interpreter wrote them.
pub trait OutputSink: Send + Sync {
    /// Handle one line of output.
    fn on_line(&self, line: OutputLine);
}

impl OutputSink for mpsc::UnboundedSender<OutputLine> {
    fn on_line(&self, line: OutputLine) {
        // Receiver gone means nobody renders output anymore.
        if self.send(line).is_err() {
            tracing::trace!("output receiver dropped, discarding line");
        }
    }
}

/// Splits a byte stream into lines.
#[derive(Debug)]
pub(crate) struct LineSplitter {
    stream: Stream,
    pending: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn new(stream: Stream) -> Self {
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    /// Feed bytes, emitting every completed line.
    pub(crate) fn write(&mut self, bytes: &[u8], sink: &dyn OutputSink) {
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            self.emit(sink);
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
    }

    /// Emit a trailing partial line, if any.
    pub(crate) fn flush(&mut self, sink: &dyn OutputSink) {
        if !self.pending.is_empty() {
            self.emit(sink);
        }
    }

    fn emit(&mut self, sink: &dyn OutputSink) {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        sink.on_line(OutputLine {
            stream: self.stream,
            text,
        });
    }
}

/// One guest stream: a [`LineSplitter`] shared between the WASI context and
/// the host, plus the sink its lines go to.
///
/// While muted, writes are dropped.
#[derive(Clone)]
pub(crate) struct LineWriter {
    state: Arc<Mutex<WriterState>>,
    sink: Arc<dyn OutputSink>,
}

struct WriterState {
    splitter: LineSplitter,
    muted: bool,
}

impl LineWriter {
    pub(crate) fn new(stream: Stream, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(WriterState {
                splitter: LineSplitter::new(stream),
                muted: false,
            })),
            sink,
        }
    }

    pub(crate) fn write(&self, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.muted {
            state.splitter.write(bytes, self.sink.as_ref());
        }
    }

    pub(crate) fn flush(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.muted {
            state.splitter.flush(self.sink.as_ref());
        }
    }

    pub(crate) fn set_muted(&self, muted: bool) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).muted = muted;
    }
}

/// Append-only list of output lines for the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffer {
    lines: Vec<OutputLine>,
}

impl OutputBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line.
    pub fn push(&mut self, line: OutputLine) {
        self.lines.push(line);
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// All lines in the order they were written.
    #[must_use]
    pub fn lines(&self) -> &[OutputLine] {
        &self.lines
    }

    /// Number of lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the buffer holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Render the buffer as the output panel shows it: every line followed by a
    /// newline, both streams interleaved.
    #[must_use]
    pub fn text(&self) -> String {
        let mut text = String::new();
        for line in &self.lines {
            text.push_str(&line.text);
            text.push('\n');
        }
        text
    }
}
