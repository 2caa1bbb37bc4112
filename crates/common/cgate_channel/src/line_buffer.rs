use std::fmt::Display;

/// Splits an incoming byte stream into delimiter-terminated lines.
///
/// Bytes are fed in with [`append`](LineBuffer::append) in whatever chunks
/// the socket produces; [`drain_lines`](LineBuffer::drain_lines) consumes
/// every complete line and keeps the partial tail for the next chunk. Every
/// appended byte is either delivered exactly once or still waiting in the
/// tail, and line order follows arrival order.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    options: LineOptions,
}

#[derive(Debug, Clone)]
struct LineOptions {
    delimiter: u8,
    trim: bool,
    skip_empty: bool,
}

impl Default for LineOptions {
    fn default() -> Self {
        LineOptions {
            delimiter: b'\n',
            trim: true,
            skip_empty: true,
        }
    }
}

/// A per-line handler failure, wrapped with the offending line.
#[derive(thiserror::Error, Debug)]
#[error("Failed to process line {line:?}: {cause}")]
pub struct LineHandlerError<E: Display> {
    pub line: String,
    pub cause: E,
}

impl LineBuffer {
    /// A buffer splitting on `\n`, trimming surrounding whitespace (so `\r\n`
    /// streams need no special casing) and skipping empty lines.
    pub fn new() -> LineBuffer {
        LineBuffer::default()
    }

    /// Split on a custom delimiter byte.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.options.delimiter = delimiter;
        self
    }

    /// Keep surrounding whitespace on delivered lines.
    pub fn keeping_whitespace(mut self) -> Self {
        self.options.trim = false;
        self
    }

    /// Deliver empty lines instead of skipping them.
    pub fn keeping_empty_lines(mut self) -> Self {
        self.options.skip_empty = false;
        self
    }

    /// Append a chunk of bytes as read from the socket.
    pub fn append(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Consume all complete lines, leaving the partial tail in place.
    pub fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line() {
            lines.push(line);
        }
        lines
    }

    /// Consume all complete lines into `handler`, stopping at the first
    /// failure. The error is returned wrapped with the offending line; the
    /// remaining buffered bytes are preserved.
    pub fn drain_with<E: Display>(
        &mut self,
        mut handler: impl FnMut(&str) -> Result<(), E>,
    ) -> Result<(), LineHandlerError<E>> {
        while let Some(line) = self.next_line() {
            handler(&line).map_err(|cause| LineHandlerError { line, cause })?;
        }
        Ok(())
    }

    /// Deliver the remaining tail as a final, unterminated line.
    pub fn flush_final(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.buf);
        self.deliverable(&tail)
    }

    /// The bytes still waiting for a delimiter.
    pub fn tail(&self) -> &[u8] {
        &self.buf
    }

    fn next_line(&mut self) -> Option<String> {
        loop {
            let end = self
                .buf
                .iter()
                .position(|byte| *byte == self.options.delimiter)?;
            let mut segment: Vec<u8> = self.buf.drain(..=end).collect();
            segment.pop();

            if let Some(line) = self.deliverable(&segment) {
                return Some(line);
            }
        }
    }

    fn deliverable(&self, segment: &[u8]) -> Option<String> {
        let mut line = String::from_utf8_lossy(segment).into_owned();
        if self.options.trim {
            line = line.trim().to_string();
        }
        if self.options.skip_empty && line.is_empty() {
            return None;
        }
        Some(line)
    }
}
