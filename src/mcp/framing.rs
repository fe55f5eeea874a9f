//! Newline framing for the notebook's stdout.
//!
//! Output arrives in arbitrary chunks. A chunk may end in the middle of a
//! message, or in the middle of a multi-byte UTF-8 sequence, so bytes are
//! buffered until a `\n` terminates the line. A line longer than the limit
//! is discarded up to its terminator and counted.

/// Longest line kept by [`LineFramer::new`], in bytes.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Splits a byte stream into newline-terminated lines.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    limit: usize,
    skipping: bool,
    discarded: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Creates an empty framer with the default line limit.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }

    /// Creates an empty framer that discards lines longer than `limit` bytes.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            skipping: false,
            discarded: 0,
        }
    }

    /// Appends a chunk and returns every line it completed.
    ///
    /// Lines are returned without their terminator (a trailing `\r` is also
    /// dropped). The unterminated tail stays buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let line = &rest[..pos];
            if self.skipping {
                self.skipping = false;
            } else if self.buffer.len() + line.len() > self.limit {
                self.discard(self.buffer.len() + line.len());
            } else {
                self.buffer.extend_from_slice(line);
                lines.push(Self::decode(&self.buffer));
            }
            self.buffer.clear();
            rest = &rest[pos + 1..];
        }

        if self.skipping {
            return lines;
        }
        if self.buffer.len() + rest.len() > self.limit {
            self.discard(self.buffer.len() + rest.len());
            self.buffer = Vec::new();
            self.skipping = true;
        } else {
            self.buffer.extend_from_slice(rest);
        }
        lines
    }

    /// Number of over-long lines discarded so far.
    #[must_use]
    pub const fn discarded(&self) -> usize {
        self.discarded
    }

    fn discard(&mut self, seen: usize) {
        self.discarded += 1;
        tracing::warn!(seen, limit = self.limit, "Discarding over-long line from notebook");
    }

    /// Bytes received since the last newline.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the framer at end of stream, returning any unterminated tail.
    #[must_use]
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(Self::decode(&self.buffer))
        }
    }

    fn decode(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}
