
use tracing::{debug, warn};

/// Default upper bound on a single unterminated line held in memory.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Reassembles newline-delimited text from arbitrarily split byte chunks.
///
/// The only state carried between calls is the undelivered trailing partial line, kept as
/// raw bytes so that a multi-byte character split across two chunks is decoded only once
/// both halves have arrived.
#[derive(Debug, Clone)]
pub struct LineReassembler {
    partial: Vec<u8>,
    max_line_bytes: usize,
    /// Set while skipping the rest of an oversized line up to its newline.
    discarding: bool,
    overflowed_lines: usize,
}

impl Default for LineReassembler {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineReassembler {
    #[inline]
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
            overflowed_lines: 0,
        }
    }

    /// Feed one chunk and return every line it completes, in order.
    #[inline]
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(newline) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(newline);
            rest = tail.get(1..).unwrap_or_default();

            if self.discarding {
                // Tail end of an oversized line; resynchronise on this newline.
                self.discarding = false;
                self.partial.clear();
                continue;
            }

            if self.partial.len() + head.len() > self.max_line_bytes {
                self.record_overflow();
                self.partial.clear();
                continue;
            }

            self.partial.extend_from_slice(head);
            let raw = std::mem::take(&mut self.partial);
            if let Some(line) = decode_line(raw) {
                lines.push(line);
            }
        }

        if !self.discarding && !rest.is_empty() {
            if self.partial.len() + rest.len() > self.max_line_bytes {
                self.record_overflow();
                self.partial.clear();
                self.discarding = true;
            } else {
                self.partial.extend_from_slice(rest);
            }
        }

        lines
    }

    /// Discard the unterminated remainder at end of stream.
    ///
    /// Complete lines are always handed out by [`feed`](Self::feed); whatever is left here
    /// never saw its newline. Returns the number of bytes dropped.
    #[inline]
    pub fn flush(&mut self) -> usize {
        let dropped = self.partial.len();
        if dropped > 0 {
            debug!("Discarding {} bytes of unterminated trailing line", dropped);
        }
        self.partial.clear();
        self.discarding = false;
        dropped
    }

    /// Bytes currently buffered for the trailing partial line.
    #[inline]
    pub fn pending_bytes(&self) -> usize {
        self.partial.len()
    }

    /// Number of lines dropped for exceeding the configured size limit.
    #[inline]
    pub fn overflowed_lines(&self) -> usize {
        self.overflowed_lines
    }

    fn record_overflow(&mut self) {
        self.overflowed_lines += 1;
        warn!(
            "Dropping line longer than {} bytes from upstream stream",
            self.max_line_bytes
        );
    }
}

fn decode_line(mut raw: Vec<u8>) -> Option<String> {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    match String::from_utf8(raw) {
        Ok(line) => Some(line),
        Err(e) => {
            debug!("Dropping line with invalid UTF-8: {}", e);
            None
        }
    }
}
