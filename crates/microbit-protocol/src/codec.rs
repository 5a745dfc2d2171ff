//! Line-based codec for serial communication.
//!
//! The bridge firmware terminates every message with `\n`. Inbound bytes are
//! accumulated until a newline arrives, then decoded lossily as UTF-8 and
//! trimmed of surrounding whitespace (the firmware's `print` emits `\r\n`).

use bytes::{Buf, BytesMut};

/// Maximum number of buffered bytes without a newline before the buffer is
/// discarded as line noise.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Line terminator used in both directions.
pub const LINE_TERMINATOR: u8 = b'\n';

/// A codec for reading and writing newline-terminated lines.
///
/// - Accumulates received bytes until a complete line is found
/// - Decodes with invalid UTF-8 sequences replaced, then trims whitespace
/// - Skips lines that are empty after trimming
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Number of times the buffer overflowed and was discarded.
    overflows: u64,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(256),
            overflows: 0,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        if self.buffer.len() > MAX_LINE_LENGTH && !self.buffer.contains(&LINE_TERMINATOR) {
            log::warn!(
                "discarding {} buffered bytes without a line terminator",
                self.buffer.len()
            );
            self.buffer.clear();
            self.overflows += 1;
        }
    }

    /// Try to decode a complete line from the buffer.
    ///
    /// Returns `Some(line)` if a non-empty line is available, or `None` if
    /// more data is needed.
    pub fn decode_line(&mut self) -> Option<String> {
        while let Some(end) = self.buffer.iter().position(|&b| b == LINE_TERMINATOR) {
            let line_data = self.buffer.split_to(end);
            self.buffer.advance(1);

            let line = String::from_utf8_lossy(&line_data);
            let line = line.trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }

        None
    }

    /// Encode a line for transmission, appending the terminator.
    pub fn encode_line(line: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(LINE_TERMINATOR);
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of times an unterminated buffer was discarded.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
