//! Bounded line reader
//!
//! Splits a timed byte stream into newline-terminated lines. Bytes of an
//! unfinished line are kept across read timeouts. A line longer than the
//! limit is dropped whole, up to and including its newline.

use std::io::{self, Read};
use tracing::warn;

use crate::protocol::channel::is_timeout;

/// Default maximum line length in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

const READ_CHUNK: usize = 256;

/// Incremental line splitter
#[derive(Debug)]
pub struct LineReader {
    pending: Vec<u8>,
    discarding: bool,
    max_len: usize,
    dropped: u64,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineReader {
    /// Reader dropping lines longer than `max_len` bytes
    pub fn new(max_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            discarding: false,
            max_len: max_len.max(1),
            dropped: 0,
        }
    }

    /// Number of overlong lines dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes of the current unfinished line
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Read the next complete line, without its `\n`.
    ///
    /// Returns `Ok(None)` when the stream went quiet before a newline
    /// arrived; the partial line is kept for the next call.
    pub fn read_line<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Option<Vec<u8>>> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            if self.pending.len() > self.max_len {
                if !self.discarding {
                    self.discarding = true;
                    self.dropped += 1;
                    warn!(limit = self.max_len, "line too long, dropping");
                }
                self.pending.clear();
            }

            match reader.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if is_timeout(e) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    /// Split off the first complete line that is within the limit
    fn take_line(&mut self) -> Option<Vec<u8>> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();

            if self.discarding {
                // Tail of an overlong line
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_len {
                self.dropped += 1;
                warn!(limit = self.max_len, len = line.len(), "line too long, dropping");
                continue;
            }
            return Some(line);
        }
        None
    }
}

/// Strip a trailing `\r` left over from a `\r\n` line ending
pub fn trim_line_ending(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
