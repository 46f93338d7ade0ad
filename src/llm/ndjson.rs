//! Incremental decoder for Ollama's newline-delimited JSON stream.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// One record of a `/api/generate` streaming response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct GenerateChunk {
    /// Model that produced the record.
    #[serde(default)]
    pub model: Option<String>,
    /// Text fragment; absent is treated as empty.
    #[serde(default)]
    pub response: String,
    /// Final record marker.
    #[serde(default)]
    pub done: bool,
    /// Backend-reported failure.
    #[serde(default)]
    pub error: Option<String>,
}

/// Longest pending line accepted before the stream is treated as broken.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// A line grew past the decoder limit without a newline.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("stream line exceeds {limit} bytes without a newline")]
pub struct LineTooLong {
    /// Configured limit in bytes.
    pub limit: usize,
}

/// Splits arbitrary byte chunks into complete NDJSON records.
///
/// Bytes are buffered until a newline arrives, so a record split across
/// network reads is decoded once. Blank lines are ignored and lines that are
/// not valid records are skipped.
#[derive(Debug)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    max_line: usize,
}

impl Default for NdjsonDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NdjsonDecoder {
    /// Create an empty decoder with [`DEFAULT_MAX_LINE_BYTES`].
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_BYTES)
    }

    /// Create an empty decoder rejecting pending lines over `max_line` bytes.
    #[must_use]
    pub const fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line,
        }
    }

    /// Feed raw bytes read from the response body.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Return the next complete record, if one is buffered.
    ///
    /// # Errors
    /// Returns [`LineTooLong`] once the unterminated tail exceeds the limit.
    pub fn next_record(&mut self) -> Result<Option<GenerateChunk>, LineTooLong> {
        loop {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = self.buffer.len();
                if self.buffer.len() > self.max_line {
                    return Err(LineTooLong {
                        limit: self.max_line,
                    });
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            self.scanned = 0;
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            if let Some(chunk) = parse_line(&line) {
                return Ok(Some(chunk));
            }
        }
    }

    /// Decode whatever remains after the body ended without a final newline.
    pub fn finish(&mut self) -> Option<GenerateChunk> {
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<GenerateChunk> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_slice(line) {
        Ok(chunk) => Some(chunk),
        Err(err) => {
            debug!(error = %err, bytes = line.len(), "skipping malformed stream line");
            None
        }
    }
}
