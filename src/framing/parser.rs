//! Message parser for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. Data arrives in
//! arbitrary chunks from the stream; the parser buffers everything and
//! extracts one complete message at a time:
//!
//! 1. scan for the `8=` start tag (leading garbage is dropped, a trailing
//!    partial tag survives until the next feed),
//! 2. parse the ASCII-digit `9=` body length,
//! 3. once the declared body is buffered, locate the `10=` checksum trailer
//!    and the SOH terminating its value.
//!
//! A message is only yielded once its terminating SOH is buffered; partial
//! data is never discarded between calls, so a boundary may fall anywhere
//! relative to read boundaries.

use bytes::{Buf, BytesMut};

use super::RawMessage;
use crate::config::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::{FixwireError, Result};

/// Field delimiter (ASCII SOH).
pub const SOH: u8 = 0x01;

/// Start-of-message tag.
const BEGIN_STRING_TAG: &[u8] = b"8=";

/// Body length tag, anchored to a field boundary.
const BODY_LENGTH_TAG: &[u8] = b"\x019=";

/// Checksum tag, anchored to a field boundary.
const CHECKSUM_TAG: &[u8] = b"\x0110=";

/// Accumulates inbound bytes and extracts complete messages in order.
///
/// One fresh instance per connection. State survives across calls: feeding a
/// message byte-by-byte yields it exactly once, when the last byte lands.
pub struct MessageParser {
    /// Accumulated bytes from stream reads.
    buffer: BytesMut,
    /// Upper bound on a single message (and on unframeable buffered data).
    max_message_size: usize,
}

impl MessageParser {
    /// Create a parser with the default message size limit.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a parser with a custom message size limit.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            max_message_size,
        }
    }

    /// Append raw bytes to the buffer. Zero-length feeds are no-ops.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Extract the next complete message if one is fully buffered.
    ///
    /// Returns `Ok(None)` when more data is needed; everything buffered is
    /// kept for the next call. Call repeatedly to drain multiple messages
    /// delivered in a single feed.
    ///
    /// # Errors
    ///
    /// [`FixwireError::Garbled`] when the stream cannot be framed: a
    /// non-numeric body length, a declared length over the limit, or more
    /// than the limit buffered without a recognizable message.
    pub fn extract_next(&mut self) -> Result<Option<RawMessage>> {
        // Locate the start tag. Bytes before it can never become part of a
        // message; a trailing partial tag (a lone `8`) must survive.
        let Some(start) = find(&self.buffer, BEGIN_STRING_TAG) else {
            self.check_overflow()?;
            return Ok(None);
        };
        if start > 0 {
            self.buffer.advance(start);
        }

        // Body length field.
        let Some(length_tag) = find(&self.buffer, BODY_LENGTH_TAG) else {
            self.check_overflow()?;
            return Ok(None);
        };
        let length_start = length_tag + BODY_LENGTH_TAG.len();
        let Some(rel) = find(&self.buffer[length_start..], &[SOH]) else {
            self.check_overflow()?;
            return Ok(None);
        };
        let length_end = length_start + rel;
        let body_length = parse_body_length(&self.buffer[length_start..length_end])?;
        if body_length > self.max_message_size {
            return Err(FixwireError::Garbled(format!(
                "declared body length {} exceeds maximum {}",
                body_length, self.max_message_size
            )));
        }

        // Wait for the declared body before looking for the trailer.
        let body_start = length_end + 1;
        if self.buffer.len() < body_start + body_length {
            return Ok(None);
        }

        // The trailer search is anchored to the field boundary preceding the
        // body, so an understated body length still resolves to the real
        // checksum field.
        let trailer_from = body_start - 1;
        let Some(rel) = find(&self.buffer[trailer_from..], CHECKSUM_TAG) else {
            self.check_overflow()?;
            return Ok(None);
        };
        let value_start = trailer_from + rel + CHECKSUM_TAG.len();
        let Some(rel) = find(&self.buffer[value_start..], &[SOH]) else {
            self.check_overflow()?;
            return Ok(None);
        };
        let end = value_start + rel + 1;

        let message = self.buffer.split_to(end).freeze();
        Ok(Some(RawMessage::new(message)))
    }

    /// Bounded-memory guard: an endless unframeable stream must not grow the
    /// buffer without limit.
    fn check_overflow(&self) -> Result<()> {
        if self.buffer.len() > self.max_message_size {
            return Err(FixwireError::Garbled(format!(
                "{} bytes buffered without a complete message (maximum {})",
                self.buffer.len(),
                self.max_message_size
            )));
        }
        Ok(())
    }
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new()
    }
}

/// First occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse the body length value; digits only.
fn parse_body_length(digits: &[u8]) -> Result<usize> {
    if digits.is_empty() {
        return Err(FixwireError::Garbled("empty body length".to_string()));
    }
    let mut value = 0usize;
    for &byte in digits {
        if !byte.is_ascii_digit() {
            return Err(FixwireError::Garbled(format!(
                "non-numeric body length {:?}",
                String::from_utf8_lossy(digits)
            )));
        }
        value = value.saturating_mul(10).saturating_add(usize::from(byte - b'0'));
    }
    Ok(value)
}
