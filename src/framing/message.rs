//! A complete message unit extracted from the stream.

use std::fmt;

use bytes::Bytes;

use super::parser::SOH;

/// One complete message as delimited on the wire.
///
/// Covers everything from the start-of-message tag through the SOH that
/// terminates the checksum field, inclusive. The transport treats the
/// content as opaque: one unit in, one dispatch out, never fragmented or
/// merged once extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message bytes, split zero-copy from the accumulation buffer.
    bytes: Bytes,
}

impl RawMessage {
    pub(crate) fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Message bytes exactly as received.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the message, returning the underlying buffer.
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the message is empty (never produced by the parser).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lossy text rendition of the raw bytes, SOH included.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl AsRef<[u8]> for RawMessage {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Renders SOH as `|` so messages stay printable in logs and test output.
impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use fmt::Write;
        for &byte in self.bytes.iter() {
            if byte == SOH {
                f.write_char('|')?;
            } else {
                f.write_char(byte as char)?;
            }
        }
        Ok(())
    }
}
