//! Framing module - message boundary recognition.
//!
//! Turns the raw inbound byte stream into discrete message units:
//! - [`MessageParser`] accumulates partial reads and extracts complete units
//! - [`RawMessage`] is one complete, opaque message
//!
//! Field semantics stay with the session layer; the transport only needs to
//! know where one message ends and the next begins.

mod message;
mod parser;

pub use message::RawMessage;
pub use parser::{MessageParser, SOH};
