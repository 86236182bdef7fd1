//! # fixwire
//!
//! Transport layer for a FIX-style financial messaging engine. A
//! [`Connection`] owns a single network connection to the counterparty,
//! turns its raw byte stream into discrete protocol messages for an upstream
//! [`Session`] state machine, and carries the session's outbound bytes and
//! disconnect requests back down through a [`Responder`].
//!
//! ## Architecture
//!
//! - **Connection controller**: lifecycle (`connect`/`start`/`join`), one
//!   worker task per connection running bounded-wait read cycles that stay
//!   responsive to disconnect requests
//! - **Framing**: accumulate-and-extract message parser, tolerant of
//!   arbitrary read-boundary splits
//! - **Transport**: pluggable [`StreamFactory`] seam (plain TCP provided;
//!   transport security substitutes the factory, not the controller)
//! - **Writer**: dedicated task serializing all outbound writes
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fixwire::{Connection, Endpoint};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Arc::new(MySession::default());
//!     let mut connection =
//!         Connection::builder("127.0.0.1:9880".parse::<Endpoint>()?, session).build();
//!
//!     connection.connect().await?;
//!     connection.start()?;
//!     // ... the session exchanges messages through its Responder ...
//!     connection.join().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod framing;
pub mod session;
pub mod transport;
pub mod writer;

mod connection;
mod reader;
mod responder;

pub use config::ConnectionSettings;
pub use connection::{Connection, ConnectionBuilder, ConnectionState};
pub use error::{FixwireError, Result};
pub use framing::{MessageParser, RawMessage};
pub use responder::Responder;
pub use session::{DisconnectReason, Session};
pub use transport::{Endpoint, StreamFactory, TcpStreamFactory};
