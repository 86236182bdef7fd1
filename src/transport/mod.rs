//! Transport module - stream establishment.
//!
//! The connection controller is transport-agnostic: it consumes a
//! [`StreamFactory`] that turns an endpoint plus settings into a live
//! bidirectional byte stream. Substituting the factory (for transport
//! security, or an in-memory stream in tests) requires no controller change.

mod tcp;

pub use tcp::TcpStreamFactory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ConnectionSettings;
use crate::error::{FixwireError, Result};

/// Network address of the counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = FixwireError;

    fn from_str(s: &str) -> Result<Self> {
        let Some((host, port)) = s.rsplit_once(':') else {
            return Err(FixwireError::InvalidEndpoint(s.to_string()));
        };
        if host.is_empty() {
            return Err(FixwireError::InvalidEndpoint(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| FixwireError::InvalidEndpoint(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// A bidirectional byte stream to the counterparty.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin> ByteStream for T {}

/// Boxed stream returned by factories.
pub type BoxedStream = Box<dyn ByteStream>;

/// Strategy for establishing the byte stream.
///
/// One call per connection attempt; the returned stream is owned exclusively
/// by the controller until closed.
#[async_trait]
pub trait StreamFactory: Send + Sync {
    /// Connect to `endpoint`, honoring `settings`.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        settings: &ConnectionSettings,
    ) -> Result<BoxedStream>;
}
