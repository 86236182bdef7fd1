//! Plain TCP stream factory.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{BoxedStream, Endpoint, StreamFactory};
use crate::config::ConnectionSettings;
use crate::error::{FixwireError, Result};

/// Default [`StreamFactory`]: an unencrypted TCP connection.
///
/// Connection establishment is bounded by `settings.connect_timeout`;
/// `settings.no_delay` maps to TCP_NODELAY.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpStreamFactory;

#[async_trait]
impl StreamFactory for TcpStreamFactory {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        settings: &ConnectionSettings,
    ) -> Result<BoxedStream> {
        let addr = (endpoint.host.as_str(), endpoint.port);
        let stream = match timeout(settings.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(FixwireError::Io(e)),
            Err(_) => return Err(FixwireError::ConnectTimeout(endpoint.to_string())),
        };
        stream.set_nodelay(settings.no_delay)?;
        tracing::debug!(%endpoint, "stream established");
        Ok(Box::new(stream))
    }
}
