//! Byte-stream transport to the sensor board
//!
//! The link runs over any duplex byte stream; a [`LinkConnector`] knows how
//! to open one and hands back its read and write halves, because the read
//! loop and `send()` drive the two directions independently. The provided
//! connector speaks to a serial-over-TCP bridge, and tests inject in-memory
//! duplex streams through the same seam.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("peer not found at {0}")]
    NotFound(String),

    #[error("link i/o failure: {0}")]
    IoFailure(#[from] io::Error),

    #[error("link operation timed out")]
    Timeout,
}

/// Result type for transport operations
pub type ConnResult<T> = Result<T, ConnError>;

/// Owned, type-erased read half of a link stream
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Owned, type-erased write half of a link stream
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The two halves of one opened link stream
pub struct TransportPair {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl TransportPair {
    /// Split any duplex stream into a transport pair
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

/// Capability that opens the byte stream to the board
#[async_trait]
pub trait LinkConnector: Send + Sync {
    async fn open(&self) -> ConnResult<TransportPair>;
}

/// Settle delay a freshly opened board needs to finish its reset boot
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Connector for a serial-over-TCP bridge.
///
/// After a successful connect it blocks for the settle delay, because
/// opening the port resets the board and traffic sent while it boots is
/// lost.
pub struct TcpConnector {
    addr: String,
    settle_delay: Duration,
}

impl TcpConnector {
    /// Create a connector for `addr` with the default settle delay
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Override the post-open settle delay
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }
}

#[async_trait]
impl LinkConnector for TcpConnector {
    async fn open(&self) -> ConnResult<TransportPair> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::AddrNotAvailable => ConnError::NotFound(self.addr.clone()),
                _ => ConnError::IoFailure(e),
            })?;

        debug!(
            addr = %self.addr,
            settle_ms = self.settle_delay.as_millis() as u64,
            "Transport open; waiting for peer reset"
        );
        tokio::time::sleep(self.settle_delay).await;

        let (reader, writer) = stream.into_split();
        Ok(TransportPair {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connector_refused_maps_to_not_found() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector =
            TcpConnector::new(addr.to_string()).with_settle_delay(Duration::from_millis(0));

        assert!(matches!(connector.open().await, Err(ConnError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_tcp_connector_opens_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let connector =
            TcpConnector::new(addr.to_string()).with_settle_delay(Duration::from_millis(0));
        assert!(connector.open().await.is_ok());

        accept.await.unwrap();
    }
}
