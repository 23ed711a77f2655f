use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::TransportStream;

/// TCP listener producing [`TransportStream`]s.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Accept an incoming connection.
    pub async fn accept(&self) -> Result<TransportStream> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted tcp connection");
        Ok(TransportStream::from(stream))
    }

    /// The address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Create a TCP listener bound to the given address.
pub async fn listen_tcp(addr: SocketAddr) -> Result<TcpTransport> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "listening on tcp");
    Ok(TcpTransport {
        listener,
        local_addr,
    })
}

/// Connect to a TCP address.
pub async fn connect_tcp(addr: SocketAddr) -> Result<TransportStream> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    stream.set_nodelay(true)?;
    debug!(%addr, "connected over tcp");
    Ok(TransportStream::from(stream))
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_tcp_listen_connect() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = listen_tcp(addr).await.unwrap();
        let bound = listener.local_addr();

        let client = tokio::spawn(async move {
            let mut stream = connect_tcp(bound).await.unwrap();
            stream.write_all(b"tcp").await.unwrap();
            stream
        });

        let mut server = listener.accept().await.unwrap();
        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"tcp");
        assert_eq!(server.transport_name(), "tcp");

        let client = client.await.unwrap();
        assert!(client.peer_label().starts_with("127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port that is very likely closed.
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = listen_tcp(addr).await.unwrap();
        let bound = listener.local_addr();
        drop(listener);

        let result = connect_tcp(bound).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
