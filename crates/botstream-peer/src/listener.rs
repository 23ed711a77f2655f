use std::net::SocketAddr;
#[cfg(unix)]
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use botstream_transport::{listen_tcp, TcpTransport, TransportStream};
#[cfg(unix)]
use botstream_transport::UnixDomainSocket;
use tracing::debug;

use crate::config::PeerConfig;
use crate::error::Result;
use crate::handler::RequestHandler;
use crate::peer::Peer;

enum Endpoint {
    #[cfg(unix)]
    Unix(UnixDomainSocket),
    Tcp(TcpTransport),
}

/// Listens for and accepts peer connections.
pub struct PeerListener {
    endpoint: Endpoint,
    handler: Option<Arc<dyn RequestHandler>>,
    peer_config: PeerConfig,
    next_peer_id: AtomicU64,
}

impl PeerListener {
    fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            handler: None,
            peer_config: PeerConfig::default(),
            next_peer_id: AtomicU64::new(1),
        }
    }

    /// Bind to a Unix domain socket path.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Endpoint::Unix(UnixDomainSocket::bind(path)?)))
    }

    /// Bind to a TCP address.
    pub async fn bind_tcp(addr: SocketAddr) -> Result<Self> {
        Ok(Self::new(Endpoint::Tcp(listen_tcp(addr).await?)))
    }

    /// Handler given to every accepted peer.
    pub fn with_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Override peer behavior config.
    pub fn with_peer_config(mut self, config: PeerConfig) -> Self {
        self.peer_config = config;
        self
    }

    /// Accept next connection and assign an auto-generated peer id.
    pub async fn accept(&self) -> Result<Peer> {
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        self.accept_with_id(&format!("peer-{id}")).await
    }

    /// Accept next connection and use explicit peer id.
    pub async fn accept_with_id(&self, peer_id: &str) -> Result<Peer> {
        let stream: TransportStream = match &self.endpoint {
            #[cfg(unix)]
            Endpoint::Unix(socket) => socket.accept().await?,
            Endpoint::Tcp(listener) => listener.accept().await?,
        };
        debug!(peer = peer_id, transport = stream.transport_name(), "peer accepted");

        Ok(Peer::from_stream(
            peer_id.to_string(),
            stream,
            self.handler.clone(),
            self.peer_config.clone(),
        ))
    }

    /// Bound socket path, for Unix domain socket listeners.
    #[cfg(unix)]
    pub fn path(&self) -> Option<&Path> {
        match &self.endpoint {
            Endpoint::Unix(socket) => Some(socket.path()),
            Endpoint::Tcp(_) => None,
        }
    }

    /// Bound address, for TCP listeners.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.endpoint {
            #[cfg(unix)]
            Endpoint::Unix(_) => None,
            Endpoint::Tcp(listener) => Some(listener.local_addr()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use botstream_payload::{ReceiveRequest, StreamingRequest, StreamingResponse};
    use uuid::Uuid;

    use super::*;
    use crate::connector::connect_tcp;

    fn status_handler(status: u16) -> Arc<dyn RequestHandler> {
        Arc::new(move |_id: Uuid, _request: ReceiveRequest| async move {
            StreamingResponse::new(status)
        })
    }

    #[tokio::test]
    async fn tcp_accept_assigns_ids() {
        let listener = PeerListener::bind_tcp(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .unwrap()
            .with_handler(status_handler(202));
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let first = listener.accept().await.unwrap();
            assert_eq!(first.id(), "peer-1");
            first.closed().await;
        });

        let client = connect_tcp(addr, None).await.unwrap();
        let response = client
            .send_request(StreamingRequest::get("/anything"))
            .await
            .unwrap();
        assert_eq!(response.status_code, 202);

        client.disconnect();
        server.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_listener_reports_path() {
        let dir = std::env::temp_dir().join(format!("botstream-listener-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("listener.sock");

        let listener = PeerListener::bind(&sock_path).unwrap();
        assert_eq!(listener.path(), Some(sock_path.as_path()));
        assert!(listener.local_addr().is_none());

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
