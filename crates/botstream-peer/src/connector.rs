use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

#[cfg(unix)]
use botstream_transport::UnixDomainSocket;

use crate::config::PeerConfig;
use crate::error::Result;
use crate::handler::RequestHandler;
use crate::peer::Peer;

/// Connect to a peer listening on a Unix domain socket.
pub async fn connect(
    path: impl AsRef<Path>,
    handler: Option<Arc<dyn RequestHandler>>,
) -> Result<Peer> {
    connect_with_config(path, handler, PeerConfig::default()).await
}

/// Connect with explicit configuration.
pub async fn connect_with_config(
    path: impl AsRef<Path>,
    handler: Option<Arc<dyn RequestHandler>>,
    config: PeerConfig,
) -> Result<Peer> {
    #[cfg(not(unix))]
    {
        let _ = (handler, config);
        return Err(botstream_transport::TransportError::Connect {
            addr: path.as_ref().display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix domain sockets are not available on this platform",
            ),
        }
        .into());
    }

    #[cfg(unix)]
    {
        let path = path.as_ref();
        let stream = UnixDomainSocket::connect(path).await?;
        Ok(Peer::from_stream(
            path.display().to_string(),
            stream,
            handler,
            config,
        ))
    }
}

/// Connect to a peer listening on TCP.
pub async fn connect_tcp(
    addr: SocketAddr,
    handler: Option<Arc<dyn RequestHandler>>,
) -> Result<Peer> {
    connect_tcp_with_config(addr, handler, PeerConfig::default()).await
}

pub async fn connect_tcp_with_config(
    addr: SocketAddr,
    handler: Option<Arc<dyn RequestHandler>>,
    config: PeerConfig,
) -> Result<Peer> {
    let stream = botstream_transport::connect_tcp(addr).await?;
    Ok(Peer::from_stream(addr.to_string(), stream, handler, config))
}

#[cfg(all(test, unix))]
mod tests {
    use botstream_payload::{ReceiveRequest, StreamingRequest, StreamingResponse};
    use uuid::Uuid;

    use super::*;
    use crate::error::PeerError;
    use crate::listener::PeerListener;

    #[tokio::test]
    async fn connect_convenience() {
        let dir = std::env::temp_dir().join(format!("botstream-connect-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("listener.sock");

        let handler: Arc<dyn RequestHandler> =
            Arc::new(|_id: Uuid, request: ReceiveRequest| async move {
                let mut response = StreamingResponse::ok();
                response.set_body(Some("text/plain".into()), request.path.into_bytes());
                response
            });
        let listener = PeerListener::bind(&sock_path).unwrap().with_handler(handler);

        let server = tokio::spawn(async move {
            let peer = listener.accept().await.unwrap();
            peer.closed().await;
        });

        let client = connect(&sock_path, None).await.unwrap();
        let response = client
            .send_request(StreamingRequest::get("/api/echo-path"))
            .await
            .unwrap();
        assert_eq!(response.read_body_as_string().await.unwrap(), "/api/echo-path");

        client.disconnect();
        server.await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn connect_to_missing_socket_fails() {
        let path = std::env::temp_dir().join(format!("botstream-absent-{}.sock", std::process::id()));
        let err = connect(&path, None).await.unwrap_err();
        assert!(matches!(err, PeerError::Transport(_)));
    }
}
