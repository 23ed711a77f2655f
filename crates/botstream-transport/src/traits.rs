use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// A connected duplex byte stream — implements `AsyncRead + AsyncWrite`.
///
/// This is the fundamental I/O type returned by transport operations.
/// On Unix it may wrap a Unix domain socket; everywhere it may wrap TCP.
pub struct TransportStream {
    inner: TransportStreamInner,
}

enum TransportStreamInner {
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            TransportStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            TransportStreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            TransportStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            TransportStreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            TransportStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
            TransportStreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            TransportStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            TransportStreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl TransportStream {
    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            TransportStreamInner::Unix(_) => "unix-domain-socket",
            TransportStreamInner::Tcp(_) => "tcp",
        }
    }

    /// Human-readable description of the remote end, for logs and peer ids.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            #[cfg(unix)]
            TransportStreamInner::Unix(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|p| p.display().to_string()))
                .unwrap_or_else(|| "unix:unnamed".to_string()),
            TransportStreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:unknown".to_string()),
        }
    }
}

#[cfg(unix)]
impl From<tokio::net::UnixStream> for TransportStream {
    fn from(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: TransportStreamInner::Unix(stream),
        }
    }
}

impl From<TcpStream> for TransportStream {
    fn from(stream: TcpStream) -> Self {
        Self {
            inner: TransportStreamInner::Tcp(stream),
        }
    }
}

impl std::fmt::Debug for TransportStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
