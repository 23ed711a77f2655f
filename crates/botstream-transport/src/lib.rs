//! Duplex byte transports for botstream connections.
//!
//! Provides a unified async stream over the socket types a streaming
//! connection can run on:
//! - Unix domain sockets (Linux/macOS)
//! - TCP
//!
//! This is the lowest layer of botstream. The framing layer reads and writes
//! through the [`TransportStream`] type provided here and never cares which
//! socket sits underneath.

pub mod error;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use tcp::{connect_tcp, listen_tcp, TcpTransport};
pub use traits::TransportStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
