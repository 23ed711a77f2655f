//! Request/response peers over one multiplexed connection.
//!
//! This is the "just works" layer. A [`Peer`] wraps a duplex byte stream,
//! answers incoming requests through a [`RequestHandler`], and sends its own
//! requests with [`Peer::send_request`]. Any number of requests, responses
//! and attached streams may be in flight at once.

pub mod config;
pub mod connector;
pub mod error;
pub mod handler;
pub mod listener;
pub mod peer;

pub use config::{PeerConfig, DEFAULT_REQUEST_TIMEOUT};
pub use connector::{connect, connect_tcp, connect_tcp_with_config, connect_with_config};
pub use error::{PeerError, Result};
pub use handler::RequestHandler;
pub use listener::PeerListener;
pub use peer::Peer;
