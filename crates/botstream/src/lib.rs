//! Multiplexed request/response streaming over one duplex connection.
//!
//! botstream carries any number of concurrent requests, responses and
//! attached content streams over a single byte stream, each split into
//! fixed-header frames and reassembled on the far side.
//!
//! # Crate Structure
//!
//! - [`transport`]: socket abstraction (Unix domain sockets, TCP)
//! - [`frame`]: the 48-byte header and frame codec
//! - [`payload`]: assembly, disassembly, stream buffers and request correlation
//! - [`peer`]: connection-level request/response API (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use botstream_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use botstream_frame::*;
}

/// Re-export payload types.
pub mod payload {
    pub use botstream_payload::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use botstream_peer::*;
}
