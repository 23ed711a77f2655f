use std::time::Duration;

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] botstream_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] botstream_frame::FrameError),

    /// Payload assembly or disassembly error.
    #[error("payload error: {0}")]
    Payload(#[from] botstream_payload::PayloadError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PeerError>;
